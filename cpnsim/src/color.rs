mod colorset;
mod multiset;
mod token;

pub use colorset::{ColorCheck, ColorSet, ColorSetKind, ColorSetTable};
pub use multiset::MultiSet;
pub use token::Token;
