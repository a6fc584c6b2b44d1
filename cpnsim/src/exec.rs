mod binding;
mod fire;

pub use binding::{enabled, enabled_pairs, match_pattern, EnabledPair};
pub use fire::{fire, place_changes};
