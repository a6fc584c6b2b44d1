mod ast;
mod compile;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinOp, Expr, UnaryOp};
pub use compile::{CompiledExpr, Compiler, Scope};
pub use eval::{Binding, DeclaredFunction, Env, EvalError, FunctionTable, NativeFunction, Value};
pub use lexer::{tokenize, Lexeme};
pub use parser::{parse, ParseError};
