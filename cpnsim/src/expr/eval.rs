use std::{cmp::Ordering, collections::BTreeMap, fmt::Display, sync::Arc};

use thiserror::Error;

use super::ast::{BinOp, Expr, UnaryOp};
use crate::color::{MultiSet, Token};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("variable '{0}' is not bound")]
    Unbound(String),
    #[error("operator '{op}' cannot be applied to {found}")]
    TypeMismatch { op: String, found: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    Overflow(String),
    #[error("multiplicity must be a non-negative integer, found {0}")]
    BadMultiplicity(String),
    #[error("token {token} has no field '{field}'")]
    UnknownField { field: String, token: String },
    #[error("a multiset cannot be used as a single token here")]
    UnexpectedMultiset,
    #[error("function '{0}' is declared in the model but has no native implementation")]
    UnsupportedCall(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' failed: {reason}")]
    CallFailed { name: String, reason: String },
}

/// Assignment of tokens to the free variables of a transition.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Binding(BTreeMap<String, Token>);

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Token> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, token: Token) -> Option<Token> {
        self.0.insert(name.into(), token)
    }

    /// Bind `name` to `token` unless it is already bound to a different
    /// token. Returns false on conflict.
    pub fn unify(&mut self, name: &str, token: &Token) -> bool {
        match self.0.get(name) {
            Some(existing) => existing == token,
            None => {
                self.0.insert(name.to_string(), token.clone());
                true
            }
        }
    }

    /// Merge two bindings, failing if they disagree on a shared variable.
    pub fn merged(&self, other: &Binding) -> Option<Binding> {
        let mut out = self.clone();
        for (name, token) in &other.0 {
            if !out.unify(name, token) {
                return None;
            }
        }
        Some(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Token)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Token)> for Binding {
    fn from_iter<I: IntoIterator<Item = (K, Token)>>(iter: I) -> Self {
        Binding(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (idx, (name, token)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={token}")?;
        }
        write!(f, "}}")
    }
}

pub type NativeFunction = Arc<dyn Fn(&[Token]) -> Result<Token, String> + Send + Sync>;

/// A function declared in the model (`fun name(params) = body`). The body is
/// kept as text and is never interpreted.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredFunction {
    pub name: String,
    pub params: String,
    pub body: String,
}

/// Functions callable from inscriptions.
///
/// Model-declared functions are recorded but not interpreted; calling one
/// fails with [`EvalError::UnsupportedCall`] unless a native implementation
/// has been registered under the same name.
#[derive(Clone, Default)]
pub struct FunctionTable {
    declared: BTreeMap<String, DeclaredFunction>,
    native: BTreeMap<String, NativeFunction>,
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("declared", &self.declared.keys().collect::<Vec<_>>())
            .field("native", &self.native.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration given as `name(params)` header text and body text.
    pub fn declare(&mut self, header: &str, body: &str) {
        let header = header.trim();
        let (name, params) = match header.find(['(', ' ']) {
            Some(idx) => (header[..idx].trim(), header[idx..].trim()),
            None => (header, ""),
        };
        self.declared.insert(
            name.to_string(),
            DeclaredFunction { name: name.into(), params: params.into(), body: body.trim().into() },
        );
    }

    pub fn register_native<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Token]) -> Result<Token, String> + Send + Sync + 'static,
    {
        self.native.insert(name.into(), Arc::new(f));
    }

    pub fn declared(&self) -> impl Iterator<Item = &DeclaredFunction> {
        self.declared.values()
    }

    pub fn call(&self, name: &str, args: &[Token]) -> Result<Token, EvalError> {
        if let Some(f) = self.native.get(name) {
            return f(args).map_err(|reason| EvalError::CallFailed { name: name.into(), reason });
        }
        if self.declared.contains_key(name) {
            return Err(EvalError::UnsupportedCall(name.into()));
        }
        Err(EvalError::UnknownFunction(name.into()))
    }
}

/// Result of evaluating an inscription.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Token(Token),
    Bag(MultiSet),
}

impl Value {
    pub fn into_multiset(self) -> MultiSet {
        match self {
            Value::Token(token) => MultiSet::singleton(token),
            Value::Bag(bag) => bag,
        }
    }
}

/// Evaluation environment: the binding and the callable functions.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub binding: &'a Binding,
    pub functions: &'a FunctionTable,
}

impl<'a> Env<'a> {
    pub fn new(binding: &'a Binding, functions: &'a FunctionTable) -> Self {
        Env { binding, functions }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(token) => Ok(Value::Token(token.clone())),
            Expr::Var(name) => self
                .binding
                .get(name)
                .cloned()
                .map(Value::Token)
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            Expr::Wildcard => Err(EvalError::Unbound("_".into())),
            Expr::Opaque(text) => Ok(Value::Token(
                self.binding.get(text.trim()).cloned().unwrap_or_else(|| Token::str(text.trim())),
            )),
            Expr::Empty => Ok(Value::Bag(MultiSet::new())),
            Expr::Tuple(items) => Ok(Value::Token(Token::Tuple(self.tokens(items)?))),
            Expr::List(items) => Ok(Value::Token(Token::List(self.tokens(items)?))),
            Expr::Record(fields) => {
                let values = fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.token(v)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                Ok(Value::Token(Token::Record(values)))
            }
            Expr::Call { name, args } => {
                let args = self.tokens(args)?;
                Ok(Value::Token(self.functions.call(name, &args)?))
            }
            Expr::FieldAccess { field, record } => {
                let token = self.token(record)?;
                token.field(field).cloned().map(Value::Token).ok_or_else(|| {
                    EvalError::UnknownField { field: field.clone(), token: token.to_string() }
                })
            }
            Expr::Unary { op: UnaryOp::Neg, operand } => match self.token(operand)? {
                Token::Int(i) => i
                    .checked_neg()
                    .map(|i| Value::Token(Token::Int(i)))
                    .ok_or_else(|| EvalError::Overflow("~".into())),
                Token::Real(r) => Ok(Value::Token(Token::Real(-r))),
                other => Err(mismatch("~", &[&other])),
            },
            Expr::Unary { op: UnaryOp::Not, operand } => {
                Ok(Value::Token(Token::Bool(!self.boolean(operand, "not")?)))
            }
            Expr::Conditional { cond, then_branch, else_branch } => {
                if self.boolean(cond, "if")? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expr::Multiplicity { count, value } => {
                let n = match self.token(count)? {
                    Token::Int(n) if n >= 0 => n as usize,
                    other => return Err(EvalError::BadMultiplicity(other.to_string())),
                };
                let inner = self.eval(value)?.into_multiset();
                let mut bag = MultiSet::new();
                for (token, c) in inner.iter() {
                    let count = c.checked_mul(n).ok_or_else(|| EvalError::Overflow("`".into()))?;
                    bag.add(token.clone(), count);
                }
                Ok(Value::Bag(bag))
            }
            Expr::BinOp { op: BinOp::Union, left, right } => {
                let mut bag = self.eval(left)?.into_multiset();
                if !bag.try_extend(self.eval(right)?.into_multiset()) {
                    return Err(EvalError::Overflow("++".into()));
                }
                Ok(Value::Bag(bag))
            }
            Expr::BinOp { op: BinOp::And, left, right } => Ok(Value::Token(Token::Bool(
                self.boolean(left, "andalso")? && self.boolean(right, "andalso")?,
            ))),
            Expr::BinOp { op: BinOp::Or, left, right } => Ok(Value::Token(Token::Bool(
                self.boolean(left, "orelse")? || self.boolean(right, "orelse")?,
            ))),
            Expr::BinOp { op, left, right } => {
                let left = self.token(left)?;
                let right = self.token(right)?;
                binary(*op, left, right).map(Value::Token)
            }
        }
    }

    /// Evaluate to a single token; multisets are rejected.
    pub fn token(&self, expr: &Expr) -> Result<Token, EvalError> {
        match self.eval(expr)? {
            Value::Token(token) => Ok(token),
            Value::Bag(_) => Err(EvalError::UnexpectedMultiset),
        }
    }

    pub fn multiset(&self, expr: &Expr) -> Result<MultiSet, EvalError> {
        Ok(self.eval(expr)?.into_multiset())
    }

    pub fn boolean(&self, expr: &Expr, op: &str) -> Result<bool, EvalError> {
        match self.token(expr)? {
            Token::Bool(b) => Ok(b),
            other => Err(mismatch(op, &[&other])),
        }
    }

    fn tokens(&self, items: &[Expr]) -> Result<Vec<Token>, EvalError> {
        items.iter().map(|item| self.token(item)).collect()
    }
}

fn mismatch(op: &str, operands: &[&Token]) -> EvalError {
    let found = operands.iter().map(|t| format!("{} {}", t.kind(), t)).collect::<Vec<_>>();
    EvalError::TypeMismatch { op: op.into(), found: found.join(" and ") }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn arith(op: BinOp, left: Token, right: Token) -> Result<Token, EvalError> {
    let overflow = || EvalError::Overflow(op.symbol().into());
    match (op, left, right) {
        (BinOp::Add, Token::Int(a), Token::Int(b)) => a.checked_add(b).map(Token::Int).ok_or_else(overflow),
        (BinOp::Sub, Token::Int(a), Token::Int(b)) => a.checked_sub(b).map(Token::Int).ok_or_else(overflow),
        (BinOp::Mul, Token::Int(a), Token::Int(b)) => a.checked_mul(b).map(Token::Int).ok_or_else(overflow),
        (BinOp::Div | BinOp::IntDiv | BinOp::Mod, Token::Int(_), Token::Int(0)) => {
            Err(EvalError::DivisionByZero)
        }
        (BinOp::Div, Token::Int(a), Token::Int(b)) => a.checked_div(b).map(Token::Int).ok_or_else(overflow),
        (BinOp::IntDiv, Token::Int(a), Token::Int(b)) => floor_div(a, b).map(Token::Int).ok_or_else(overflow),
        (BinOp::Mod, Token::Int(a), Token::Int(b)) => {
            let q = floor_div(a, b).ok_or_else(overflow)?;
            Ok(Token::Int(a - b * q))
        }
        (BinOp::Add, Token::Str(a), Token::Str(b)) => Ok(Token::Str(a + &b)),
        (op, Token::Int(a), Token::Real(b)) => arith(op, Token::Real(a as f64), Token::Real(b)),
        (op, Token::Real(a), Token::Int(b)) => arith(op, Token::Real(a), Token::Real(b as f64)),
        (BinOp::Add, Token::Real(a), Token::Real(b)) => Ok(Token::Real(a + b)),
        (BinOp::Sub, Token::Real(a), Token::Real(b)) => Ok(Token::Real(a - b)),
        (BinOp::Mul, Token::Real(a), Token::Real(b)) => Ok(Token::Real(a * b)),
        (BinOp::Div, Token::Real(_), Token::Real(b)) if b == 0.0 => Err(EvalError::DivisionByZero),
        (BinOp::Div, Token::Real(a), Token::Real(b)) => Ok(Token::Real(a / b)),
        (op, left, right) => Err(mismatch(op.symbol(), &[&left, &right])),
    }
}

fn compare(op: BinOp, left: &Token, right: &Token) -> Result<Ordering, EvalError> {
    match (left, right) {
        (Token::Int(a), Token::Real(b)) => Ok((*a as f64).total_cmp(b)),
        (Token::Real(a), Token::Int(b)) => Ok(a.total_cmp(&(*b as f64))),
        (a, b) if a.kind() == b.kind() => Ok(a.cmp(b)),
        (a, b) => Err(mismatch(op.symbol(), &[a, b])),
    }
}

fn binary(op: BinOp, left: Token, right: Token) -> Result<Token, EvalError> {
    match op {
        BinOp::Eq => Ok(Token::Bool(left == right)),
        BinOp::Ne => Ok(Token::Bool(left != right)),
        BinOp::Lt => Ok(Token::Bool(compare(op, &left, &right)?.is_lt())),
        BinOp::Le => Ok(Token::Bool(compare(op, &left, &right)?.is_le())),
        BinOp::Gt => Ok(Token::Bool(compare(op, &left, &right)?.is_gt())),
        BinOp::Ge => Ok(Token::Bool(compare(op, &left, &right)?.is_ge())),
        BinOp::Cons => match right {
            Token::List(mut items) => {
                items.insert(0, left);
                Ok(Token::List(items))
            }
            right => Err(mismatch(op.symbol(), &[&left, &right])),
        },
        BinOp::Append => match (left, right) {
            (Token::List(mut a), Token::List(b)) => {
                a.extend(b);
                Ok(Token::List(a))
            }
            (left, right) => Err(mismatch(op.symbol(), &[&left, &right])),
        },
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Mod => {
            arith(op, left, right)
        }
        BinOp::And | BinOp::Or | BinOp::Union => {
            Err(mismatch(op.symbol(), &[&left, &right]))
        }
    }
}
