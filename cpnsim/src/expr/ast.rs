use std::{collections::BTreeSet, fmt::Display};

use crate::color::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// `/`: integer division on ints, real division otherwise.
    Div,
    /// `div`: floored integer division.
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `::`
    Cons,
    /// `^^`
    Append,
    /// `++`
    Union,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "div",
            BinOp::Mod => "mod",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "andalso",
            BinOp::Or => "orelse",
            BinOp::Cons => "::",
            BinOp::Append => "^^",
            BinOp::Union => "++",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Typed expression tree of an inscription.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Token),
    Var(String),
    /// `_` in patterns: matches anything, binds nothing.
    Wildcard,
    Tuple(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `#field record`
    FieldAccess {
        field: String,
        record: Box<Expr>,
    },
    /// `count`value`
    Multiplicity {
        count: Box<Expr>,
        value: Box<Expr>,
    },
    /// The empty multiset.
    Empty,
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Text outside the supported grammar, passed through unchanged.
    Opaque(String),
}

impl Expr {
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinOp { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn is_opaque(&self) -> bool {
        let mut opaque = false;
        self.visit(&mut |e| opaque |= matches!(e, Expr::Opaque(_)));
        opaque
    }

    /// Names of all variables referenced by this expression.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Var(name) = e {
                vars.insert(name.clone());
            }
        });
        vars
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Var(_) | Expr::Wildcard | Expr::Empty | Expr::Opaque(_) => {}
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|i| i.visit(f)),
            Expr::Call { args, .. } => args.iter().for_each(|i| i.visit(f)),
            Expr::Record(fields) => fields.iter().for_each(|(_, v)| v.visit(f)),
            Expr::Unary { operand, .. } => operand.visit(f),
            Expr::BinOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Conditional { cond, then_branch, else_branch } => {
                cond.visit(f);
                then_branch.visit(f);
                else_branch.visit(f);
            }
            Expr::FieldAccess { record, .. } => record.visit(f),
            Expr::Multiplicity { count, value } => {
                count.visit(f);
                value.visit(f);
            }
        }
    }

    /// Rewrite bottom-up: children first, then `f` on the rebuilt node.
    pub fn transform<F: FnMut(Expr) -> Expr>(self, f: &mut F) -> Expr {
        let rebuilt = match self {
            Expr::Tuple(items) => Expr::Tuple(items.into_iter().map(|i| i.transform(f)).collect()),
            Expr::List(items) => Expr::List(items.into_iter().map(|i| i.transform(f)).collect()),
            Expr::Call { name, args } => {
                Expr::Call { name, args: args.into_iter().map(|i| i.transform(f)).collect() }
            }
            Expr::Record(fields) => {
                Expr::Record(fields.into_iter().map(|(k, v)| (k, v.transform(f))).collect())
            }
            Expr::Unary { op, operand } => {
                Expr::Unary { op, operand: Box::new((*operand).transform(f)) }
            }
            Expr::BinOp { op, left, right } => {
                let left = Box::new((*left).transform(f));
                Expr::BinOp { op, left, right: Box::new((*right).transform(f)) }
            }
            Expr::Conditional { cond, then_branch, else_branch } => {
                let cond = Box::new((*cond).transform(f));
                let then_branch = Box::new((*then_branch).transform(f));
                Expr::Conditional {
                    cond,
                    then_branch,
                    else_branch: Box::new((*else_branch).transform(f)),
                }
            }
            Expr::FieldAccess { field, record } => {
                Expr::FieldAccess { field, record: Box::new((*record).transform(f)) }
            }
            Expr::Multiplicity { count, value } => {
                let count = Box::new((*count).transform(f));
                Expr::Multiplicity { count, value: Box::new((*value).transform(f)) }
            }
            leaf => leaf,
        };
        f(rebuilt)
    }
}

fn write_list(f: &mut std::fmt::Formatter<'_>, items: &[Expr]) -> std::fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(token) => write!(f, "{token}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Wildcard => write!(f, "_"),
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expr::Record(fields) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "~{operand}"),
            Expr::Unary { op: UnaryOp::Not, operand } => write!(f, "not ({operand})"),
            Expr::BinOp { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Conditional { cond, then_branch, else_branch } => {
                write!(f, "if {cond} then {then_branch} else {else_branch}")
            }
            Expr::FieldAccess { field, record } => write!(f, "#{field} {record}"),
            Expr::Multiplicity { count, value } => write!(f, "{count}`{value}"),
            Expr::Empty => write!(f, "empty"),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Opaque(text) => write!(f, "<opaque {text:?}>"),
        }
    }
}
