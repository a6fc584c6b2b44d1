use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use tracing::{trace, warn};

use super::{ast::Expr, parser::parse, BinOp};
use crate::{
    color::{ColorSetTable, Token},
    model::GlobBox,
};

/// Nesting limit when inlining declared values that refer to other values.
const MAX_INLINE_DEPTH: usize = 8;

/// Where a fragment is used. Decides how unknown identifiers are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Initial markings: there is no binding, unknown identifiers are symbols.
    Constant,
    /// Arc inscriptions and guards: unknown identifiers are variables.
    Binding,
}

/// A fragment together with its compiled expression tree.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledExpr {
    pub fn new(source: impl Into<String>, expr: Expr) -> Self {
        CompiledExpr { source: source.into(), expr }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True if some part of the fragment fell outside the supported grammar.
    pub fn is_opaque(&self) -> bool {
        self.expr.is_opaque()
    }

    pub fn free_vars(&self) -> BTreeSet<String> {
        self.expr.free_vars()
    }
}

impl Display for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Compiler front-end: parses fragments and resolves identifiers against the
/// model's declarations.
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    values: BTreeMap<String, String>,
    variables: BTreeMap<String, String>,
    symbols: BTreeSet<String>,
}

impl Compiler {
    pub fn new(globbox: &GlobBox, colorsets: &ColorSetTable) -> Self {
        let mut compiler = Compiler::default();
        for value in &globbox.values {
            match (value.name.as_deref().map(str::trim), value.value.as_deref()) {
                (Some(name), Some(text)) if !name.is_empty() => {
                    compiler.values.insert(name.to_string(), text.trim().to_string());
                }
                _ => warn!(id = value.id.as_deref(), "Skipping value declaration without name or value."),
            }
        }
        for var in &globbox.variables {
            let type_name = var.type_name.as_deref().unwrap_or_default().trim();
            for name in var.names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                compiler.variables.insert(name.to_string(), type_name.to_string());
            }
        }
        compiler.symbols = colorsets.enum_symbols().map(String::from).collect();
        compiler
    }

    /// Declared variables and the names of their color sets.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn compile(&self, source: &str, scope: Scope) -> CompiledExpr {
        let expr = match parse(source) {
            Ok(expr) => self.resolve(expr, scope, 0),
            Err(err) => {
                warn!(source, %err, "Unsupported expression, passing it through unchanged.");
                Expr::Opaque(source.trim().to_string())
            }
        };
        trace!(source, compiled = %expr, "Compiled expression.");
        CompiledExpr::new(source.trim(), expr)
    }

    /// Compile a guard. Absent or blank guards compile to None; a bracketed
    /// guard list is the conjunction of its elements.
    pub fn compile_guard(&self, source: Option<&str>) -> Option<CompiledExpr> {
        let source = source.map(str::trim).filter(|s| !s.is_empty())?;
        let compiled = self.compile(source, Scope::Binding);
        match compiled.expr {
            Expr::List(items) => {
                let expr = items.into_iter().reduce(|acc, item| Expr::binary(BinOp::And, acc, item))?;
                Some(CompiledExpr::new(compiled.source, expr))
            }
            expr => Some(CompiledExpr::new(compiled.source, expr)),
        }
    }

    fn resolve(&self, expr: Expr, scope: Scope, depth: usize) -> Expr {
        expr.transform(&mut |node| match node {
            Expr::Var(name) => self.resolve_identifier(name, scope, depth),
            other => other,
        })
    }

    fn resolve_identifier(&self, name: String, scope: Scope, depth: usize) -> Expr {
        if let Some(text) = self.values.get(&name) {
            if depth >= MAX_INLINE_DEPTH {
                warn!(name = name.as_str(), "Value declarations nest too deeply, not inlining.");
                return Expr::Opaque(text.clone());
            }
            return match parse(text) {
                Ok(expr) => self.resolve(expr, scope, depth + 1),
                Err(err) => {
                    warn!(name = name.as_str(), value = text.as_str(), %err, "Declared value is not a supported expression.");
                    Expr::Opaque(text.clone())
                }
            };
        }
        if self.variables.contains_key(&name) {
            return Expr::Var(name);
        }
        // the unit color's only value
        if name == "unit" {
            return Expr::Literal(Token::Unit);
        }
        if self.symbols.contains(&name) || scope == Scope::Constant {
            return Expr::Literal(Token::Str(name));
        }
        Expr::Var(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        color::{ColorSet, ColorSetKind},
        model::{ValueRecord, VariableRecord},
    };

    fn compiler() -> Compiler {
        let globbox = GlobBox {
            values: vec![
                ValueRecord { name: Some("n".into()), value: Some("3".into()), ..Default::default() },
                ValueRecord { name: Some("m".into()), value: Some("n + 1".into()), ..Default::default() },
                ValueRecord { name: Some("loop".into()), value: Some("loop".into()), ..Default::default() },
            ],
            variables: vec![VariableRecord {
                type_name: Some("COL".into()),
                names: vec!["c".into(), "red".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let colorsets = ColorSetTable::compile([ColorSet::new(
            "COL",
            ColorSetKind::Enum,
            vec!["red".into(), "green".into()],
        )]);
        Compiler::new(&globbox, &colorsets)
    }

    #[test]
    fn values_are_inlined_before_anything_else() {
        let c = compiler();
        let compiled = c.compile("m * x", Scope::Binding);
        assert_eq!(compiled.free_vars(), BTreeSet::from(["x".to_string()]));
        assert_eq!(compiled.expr().to_string(), "((3 + 1) * x)");
        assert!(c.compile("loop", Scope::Binding).is_opaque());
    }

    #[test]
    fn symbols_and_constant_scope() {
        let c = compiler();
        assert_eq!(c.compile("green", Scope::Binding).expr(), &Expr::Literal(Token::str("green")));
        // a declared variable shadows the enum symbol
        assert_eq!(c.compile("red", Scope::Binding).expr(), &Expr::Var("red".into()));
        assert_eq!(c.compile("alice", Scope::Constant).expr(), &Expr::Literal(Token::str("alice")));
        assert_eq!(c.compile("alice", Scope::Binding).expr(), &Expr::Var("alice".into()));
    }

    #[test]
    fn unit_is_a_literal() {
        let c = compiler();
        let unit = Expr::Literal(Token::Unit);
        assert_eq!(c.compile("unit", Scope::Binding).expr(), &unit);
        assert_eq!(c.compile("unit", Scope::Constant).expr(), &unit);
        let marking = c.compile("2`unit", Scope::Constant);
        assert!(matches!(marking.expr(), Expr::Multiplicity { value, .. } if **value == unit));
    }

    #[test]
    fn guard_lists_are_conjunctions() {
        let c = compiler();
        let guard = c.compile_guard(Some("[x = 1, y <> x]")).unwrap();
        assert!(matches!(guard.expr(), Expr::BinOp { op: BinOp::And, .. }));
        assert_eq!(guard.source(), "[x = 1, y <> x]");
        assert!(c.compile_guard(Some("  ")).is_none());
        assert!(c.compile_guard(Some("[]")).is_none());
        assert!(c.compile_guard(None).is_none());
    }

    #[test]
    fn unsupported_syntax_is_opaque() {
        let c = compiler();
        let compiled = c.compile("let val y = 1 in y end", Scope::Binding);
        assert!(compiled.is_opaque());
        assert_eq!(compiled.expr(), &Expr::Opaque("let val y = 1 in y end".into()));
    }
}
