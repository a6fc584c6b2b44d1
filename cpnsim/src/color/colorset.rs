use std::{collections::BTreeMap, fmt::Display};

use tracing::{debug, warn};

use super::Token;
use crate::model::ColorSetRecord;

/// Nesting limit when resolving color sets that refer to other color sets.
const MAX_RESOLVE_DEPTH: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColorSetKind {
    Unit,
    Bool,
    Int,
    IntSum,
    IntInf,
    Real,
    Time,
    String,
    Enum,
    List,
    Product,
    Record,
    Alias,
    /// Any kind tag the type system does not model (e.g. `index`).
    Other(String),
}

impl ColorSetKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "unit" => Self::Unit,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "intsum" => Self::IntSum,
            "intinf" => Self::IntInf,
            "real" => Self::Real,
            "time" => Self::Time,
            "string" => Self::String,
            "enum" => Self::Enum,
            "list" => Self::List,
            "product" => Self::Product,
            "record" => Self::Record,
            "alias" => Self::Alias,
            _ => Self::Other(tag.to_string()),
        }
    }
}

/// A declared color set.
#[derive(Clone, Debug)]
pub struct ColorSet {
    name: String,
    kind: ColorSetKind,
    params: Vec<String>,
}

impl ColorSet {
    pub fn new(name: impl Into<String>, kind: ColorSetKind, params: Vec<String>) -> Self {
        ColorSet { name: name.into(), kind, params }
    }

    /// Returns None for records without a name, which cannot be referenced.
    pub fn from_record(record: &ColorSetRecord) -> Option<Self> {
        let name = record.name.as_ref()?.trim();
        if name.is_empty() {
            return None;
        }
        let kind = match record.subtype.as_deref() {
            Some(tag) => ColorSetKind::from_tag(tag.trim()),
            None => ColorSetKind::Other("<missing>".into()),
        };
        let params = record
            .subtype_contents
            .iter()
            .flatten()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Some(ColorSet::new(name, kind, params))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ColorSetKind {
        &self.kind
    }

    /// Kind-specific parameters: enum symbols, base type names or record
    /// field names.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// A compiled color-set membership predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorCheck {
    Unit,
    Bool,
    /// Also accepts strings holding a decimal integer.
    Int,
    Real,
    Str,
    /// Int or real.
    Time,
    Enum(Vec<String>),
    /// Tuples of the given arity; element types are not checked.
    Product { arity: usize },
    /// Lists whose elements satisfy the element check, if any.
    List(Option<Box<ColorCheck>>),
    /// Records carrying exactly the declared field names; field types are not
    /// tracked. An empty declaration accepts any record.
    Record { fields: Vec<String> },
    /// Accepts everything. Carries the reason no real check exists.
    Unchecked { reason: String },
}

impl ColorCheck {
    pub fn unchecked(reason: impl Into<String>) -> Self {
        ColorCheck::Unchecked { reason: reason.into() }
    }

    pub fn is_unchecked(&self) -> bool {
        matches!(self, ColorCheck::Unchecked { .. })
    }

    pub fn check(&self, token: &Token) -> bool {
        match (self, token) {
            (ColorCheck::Unchecked { .. }, _) => true,
            (ColorCheck::Unit, Token::Unit) => true,
            (ColorCheck::Bool, Token::Bool(_)) => true,
            (ColorCheck::Int, Token::Int(_)) => true,
            (ColorCheck::Int, Token::Str(s)) => s.trim().parse::<i64>().is_ok(),
            (ColorCheck::Real, Token::Real(_)) => true,
            (ColorCheck::Str, Token::Str(_)) => true,
            (ColorCheck::Time, Token::Int(_) | Token::Real(_)) => true,
            (ColorCheck::Enum(symbols), tok) => {
                let symbol = tok.symbol();
                symbols.iter().any(|s| *s == symbol)
            }
            (ColorCheck::Product { arity }, Token::Tuple(items)) => items.len() == *arity,
            (ColorCheck::List(None), Token::List(_)) => true,
            (ColorCheck::List(Some(elem)), Token::List(items)) => {
                items.iter().all(|item| elem.check(item))
            }
            (ColorCheck::Record { fields }, Token::Record(values)) => {
                fields.is_empty()
                    || (fields.len() == values.len()
                        && fields.iter().all(|f| values.iter().any(|(k, _)| k == f)))
            }
            _ => false,
        }
    }

    /// Bring a token into the canonical shape for this color set: numeric
    /// strings become ints and record fields follow the declared order.
    pub fn normalize(&self, token: Token) -> Token {
        match (self, token) {
            (ColorCheck::Int, Token::Str(s)) => match s.trim().parse::<i64>() {
                Ok(value) => Token::Int(value),
                Err(_) => Token::Str(s),
            },
            (ColorCheck::List(Some(elem)), Token::List(items)) => {
                Token::List(items.into_iter().map(|item| elem.normalize(item)).collect())
            }
            (ColorCheck::Record { fields }, Token::Record(mut values)) if !fields.is_empty() => {
                values.sort_by_key(|(k, _)| fields.iter().position(|f| f == k).unwrap_or(usize::MAX));
                Token::Record(values)
            }
            (_, token) => token,
        }
    }

    /// All members of a finite color set, in declaration order.
    pub fn domain(&self) -> Option<Vec<Token>> {
        match self {
            ColorCheck::Unit => Some(vec![Token::Unit]),
            ColorCheck::Bool => Some(vec![Token::Bool(false), Token::Bool(true)]),
            ColorCheck::Enum(symbols) => Some(symbols.iter().map(|s| Token::str(s.as_str())).collect()),
            _ => None,
        }
    }
}

impl Display for ColorCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorCheck::Unit => write!(f, "unit"),
            ColorCheck::Bool => write!(f, "bool"),
            ColorCheck::Int => write!(f, "int"),
            ColorCheck::Real => write!(f, "real"),
            ColorCheck::Str => write!(f, "string"),
            ColorCheck::Time => write!(f, "time"),
            ColorCheck::Enum(symbols) => write!(f, "with {}", symbols.join(" | ")),
            ColorCheck::Product { arity } => write!(f, "product/{arity}"),
            ColorCheck::List(None) => write!(f, "list"),
            ColorCheck::List(Some(elem)) => write!(f, "list {elem}"),
            ColorCheck::Record { fields } => write!(f, "record {{{}}}", fields.join(",")),
            ColorCheck::Unchecked { reason } => write!(f, "unchecked ({reason})"),
        }
    }
}

/// Compiled predicates of all declared color sets, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ColorSetTable {
    declared: BTreeMap<String, ColorSet>,
    checks: BTreeMap<String, ColorCheck>,
}

impl ColorSetTable {
    pub fn compile(colorsets: impl IntoIterator<Item = ColorSet>) -> Self {
        let mut table = ColorSetTable::default();
        for cs in colorsets {
            if let Some(previous) = table.declared.insert(cs.name().to_string(), cs) {
                warn!(name = previous.name(), "Color set declared twice, keeping the last one.");
            }
        }
        for (name, cs) in &table.declared {
            let check = compile_colorset(cs, &table.declared, 0);
            if let ColorCheck::Unchecked { reason } = &check {
                debug!(colorset = name.as_str(), reason = reason.as_str(), "Color set is unchecked.");
            }
            table.checks.insert(name.clone(), check);
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&ColorCheck> {
        self.checks.get(name)
    }

    /// Check for a place or variable type reference. Unknown names yield an
    /// unchecked predicate.
    pub fn check_for(&self, type_name: Option<&str>) -> ColorCheck {
        let Some(type_name) = type_name.map(str::trim).filter(|t| !t.is_empty()) else {
            return ColorCheck::unchecked("no declared type");
        };
        if let Some(check) = self.checks.get(type_name) {
            return check.clone();
        }
        primitive(type_name)
            .unwrap_or_else(|| ColorCheck::unchecked(format!("unknown color set '{type_name}'")))
    }

    /// Every symbol of every declared enum color set.
    pub fn enum_symbols(&self) -> impl Iterator<Item = &str> {
        self.checks
            .values()
            .flat_map(|check| match check {
                ColorCheck::Enum(symbols) => symbols.as_slice(),
                _ => &[][..],
            })
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColorCheck)> {
        self.checks.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn primitive(tag: &str) -> Option<ColorCheck> {
    match tag.to_ascii_uppercase().as_str() {
        "UNIT" => Some(ColorCheck::Unit),
        "BOOL" => Some(ColorCheck::Bool),
        "INT" | "INTSUM" | "INTINF" => Some(ColorCheck::Int),
        "REAL" => Some(ColorCheck::Real),
        "STRING" => Some(ColorCheck::Str),
        "TIME" => Some(ColorCheck::Time),
        _ => None,
    }
}

fn resolve_base(name: &str, declared: &BTreeMap<String, ColorSet>, depth: usize) -> ColorCheck {
    if let Some(check) = primitive(name) {
        return check;
    }
    match declared.get(name) {
        Some(cs) if depth < MAX_RESOLVE_DEPTH => compile_colorset(cs, declared, depth + 1),
        Some(_) => ColorCheck::unchecked(format!("color set '{name}' nests too deeply")),
        None => ColorCheck::unchecked(format!("unknown base type '{name}'")),
    }
}

fn compile_colorset(cs: &ColorSet, declared: &BTreeMap<String, ColorSet>, depth: usize) -> ColorCheck {
    match cs.kind() {
        ColorSetKind::Unit => ColorCheck::Unit,
        ColorSetKind::Bool => ColorCheck::Bool,
        ColorSetKind::Int | ColorSetKind::IntSum | ColorSetKind::IntInf => ColorCheck::Int,
        ColorSetKind::Real => ColorCheck::Real,
        ColorSetKind::Time => ColorCheck::Time,
        ColorSetKind::String => ColorCheck::Str,
        ColorSetKind::Enum if cs.params().is_empty() => ColorCheck::unchecked("enum without symbols"),
        ColorSetKind::Enum => ColorCheck::Enum(cs.params().to_vec()),
        ColorSetKind::Product if cs.params().is_empty() => {
            ColorCheck::unchecked("product without components")
        }
        ColorSetKind::Product => ColorCheck::Product { arity: cs.params().len() },
        ColorSetKind::List => match cs.params().first() {
            None => ColorCheck::List(None),
            Some(base) => match resolve_base(base, declared, depth) {
                ColorCheck::Unchecked { .. } => ColorCheck::List(None),
                elem => ColorCheck::List(Some(Box::new(elem))),
            },
        },
        ColorSetKind::Record => ColorCheck::Record { fields: cs.params().to_vec() },
        ColorSetKind::Alias => match cs.params().first() {
            None => ColorCheck::unchecked("alias without base type"),
            Some(base) => resolve_base(base, declared, depth),
        },
        ColorSetKind::Other(tag) => ColorCheck::unchecked(format!("unknown kind '{tag}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(name: &str, kind: &str, params: &[&str]) -> ColorSet {
        ColorSet::new(name, ColorSetKind::from_tag(kind), params.iter().map(|p| p.to_string()).collect())
    }

    fn table() -> ColorSetTable {
        ColorSetTable::compile([
            cs("UNIT", "unit", &[]),
            cs("INT", "int", &[]),
            cs("INTsum", "intsum", &[]),
            cs("NAME", "string", &[]),
            cs("COL", "enum", &["red", "green"]),
            cs("PAIR", "product", &["INT", "NAME"]),
            cs("NAMES", "list", &["NAME"]),
            cs("AGE", "alias", &["INT"]),
            cs("PERSON", "record", &["name", "age"]),
            cs("PH", "index", &[]),
            cs("LOOP", "alias", &["LOOP"]),
        ])
    }

    #[test]
    fn primitive_kinds() {
        let t = table();
        assert!(t.get("UNIT").unwrap().check(&Token::Unit));
        assert!(!t.get("UNIT").unwrap().check(&Token::str("unit")));
        assert!(t.get("INT").unwrap().check(&Token::Int(3)));
        assert!(t.get("INT").unwrap().check(&Token::str("42")));
        assert!(!t.get("INT").unwrap().check(&Token::str("x")));
        assert!(t.get("INTsum").unwrap().check(&Token::Int(3)));
        assert!(!t.get("NAME").unwrap().check(&Token::Int(3)));
    }

    #[test]
    fn structured_kinds() {
        let t = table();
        assert!(t.get("COL").unwrap().check(&Token::str("red")));
        assert!(!t.get("COL").unwrap().check(&Token::str("blue")));
        let pair = t.get("PAIR").unwrap();
        assert!(pair.check(&Token::Tuple(vec![Token::str("x"), Token::str("y")])));
        assert!(!pair.check(&Token::Tuple(vec![Token::Int(1)])));
        let names = t.get("NAMES").unwrap();
        assert!(names.check(&Token::List(vec![Token::str("a")])));
        assert!(!names.check(&Token::List(vec![Token::Int(1)])));
        assert!(t.get("AGE").unwrap().check(&Token::Int(7)));
    }

    #[test]
    fn records_are_checked_by_field_names_and_normalized() {
        let t = table();
        let person = t.get("PERSON").unwrap();
        let tok = Token::record([("age", Token::Int(3)), ("name", Token::str("a"))]);
        assert!(person.check(&tok));
        assert!(!person.check(&Token::record([("age", Token::Int(3))])));
        assert_eq!(
            person.normalize(tok),
            Token::record([("name", Token::str("a")), ("age", Token::Int(3))])
        );
    }

    #[test]
    fn unsupported_kinds_are_visibly_unchecked() {
        let t = table();
        assert!(t.get("PH").unwrap().is_unchecked());
        assert!(t.get("LOOP").unwrap().is_unchecked());
        assert!(t.check_for(Some("MISSING")).is_unchecked());
        assert_eq!(t.check_for(Some("int")), ColorCheck::Int);
    }

    #[test]
    fn finite_domains() {
        let t = table();
        assert_eq!(
            t.get("COL").unwrap().domain(),
            Some(vec![Token::str("red"), Token::str("green")])
        );
        assert_eq!(t.get("INT").unwrap().domain(), None);
        assert_eq!(t.enum_symbols().collect::<Vec<_>>(), vec!["red", "green"]);
    }
}
