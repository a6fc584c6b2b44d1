use std::{cmp::Ordering, fmt::Display};

/// A colored token value.
///
/// Tokens are immutable and compare structurally. Reals are ordered with
/// `f64::total_cmp`, so every token has a total order and can be used as a
/// multiset key.
#[derive(Clone, Debug)]
pub enum Token {
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Tuple(Vec<Token>),
    /// Record fields in declared order. Equality and ordering ignore the
    /// field order.
    Record(Vec<(String, Token)>),
    List(Vec<Token>),
}

impl Token {
    pub fn str(value: impl Into<String>) -> Self {
        Token::Str(value.into())
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Token)>) -> Self {
        Token::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short tag naming the token's variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Token::Unit => "unit",
            Token::Bool(_) => "bool",
            Token::Int(_) => "int",
            Token::Real(_) => "real",
            Token::Str(_) => "string",
            Token::Tuple(_) => "tuple",
            Token::Record(_) => "record",
            Token::List(_) => "list",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Field lookup on a record token.
    pub fn field(&self, name: &str) -> Option<&Token> {
        match self {
            Token::Record(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The "string form" of a token as used for enum membership: the bare
    /// symbol for strings, the display form otherwise.
    pub fn symbol(&self) -> String {
        match self {
            Token::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Token::Unit => 0,
            Token::Bool(_) => 1,
            Token::Int(_) => 2,
            Token::Real(_) => 3,
            Token::Str(_) => 4,
            Token::Tuple(_) => 5,
            Token::Record(_) => 6,
            Token::List(_) => 7,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Token {}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Unit, Token::Unit) => Ordering::Equal,
            (Token::Bool(a), Token::Bool(b)) => a.cmp(b),
            (Token::Int(a), Token::Int(b)) => a.cmp(b),
            (Token::Real(a), Token::Real(b)) => a.total_cmp(b),
            (Token::Str(a), Token::Str(b)) => a.cmp(b),
            (Token::Tuple(a), Token::Tuple(b)) | (Token::List(a), Token::List(b)) => a.cmp(b),
            (Token::Record(a), Token::Record(b)) => by_field_name(a).cmp(&by_field_name(b)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn by_field_name(fields: &[(String, Token)]) -> Vec<&(String, Token)> {
    let mut sorted: Vec<_> = fields.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

fn write_seq(
    f: &mut std::fmt::Formatter<'_>,
    open: &str,
    items: &[Token],
    close: &str,
) -> std::fmt::Result {
    write!(f, "{open}")?;
    for (idx, item) in items.iter().enumerate() {
        if idx == 0 {
            write!(f, "{}", item)?;
        } else {
            write!(f, ",{}", item)?;
        }
    }
    write!(f, "{close}")
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Unit => write!(f, "()"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Int(i) if *i < 0 => write!(f, "~{}", i.unsigned_abs()),
            Token::Int(i) => write!(f, "{i}"),
            Token::Real(r) => write!(f, "{r:?}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Tuple(items) => write_seq(f, "(", items, ")"),
            Token::List(items) => write_seq(f, "[", items, "]"),
            Token::Record(fields) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Token::Int(value)
    }
}

impl From<bool> for Token {
    fn from(value: bool) -> Self {
        Token::Bool(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::Str(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reals_have_total_order() {
        let nan = Token::Real(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert!(Token::Real(1.0) < Token::Real(2.5));
    }

    #[test]
    fn variants_order_by_rank() {
        assert!(Token::Unit < Token::Int(-5));
        assert!(Token::Int(100) < Token::str("a"));
    }

    #[test]
    fn records_compare_by_field_name() {
        let declared = Token::record([("name", Token::str("bob")), ("age", Token::Int(3))]);
        let swapped = Token::record([("age", Token::Int(3)), ("name", Token::str("bob"))]);
        assert_eq!(declared, swapped);
        assert_eq!(declared.cmp(&swapped), Ordering::Equal);
        let older = Token::record([("age", Token::Int(4)), ("name", Token::str("bob"))]);
        assert_ne!(declared, older);
        assert!(declared < older);
    }

    #[test]
    fn display_uses_ml_notation() {
        let tok = Token::Tuple(vec![Token::Int(-1), Token::str("COL"), Token::Unit]);
        assert_eq!(tok.to_string(), "(~1,\"COL\",())");
        let rec = Token::record([("name", Token::str("a")), ("age", Token::Int(3))]);
        assert_eq!(rec.to_string(), "{name=\"a\",age=3}");
        assert_eq!(rec.field("age"), Some(&Token::Int(3)));
    }
}
