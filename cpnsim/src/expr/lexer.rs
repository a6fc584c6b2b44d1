//! Tokenizer for the inscription language (CPN ML subset).
//!
//! Whitespace and `(* ... *)` comments are skipped. Operator spellings that
//! mean the same thing share a variant: `=`/`==` are [`Lexeme::Eq`],
//! `<>`/`!=` are [`Lexeme::Ne`]. `^` is string concatenation in ML and is
//! lexed as [`Lexeme::Plus`].

use std::ops::Range;

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"\(\*([^*]|\*+[^*)])*\*+\)")]
pub enum Lexeme {
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("andalso")]
    AndAlso,
    #[token("orelse")]
    OrElse,
    #[token("not")]
    Not,
    #[token("div")]
    Div,
    #[token("mod")]
    Mod,
    #[token("empty")]
    Empty,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token("_")]
    Underscore,

    /// Multiplicity operator.
    #[token("`")]
    Backtick,
    #[token("++")]
    PlusPlus,
    #[token("+")]
    #[token("^")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("~")]
    Tilde,
    #[token("::")]
    ColonColon,
    #[token("^^")]
    CaretCaret,
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("<>")]
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    #[regex("[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Real(f64),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    /// Record field selector `#name`.
    #[regex(r"#[A-Za-z_][A-Za-z0-9_']*", |lex| lex.slice()[1..].to_string())]
    Field(String),
    #[regex(r"[A-Za-z][A-Za-z0-9_']*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Tokenize a fragment. Returns the byte range of the first unrecognized
/// character on failure.
pub fn tokenize(source: &str) -> Result<Vec<(Lexeme, Range<usize>)>, Range<usize>> {
    let mut lexer = Lexeme::lexer(source);
    let mut out = Vec::new();
    while let Some(next) = lexer.next() {
        match next {
            Ok(lexeme) => out.push((lexeme, lexer.span())),
            Err(()) => return Err(lexer.span()),
        }
    }
    Ok(out)
}
