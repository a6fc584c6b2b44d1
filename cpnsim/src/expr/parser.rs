//! Recursive descent parser with precedence climbing for binary operators.
//!
//! Precedence, lowest to highest:
//!
//! 1. `++` (multiset union), left
//! 2. `` ` `` (multiplicity), right
//! 3. `orelse`, left
//! 4. `andalso`, left
//! 5. `=`, `<>`, `<`, `<=`, `>`, `>=`, left
//! 6. `::`, `^^`, right
//! 7. `+`, `-` (and `^`), left
//! 8. `*`, `/`, `div`, `mod`, left
//! 9. prefix `~`, `-`, `not`, `if ... then ... else`, `#field`
//! 10. atoms and function application `f(args)`

use std::{fmt::Display, ops::Range};

use super::{
    ast::{BinOp, Expr, UnaryOp},
    lexer::{tokenize, Lexeme},
};
use crate::color::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        ParseError { message: message.into(), span }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

fn binary_op_info(lexeme: &Lexeme) -> Option<(u8, Assoc, Option<BinOp>)> {
    match lexeme {
        Lexeme::PlusPlus => Some((5, Assoc::Left, Some(BinOp::Union))),
        // multiplicity is not a BinOp, it builds its own node
        Lexeme::Backtick => Some((8, Assoc::Right, None)),
        Lexeme::OrElse => Some((10, Assoc::Left, Some(BinOp::Or))),
        Lexeme::AndAlso => Some((20, Assoc::Left, Some(BinOp::And))),
        Lexeme::Eq => Some((30, Assoc::Left, Some(BinOp::Eq))),
        Lexeme::Ne => Some((30, Assoc::Left, Some(BinOp::Ne))),
        Lexeme::Lt => Some((30, Assoc::Left, Some(BinOp::Lt))),
        Lexeme::Le => Some((30, Assoc::Left, Some(BinOp::Le))),
        Lexeme::Gt => Some((30, Assoc::Left, Some(BinOp::Gt))),
        Lexeme::Ge => Some((30, Assoc::Left, Some(BinOp::Ge))),
        Lexeme::ColonColon => Some((35, Assoc::Right, Some(BinOp::Cons))),
        Lexeme::CaretCaret => Some((35, Assoc::Right, Some(BinOp::Append))),
        Lexeme::Plus => Some((40, Assoc::Left, Some(BinOp::Add))),
        Lexeme::Minus => Some((40, Assoc::Left, Some(BinOp::Sub))),
        Lexeme::Star => Some((50, Assoc::Left, Some(BinOp::Mul))),
        Lexeme::Slash => Some((50, Assoc::Left, Some(BinOp::Div))),
        Lexeme::Div => Some((50, Assoc::Left, Some(BinOp::IntDiv))),
        Lexeme::Mod => Some((50, Assoc::Left, Some(BinOp::Mod))),
        _ => None,
    }
}

struct TokenStream<'src> {
    tokens: &'src [(Lexeme, Range<usize>)],
    pos: usize,
    end: usize,
}

impl<'src> TokenStream<'src> {
    fn peek(&self) -> Option<&'src Lexeme> {
        self.tokens.get(self.pos).map(|(l, _)| l)
    }

    fn advance(&mut self) -> Option<&'src Lexeme> {
        let lexeme = self.tokens.get(self.pos).map(|(l, _)| l);
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn current_span(&self) -> Range<usize> {
        self.tokens.get(self.pos).map(|(_, s)| s.clone()).unwrap_or(self.end..self.end)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, expected: &Lexeme) -> bool {
        matches!(self.peek(), Some(l) if std::mem::discriminant(l) == std::mem::discriminant(expected))
    }

    fn expect(&mut self, expected: Lexeme, context: &str) -> Result<(), ParseError> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {expected:?} {context}")))
        }
    }

    fn unexpected(&self, context: &str) -> ParseError {
        match self.peek() {
            Some(found) => {
                ParseError::new(format!("unexpected {found:?}, {context}"), self.current_span())
            }
            None => ParseError::new(format!("unexpected end of input, {context}"), self.current_span()),
        }
    }
}

/// Parse a complete inscription.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)
        .map_err(|span| ParseError::new("unrecognized character", span))?;
    let mut stream = TokenStream { tokens: &tokens, pos: 0, end: source.len() };
    if stream.at_end() {
        return Err(ParseError::new("empty expression", 0..source.len()));
    }
    let expr = parse_expr(&mut stream, 0)?;
    if !stream.at_end() {
        return Err(stream.unexpected("expected end of expression"));
    }
    Ok(expr)
}

fn parse_expr(stream: &mut TokenStream, min_prec: u8) -> Result<Expr, ParseError> {
    let mut left = parse_prefix(stream)?;

    while let Some(lexeme) = stream.peek() {
        let Some((prec, assoc, op)) = binary_op_info(lexeme) else {
            break;
        };
        if prec < min_prec {
            break;
        }
        stream.advance();
        let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
        let right = parse_expr(stream, next_prec)?;
        left = match op {
            Some(op) => Expr::binary(op, left, right),
            None => Expr::Multiplicity { count: Box::new(left), value: Box::new(right) },
        };
    }

    Ok(left)
}

fn parse_prefix(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    match stream.peek() {
        Some(Lexeme::Tilde) | Some(Lexeme::Minus) => {
            stream.advance();
            let operand = parse_prefix(stream)?;
            Ok(match operand {
                Expr::Literal(Token::Int(i)) => Expr::Literal(Token::Int(-i)),
                Expr::Literal(Token::Real(r)) => Expr::Literal(Token::Real(-r)),
                operand => Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) },
            })
        }
        Some(Lexeme::Not) => {
            stream.advance();
            let operand = parse_prefix(stream)?;
            Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) })
        }
        Some(Lexeme::If) => parse_if(stream),
        Some(Lexeme::Field(field)) => {
            stream.advance();
            let record = parse_prefix(stream)?;
            Ok(Expr::FieldAccess { field: field.clone(), record: Box::new(record) })
        }
        _ => parse_atom(stream),
    }
}

fn parse_if(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    stream.expect(Lexeme::If, "to start a conditional")?;
    let cond = parse_expr(stream, 0)?;
    stream.expect(Lexeme::Then, "after the condition")?;
    let then_branch = parse_expr(stream, 0)?;
    stream.expect(Lexeme::Else, "in a conditional")?;
    let else_branch = parse_expr(stream, 0)?;
    Ok(Expr::Conditional {
        cond: Box::new(cond),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    })
}

/// Comma separated expressions up to (and including) `close`.
fn parse_sequence(stream: &mut TokenStream, close: Lexeme) -> Result<Vec<Expr>, ParseError> {
    let mut items = Vec::new();
    if stream.check(&close) {
        stream.advance();
        return Ok(items);
    }
    loop {
        items.push(parse_expr(stream, 0)?);
        match stream.peek() {
            Some(Lexeme::Comma) => {
                stream.advance();
            }
            Some(l) if std::mem::discriminant(l) == std::mem::discriminant(&close) => {
                stream.advance();
                return Ok(items);
            }
            _ => return Err(stream.unexpected(&format!("expected ',' or {close:?}"))),
        }
    }
}

fn parse_record(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut fields = Vec::new();
    if stream.check(&Lexeme::RBrace) {
        stream.advance();
        return Ok(Expr::Record(fields));
    }
    loop {
        let Some(Lexeme::Ident(name)) = stream.peek() else {
            return Err(stream.unexpected("expected a record field name"));
        };
        stream.advance();
        stream.expect(Lexeme::Eq, "after a record field name")?;
        fields.push((name.clone(), parse_expr(stream, 0)?));
        match stream.peek() {
            Some(Lexeme::Comma) => {
                stream.advance();
            }
            Some(Lexeme::RBrace) => {
                stream.advance();
                return Ok(Expr::Record(fields));
            }
            _ => return Err(stream.unexpected("expected ',' or '}' in a record")),
        }
    }
}

fn parse_atom(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let span = stream.current_span();
    let Some(lexeme) = stream.advance() else {
        return Err(ParseError::new("unexpected end of input, expected an expression", span));
    };
    match lexeme {
        Lexeme::Int(i) => Ok(Expr::Literal(Token::Int(*i))),
        Lexeme::Real(r) => Ok(Expr::Literal(Token::Real(*r))),
        Lexeme::Str(s) => Ok(Expr::Literal(Token::Str(s.clone()))),
        Lexeme::True => Ok(Expr::Literal(Token::Bool(true))),
        Lexeme::False => Ok(Expr::Literal(Token::Bool(false))),
        Lexeme::Empty => Ok(Expr::Empty),
        Lexeme::Underscore => Ok(Expr::Wildcard),
        Lexeme::Ident(name) => {
            if stream.check(&Lexeme::LParen) {
                stream.advance();
                let args = parse_sequence(stream, Lexeme::RParen)?;
                Ok(Expr::Call { name: name.clone(), args })
            } else {
                Ok(Expr::Var(name.clone()))
            }
        }
        Lexeme::LParen => {
            if stream.check(&Lexeme::RParen) {
                stream.advance();
                return Ok(Expr::Literal(Token::Unit));
            }
            let mut items = parse_sequence(stream, Lexeme::RParen)?;
            if items.len() == 1 {
                Ok(items.remove(0))
            } else {
                Ok(Expr::Tuple(items))
            }
        }
        Lexeme::LBracket => Ok(Expr::List(parse_sequence(stream, Lexeme::RBracket)?)),
        Lexeme::LBrace => parse_record(stream),
        other => Err(ParseError::new(format!("unexpected {other:?}, expected an expression"), span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.into())
    }

    fn int(i: i64) -> Expr {
        Expr::Literal(Token::Int(i))
    }

    #[test]
    fn multiplicity_binds_looser_than_arithmetic() {
        assert_eq!(
            parse("2`x+1").unwrap(),
            Expr::Multiplicity {
                count: Box::new(int(2)),
                value: Box::new(Expr::binary(BinOp::Add, var("x"), int(1))),
            }
        );
    }

    #[test]
    fn union_of_terms() {
        let expr = parse("1`a ++ 2`(b, 3)").unwrap();
        let Expr::BinOp { op: BinOp::Union, left, right } = expr else {
            panic!("expected a union");
        };
        assert_eq!(*left, Expr::Multiplicity { count: Box::new(int(1)), value: Box::new(var("a")) });
        assert_eq!(
            *right,
            Expr::Multiplicity {
                count: Box::new(int(2)),
                value: Box::new(Expr::Tuple(vec![var("b"), int(3)])),
            }
        );
    }

    #[test]
    fn relational_operators() {
        assert_eq!(parse("in1<>in2").unwrap(), Expr::binary(BinOp::Ne, var("in1"), var("in2")));
        assert_eq!(parse("a<=b").unwrap(), Expr::binary(BinOp::Le, var("a"), var("b")));
        assert_eq!(
            parse("x = 1 andalso y >= 2").unwrap(),
            Expr::binary(
                BinOp::And,
                Expr::binary(BinOp::Eq, var("x"), int(1)),
                Expr::binary(BinOp::Ge, var("y"), int(2))
            )
        );
    }

    #[test]
    fn caret_is_addition() {
        assert_eq!(parse("s ^ \"!\"").unwrap(), Expr::binary(
            BinOp::Add,
            var("s"),
            Expr::Literal(Token::str("!"))
        ));
    }

    #[test]
    fn conditional_with_empty_else() {
        assert_eq!(
            parse("if ok then 1`x else empty").unwrap(),
            Expr::Conditional {
                cond: Box::new(var("ok")),
                then_branch: Box::new(Expr::Multiplicity {
                    count: Box::new(int(1)),
                    value: Box::new(var("x")),
                }),
                else_branch: Box::new(Expr::Empty),
            }
        );
    }

    #[test]
    fn field_access_records_and_lists() {
        assert_eq!(
            parse("#age p + 1").unwrap(),
            Expr::binary(
                BinOp::Add,
                Expr::FieldAccess { field: "age".into(), record: Box::new(var("p")) },
                int(1)
            )
        );
        assert_eq!(
            parse("{name = \"a\", age = 3}").unwrap(),
            Expr::Record(vec![
                ("name".into(), Expr::Literal(Token::str("a"))),
                ("age".into(), int(3)),
            ])
        );
        assert_eq!(
            parse("x::xs").unwrap(),
            Expr::binary(BinOp::Cons, var("x"), var("xs"))
        );
        assert_eq!(parse("[]").unwrap(), Expr::List(vec![]));
        assert_eq!(parse("()").unwrap(), Expr::Literal(Token::Unit));
        assert_eq!(parse("~3").unwrap(), int(-3));
    }

    #[test]
    fn calls() {
        assert_eq!(
            parse("f(x, 1)").unwrap(),
            Expr::Call { name: "f".into(), args: vec![var("x"), int(1)] }
        );
    }

    #[test]
    fn errors_carry_spans() {
        let err = parse("(x, y").unwrap_err();
        assert_eq!(err.span, 5..5);
        assert!(parse("x y").is_err());
        assert!(parse("").is_err());
        assert!(parse("let val x = 1 in x end").is_err());
    }
}
