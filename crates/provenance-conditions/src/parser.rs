//! Lexer and recursive-descent parser.
//!
//! Precedence, loosest first:
//!
//! | level        | forms                        |
//! |--------------|------------------------------|
//! | `or`         | `a or b or ...`              |
//! | `and`        | `a and b and ...`            |
//! | `not`        | `not a`                      |
//! | comparison   | `a < b <= c`, chained        |
//! | `^`          | integer xor                  |
//! | `+ -`        | left-associative             |
//! | `* /`        | left-associative             |
//! | unary `-`    | prefix                       |
//! | `**`         | right-associative            |
//!
//! `-2 ** 2` is `-(2 ** 2)`, and a negative exponent such as `2 ** -1` is allowed.

use crate::ast::{BinaryOperator, BoolOperator, CompareOperator, Expr, UnaryOperator, Value};
use crate::error::{ConditionError, Result};

/// Deepest nesting of parentheses and prefix operators accepted.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    And,
    Or,
    Not,
    True,
    False,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Caret,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    LParen,
    RParen,
}

fn parse_error<T>(position: usize, message: impl Into<String>) -> Result<T> {
    Err(ConditionError::Parse {
        position,
        message: message.into(),
    })
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let (token, end) = lex_number(source, pos)?;
            tokens.push((start, token));
            pos = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let token = match &source[start..pos] {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "True" => Token::True,
                "False" => Token::False,
                ident => Token::Ident(ident.to_string()),
            };
            tokens.push((start, token));
            continue;
        }

        if c == b'\'' || c == b'"' {
            let (text, end) = lex_string(source, pos)?;
            tokens.push((start, Token::Str(text)));
            pos = end;
            continue;
        }

        let two = bytes.get(pos..pos + 2);
        let (token, width) = match two {
            Some(b"**") => (Token::DoubleStar, 2),
            Some(b"==") => (Token::EqEq, 2),
            Some(b"!=") => (Token::NotEq, 2),
            Some(b"<=") => (Token::LtE, 2),
            Some(b">=") => (Token::GtE, 2),
            _ => match c {
                b'+' => (Token::Plus, 1),
                b'-' => (Token::Minus, 1),
                b'*' => (Token::Star, 1),
                b'/' => (Token::Slash, 1),
                b'^' => (Token::Caret, 1),
                b'<' => (Token::Lt, 1),
                b'>' => (Token::Gt, 1),
                b'(' => (Token::LParen, 1),
                b')' => (Token::RParen, 1),
                _ => {
                    let ch = source[pos..].chars().next().unwrap_or('?');
                    return parse_error(pos, format!("unexpected character {:?}", ch));
                }
            },
        };
        tokens.push((start, token));
        pos += width;
    }

    Ok(tokens)
}

fn lex_number(source: &str, start: usize) -> Result<(Token, usize)> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut is_float = false;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut end = pos + 1;
        if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
            end += 1;
        }
        let digits = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end == digits {
            return parse_error(pos, "malformed exponent");
        }
        is_float = true;
        pos = end;
    }
    if pos < bytes.len() && (bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
        return parse_error(pos, "invalid numeric literal");
    }

    let text = &source[start..pos];
    let token = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| ConditionError::Parse {
                    position: start,
                    message: format!("invalid number {}", text),
                })?,
        )
    } else {
        // Integers beyond i64 degrade to floats.
        match text.parse::<i64>() {
            Ok(v) => Token::Int(v),
            Err(_) => Token::Float(text.parse().map_err(|_| ConditionError::Parse {
                position: start,
                message: format!("invalid number {}", text),
            })?),
        }
    };
    Ok((token, pos))
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize)> {
    let mut chars = source[start..].char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return parse_error(start, "expected string"),
    };
    let mut text = String::new();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((text, start + offset + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, '0')) => text.push('\0'),
                Some((_, other @ ('\\' | '\'' | '"'))) => text.push(other),
                Some((_, other)) => {
                    text.push('\\');
                    text.push(other);
                }
                None => break,
            },
            '\n' => break,
            c => text.push(c),
        }
    }

    parse_error(start, "unterminated string literal")
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return parse_error(self.position(), "expression nested too deeply");
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::Or,
            operands,
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_not()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::And) {
            operands.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::And,
            operands,
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_xor()?;
        let mut comparisons = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => CompareOperator::Eq,
                Some(Token::NotEq) => CompareOperator::NotEq,
                Some(Token::Lt) => CompareOperator::Lt,
                Some(Token::LtE) => CompareOperator::LtE,
                Some(Token::Gt) => CompareOperator::Gt,
                Some(Token::GtE) => CompareOperator::GtE,
                _ => break,
            };
            self.pos += 1;
            comparisons.push((op, self.parse_xor()?));
        }
        if comparisons.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            comparisons,
        })
    }

    fn parse_xor(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        while self.eat(&Token::Caret) {
            let right = self.parse_additive()?;
            left = binary(BinaryOperator::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOperator::Mul,
                Some(Token::Slash) => BinaryOperator::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(binary(BinaryOperator::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let position = self.position();
        match self.advance() {
            Some(Token::Int(v)) => Ok(Expr::Literal(Value::Int(v))),
            Some(Token::Float(v)) => Ok(Expr::Literal(Value::Float(v))),
            Some(Token::Str(v)) => Ok(Expr::Literal(Value::Str(v))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                if !self.eat(&Token::RParen) {
                    return parse_error(self.position(), "expected ')'");
                }
                Ok(inner)
            }
            Some(other) => parse_error(position, format!("unexpected token {:?}", other)),
            None => parse_error(position, "unexpected end of expression"),
        }
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a condition script.
///
/// Returns `Ok(None)` for a blank script, which always holds.
pub fn parse(source: &str) -> Result<Option<Expr>> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let position = parser.position();
        return parse_error(position, "unexpected trailing input");
    }
    Ok(Some(expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse(source).unwrap().unwrap()
    }

    fn lit(v: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(v)))
    }

    #[test]
    fn test_blank_script() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   \n\t").unwrap(), None);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_ok("42"), Expr::Literal(Value::Int(42)));
        assert_eq!(parse_ok("1.5e3"), Expr::Literal(Value::Float(1500.0)));
        assert_eq!(parse_ok(".5"), Expr::Literal(Value::Float(0.5)));
        assert_eq!(parse_ok("'bob'"), Expr::Literal(Value::Str("bob".into())));
        assert_eq!(parse_ok(r#""it\"s""#), Expr::Literal(Value::Str("it\"s".into())));
        assert_eq!(parse_ok("True"), Expr::Literal(Value::Bool(true)));
        assert_eq!(
            parse_ok("99999999999999999999"),
            Expr::Literal(Value::Float(1e20))
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(
            parse_ok("1 + 2 * 3"),
            Expr::BinaryOp {
                op: BinaryOperator::Add,
                left: lit(1),
                right: Box::new(Expr::BinaryOp {
                    op: BinaryOperator::Mul,
                    left: lit(2),
                    right: lit(3),
                }),
            }
        );
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        assert_eq!(
            parse_ok("-2 ** 2"),
            Expr::UnaryOp {
                op: UnaryOperator::Neg,
                operand: Box::new(Expr::BinaryOp {
                    op: BinaryOperator::Pow,
                    left: lit(2),
                    right: lit(2),
                }),
            }
        );
        // Right-associative.
        assert_eq!(
            parse_ok("2 ** 3 ** 2"),
            Expr::BinaryOp {
                op: BinaryOperator::Pow,
                left: lit(2),
                right: Box::new(Expr::BinaryOp {
                    op: BinaryOperator::Pow,
                    left: lit(3),
                    right: lit(2),
                }),
            }
        );
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(
            parse_ok("1 < 2 <= 3"),
            Expr::Compare {
                left: lit(1),
                comparisons: vec![
                    (CompareOperator::Lt, Expr::Literal(Value::Int(2))),
                    (CompareOperator::LtE, Expr::Literal(Value::Int(3))),
                ],
            }
        );
    }

    #[test]
    fn test_boolean_structure() {
        let expr = parse_ok("amount >= 5 and recipient == 'bob' or not flag");
        let Expr::BoolOp { op: BoolOperator::Or, operands } = expr else {
            panic!("expected or at the root");
        };
        assert_eq!(operands.len(), 2);
        assert!(matches!(
            &operands[0],
            Expr::BoolOp { op: BoolOperator::And, operands } if operands.len() == 2
        ));
        assert!(matches!(
            &operands[1],
            Expr::UnaryOp { op: UnaryOperator::Not, .. }
        ));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["1 +", "(1", "1 2", "a = 1", "'open", "1e", "3abc", "x @ y", "and"] {
            assert!(
                matches!(parse(bad), Err(ConditionError::Parse { .. })),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(parse(&deep), Err(ConditionError::Parse { .. })));

        let ok = format!("{}1{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert!(parse(&ok).is_ok());
    }
}
