//! Numeric literal parsing and the small constant-expression evaluator
//! used for `.set`/`.if`/`.rept` arguments and displacement math.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character {0:?} in expression")]
    UnexpectedChar(char),
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("malformed expression")]
    Malformed,
}

/// Parse a bare numeric literal: decimal, `0x`/`0X` hex, `0b` binary, and
/// the alternative `$` (hex) and `%` (binary) prefixes. Returns `None` for
/// anything that is not a pure literal.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if body.is_empty() {
        return None;
    }
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(hex) = body.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = body.strip_prefix('%') {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

/// Evaluate an assembler constant expression with `+ - * / % ( )`, unary
/// minus, numeric literals, and symbols resolved from `vars`.
pub fn eval(text: &str, vars: &HashMap<String, i64>) -> Result<i64, ExprError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        vars,
    };
    let value = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(ExprError::Malformed);
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Sym(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Tok>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                    i += 1;
                }
                let lit = &text[start..i];
                tokens.push(Tok::Num(parse_number(lit).ok_or(ExprError::Malformed)?));
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                    i += 1;
                }
                let lit = &text[start..i];
                tokens.push(Tok::Num(parse_number(lit).ok_or(ExprError::Malformed)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Sym(text[start..i].to_string()));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    vars: &'a HashMap<String, i64>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expr(&mut self) -> Result<i64, ExprError> {
        let mut value = self.term()?;
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Plus => {
                    self.pos += 1;
                    value = value.wrapping_add(self.term()?);
                }
                Tok::Minus => {
                    self.pos += 1;
                    value = value.wrapping_sub(self.term()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<i64, ExprError> {
        let mut value = self.factor()?;
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Star => {
                    self.pos += 1;
                    value = value.wrapping_mul(self.factor()?);
                }
                Tok::Slash => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    value /= rhs;
                }
                Tok::Percent => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    value %= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<i64, ExprError> {
        match self.bump().ok_or(ExprError::Malformed)? {
            Tok::Num(v) => Ok(v),
            Tok::Sym(name) => self
                .vars
                .get(&name)
                .copied()
                .ok_or(ExprError::UnknownSymbol(name)),
            Tok::Minus => Ok(self.factor()?.wrapping_neg()),
            Tok::Plus => self.factor(),
            Tok::LParen => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(ExprError::Malformed),
                }
            }
            _ => Err(ExprError::Malformed),
        }
    }
}
