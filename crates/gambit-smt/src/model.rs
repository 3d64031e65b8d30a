//! Decoding solver models.
//!
//! Solvers report coefficient values as small arithmetic expression
//! strings (sums, products, parenthesized negatives, divisions) rather
//! than raw literals, in either prefix s-expression form or ordinary
//! infix. [`parse_value`] evaluates that mini-grammar to an exact
//! rational; [`parse_define_funs`] extracts the `(define-fun name () Real
//! value)` entries of a model block. A value that fails to decode is an
//! error for that entry — never silently zero.

use indexmap::IndexMap;
use num::rational::Rational64;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("empty value expression")]
    Empty,
    #[error("syntax error in value `{input}`: {reason}")]
    Syntax { input: String, reason: String },
    #[error("division by zero in value `{0}`")]
    DivisionByZero(String),
    #[error("numeric overflow decoding `{0}`")]
    Overflow(String),
    #[error("malformed model entry `{0}`")]
    MalformedEntry(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(Rational64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn syntax(input: &str, reason: impl Into<String>) -> ModelError {
    ModelError::Syntax {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Tok>, ModelError> {
    let mut toks = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                toks.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                toks.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                toks.push(Tok::Star);
            }
            '/' => {
                chars.next();
                toks.push(Tok::Slash);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Num(parse_number(&text, input)?));
            }
            other => return Err(syntax(input, format!("unexpected character `{other}`"))),
        }
    }
    Ok(toks)
}

fn parse_number(text: &str, input: &str) -> Result<Rational64, ModelError> {
    match text.split_once('.') {
        None => text
            .parse::<i64>()
            .map(Rational64::from_integer)
            .map_err(|_| ModelError::Overflow(input.to_string())),
        Some((whole, frac)) => {
            let digits = format!("{whole}{frac}");
            let numer = digits
                .parse::<i64>()
                .map_err(|_| ModelError::Overflow(input.to_string()))?;
            let denom = 10i64
                .checked_pow(frac.len() as u32)
                .ok_or_else(|| ModelError::Overflow(input.to_string()))?;
            Ok(Rational64::new(numer, denom))
        }
    }
}

struct Cursor<'a> {
    toks: &'a [Tok],
    pos: usize,
    input: &'a str,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<Tok> {
        self.toks.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<Tok, ModelError> {
        let t = self
            .peek()
            .ok_or_else(|| syntax(self.input, "unexpected end of input"))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, want: Tok) -> Result<(), ModelError> {
        let got = self.next()?;
        if got == want {
            Ok(())
        } else {
            Err(syntax(self.input, format!("unexpected token {got:?}")))
        }
    }
}

// --- prefix (s-expression) form ---

fn parse_prefix(cur: &mut Cursor) -> Result<Rational64, ModelError> {
    match cur.next()? {
        Tok::Num(n) => Ok(n),
        Tok::LParen => {
            let op = cur.next()?;
            let mut operands = Vec::new();
            while cur.peek() != Some(Tok::RParen) {
                operands.push(parse_prefix(cur)?);
            }
            cur.expect(Tok::RParen)?;
            apply_prefix(op, &operands, cur.input)
        }
        other => Err(syntax(cur.input, format!("unexpected token {other:?}"))),
    }
}

fn apply_prefix(op: Tok, operands: &[Rational64], input: &str) -> Result<Rational64, ModelError> {
    match (op, operands) {
        (Tok::Minus, [only]) => Ok(-only),
        (Tok::Minus, [first, rest @ ..]) if !rest.is_empty() => {
            Ok(rest.iter().fold(*first, |acc, r| acc - r))
        }
        (Tok::Plus, [first, rest @ ..]) => Ok(rest.iter().fold(*first, |acc, r| acc + r)),
        (Tok::Star, [first, rest @ ..]) => Ok(rest.iter().fold(*first, |acc, r| acc * r)),
        (Tok::Slash, [first, rest @ ..]) if !rest.is_empty() => {
            let mut acc = *first;
            for r in rest {
                if *r.numer() == 0 {
                    return Err(ModelError::DivisionByZero(input.to_string()));
                }
                acc /= r;
            }
            Ok(acc)
        }
        _ => Err(syntax(input, "malformed prefix application")),
    }
}

// --- infix form ---

fn parse_infix_expr(cur: &mut Cursor) -> Result<Rational64, ModelError> {
    let mut acc = parse_infix_term(cur)?;
    while let Some(op) = cur.peek() {
        match op {
            Tok::Plus => {
                cur.pos += 1;
                acc += parse_infix_term(cur)?;
            }
            Tok::Minus => {
                cur.pos += 1;
                acc -= parse_infix_term(cur)?;
            }
            _ => break,
        }
    }
    Ok(acc)
}

fn parse_infix_term(cur: &mut Cursor) -> Result<Rational64, ModelError> {
    let mut acc = parse_infix_factor(cur)?;
    while let Some(op) = cur.peek() {
        match op {
            Tok::Star => {
                cur.pos += 1;
                acc *= parse_infix_factor(cur)?;
            }
            Tok::Slash => {
                cur.pos += 1;
                let rhs = parse_infix_factor(cur)?;
                if *rhs.numer() == 0 {
                    return Err(ModelError::DivisionByZero(cur.input.to_string()));
                }
                acc /= rhs;
            }
            _ => break,
        }
    }
    Ok(acc)
}

fn parse_infix_factor(cur: &mut Cursor) -> Result<Rational64, ModelError> {
    match cur.next()? {
        Tok::Num(n) => Ok(n),
        Tok::Minus => Ok(-parse_infix_factor(cur)?),
        Tok::LParen => {
            let inner = parse_infix_expr(cur)?;
            cur.expect(Tok::RParen)?;
            Ok(inner)
        }
        other => Err(syntax(cur.input, format!("unexpected token {other:?}"))),
    }
}

/// Evaluate one model value string to an exact rational. Accepts the
/// prefix s-expression form solvers print (`(- 1)`, `(/ 3 2)`,
/// `(+ 1 (* 2 3))`) and plain infix (`-1.5`, `2 + 3*4`, `(1 + 2) / 3`).
pub fn parse_value(input: &str) -> Result<Rational64, ModelError> {
    let toks = tokenize(input)?;
    if toks.is_empty() {
        return Err(ModelError::Empty);
    }

    let mut cur = Cursor {
        toks: &toks,
        pos: 0,
        input,
    };
    if let Ok(value) = parse_prefix(&mut cur) {
        if cur.pos == toks.len() {
            return Ok(value);
        }
    }

    let mut cur = Cursor {
        toks: &toks,
        pos: 0,
        input,
    };
    let value = parse_infix_expr(&mut cur)?;
    if cur.pos != toks.len() {
        return Err(syntax(input, "trailing tokens"));
    }
    Ok(value)
}

/// Extract `(define-fun name () Real value)` entries from solver output
/// and decode each value. Entries of other shapes (non-nullary, unexpected
/// sorts) are malformed.
pub fn parse_define_funs(output: &str) -> Result<IndexMap<String, Rational64>, ModelError> {
    let mut values = IndexMap::new();
    let mut rest = output;
    while let Some(at) = rest.find("define-fun") {
        rest = &rest[at + "define-fun".len()..];
        let (name, after_name) = take_symbol(rest)?;
        let after_args = expect_empty_args(after_name, &name)?;
        let (_sort, after_sort) = take_symbol(after_args)?;
        let (value_text, after_value) = take_value_chunk(after_sort, &name)?;
        values.insert(name, parse_value(value_text)?);
        rest = after_value;
    }
    Ok(values)
}

fn take_symbol(text: &str) -> Result<(String, &str), ModelError> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .unwrap_or(trimmed.len());
    if end == 0 {
        return Err(ModelError::MalformedEntry(
            trimmed.chars().take(16).collect(),
        ));
    }
    Ok((trimmed[..end].to_string(), &trimmed[end..]))
}

fn expect_empty_args<'a>(text: &'a str, entry: &str) -> Result<&'a str, ModelError> {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('(') else {
        return Err(ModelError::MalformedEntry(entry.to_string()));
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix(')') else {
        return Err(ModelError::MalformedEntry(entry.to_string()));
    };
    Ok(rest)
}

fn take_value_chunk<'a>(text: &'a str, entry: &str) -> Result<(&'a str, &'a str), ModelError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('(') {
        let mut depth = 0usize;
        for (i, ch) in trimmed.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((&trimmed[..=i], &trimmed[i + 1..]));
                    }
                }
                _ => {}
            }
        }
        Err(ModelError::MalformedEntry(entry.to_string()))
    } else {
        let end = trimmed
            .find(|c: char| c.is_whitespace() || c == ')')
            .unwrap_or(trimmed.len());
        if end == 0 {
            return Err(ModelError::MalformedEntry(entry.to_string()));
        }
        Ok((&trimmed[..end], &trimmed[end..]))
    }
}
