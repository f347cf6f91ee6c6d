//! Formula parser.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := ('+' | '-') unary | power
//! power  := atom (('^' | '**') unary)?
//! atom   := number | identifier | moment | '(' expr ')'
//! moment := 'm[' digits '][' digits ']'
//! ```
//!
//! `moment` is a lexer rule tried before identifiers, so `m[0][1]` is a single
//! symbol rather than an indexing of `m`. Exponents must reduce to integers,
//! and every intermediate result stays below [`MAX_DEGREE`] in each symbol and
//! [`MAX_COEFFICIENT_BITS`] in each coefficient.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use thiserror::Error;

use super::{Expr, Poly, Symbol};

/// Largest exponent of a symbol a formula may produce.
pub const MAX_DEGREE: u32 = 1024;

/// Largest numerator or denominator, in bits, a formula may produce.
pub const MAX_COEFFICIENT_BITS: u64 = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{input}` at position {position}: {message}")]
pub struct ParseError {
    pub input: String,
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(BigRational),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            input: self.input.to_string(),
            position,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ParseError> {
        let mut tokens = Vec::new();
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let c = self.bytes[self.pos];
            let token = match c {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.pos += 1;
                    continue;
                }
                b'+' => self.single(Token::Plus),
                b'-' => self.single(Token::Minus),
                b'/' => self.single(Token::Slash),
                b'^' => self.single(Token::Caret),
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b'*' => {
                    if self.bytes.get(self.pos + 1) == Some(&b'*') {
                        self.pos += 2;
                        Token::Caret
                    } else {
                        self.single(Token::Star)
                    }
                }
                b'0'..=b'9' | b'.' => self.number()?,
                c if c == b'_' || c.is_ascii_alphabetic() => match self.moment() {
                    Some(name) => Token::Ident(name),
                    None => self.identifier(),
                },
                _ => {
                    return Err(self.error(start, format!("unexpected character `{}`", c as char)));
                }
            };
            tokens.push((start, token));
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn digits(&mut self) -> &'a str {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// `m[<int>][<int>]`, consumed only when the whole pattern matches.
    fn moment(&mut self) -> Option<String> {
        let rest = &self.bytes[self.pos..];
        if rest.first() != Some(&b'm') || rest.get(1) != Some(&b'[') {
            return None;
        }
        let save = self.pos;
        self.pos += 2;
        let i = self.digits();
        let ok = !i.is_empty() && self.bytes[self.pos..].starts_with(b"][");
        if !ok {
            self.pos = save;
            return None;
        }
        self.pos += 2;
        let j = self.digits();
        if j.is_empty() || self.bytes.get(self.pos) != Some(&b']') {
            self.pos = save;
            return None;
        }
        self.pos += 1;
        let (i, j) = (i.parse::<usize>().ok()?, j.parse::<usize>().ok()?);
        Some(Symbol::moment(i, j).name().to_string())
    }

    fn identifier(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos] == b'_' || self.bytes[self.pos].is_ascii_alphanumeric())
        {
            self.pos += 1;
        }
        Token::Ident(self.input[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.digits();
        if self.bytes.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            self.digits();
        }
        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.bytes.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits().is_empty() {
                self.pos = save;
            }
        }
        let text = &self.input[start..self.pos];
        parse_decimal(text)
            .map(Token::Number)
            .ok_or_else(|| self.error(start, format!("malformed number `{text}`")))
    }
}

/// Exact value of a decimal literal such as `1.9`, `.5` or `2.5e-3`.
pub fn parse_decimal(text: &str) -> Option<BigRational> {
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(i) => (&text[..i], text[i + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
    let scale = exponent - i32::try_from(frac_part.len()).ok()?;
    let ten = BigInt::from(10);
    let value = if scale >= 0 {
        BigRational::from_integer(digits * num_traits::pow(ten, scale as usize))
    } else {
        BigRational::new(digits, num_traits::pow(ten, scale.unsigned_abs() as usize))
    };
    Some(if negative { -value } else { value })
}

/// Whether `text` is a plain symbol name (identifier or `m[i][j]`).
pub fn is_symbol_name(text: &str) -> bool {
    match Lexer::new(text).tokenize() {
        Ok(tokens) => matches!(tokens.as_slice(), [(_, Token::Ident(_))]),
        Err(_) => false,
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

fn max_exponent(e: &Expr) -> u32 {
    e.numerator().max_exponent().max(e.denominator().max_exponent())
}

fn coefficient_bits(e: &Expr) -> u64 {
    [e.numerator(), e.denominator()]
        .into_iter()
        .map(Poly::coefficient_bits)
        .max()
        .unwrap_or(0)
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        let position = self
            .tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or(self.input.len());
        ParseError {
            input: self.input.to_string(),
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut acc = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.term()?;
                acc = self.bounded(acc + rhs)?;
            } else if self.eat(&Token::Minus) {
                let rhs = self.term()?;
                acc = self.bounded(acc - rhs)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut acc = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.unary()?;
                acc = self.bounded(acc * rhs)?;
            } else if self.eat(&Token::Slash) {
                let at = self.pos;
                let rhs = self.unary()?;
                let quotient = acc.checked_div(&rhs).ok_or_else(|| {
                    self.pos = at;
                    self.error("division by zero")
                })?;
                acc = self.bounded(quotient)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom()?;
        if !self.eat(&Token::Caret) {
            return Ok(base);
        }
        let at = self.pos;
        let exponent = self.unary()?;
        let n = exponent
            .as_rational()
            .filter(|r| r.is_integer())
            .and_then(|r| r.to_integer().to_i32());
        let Some(n) = n else {
            self.pos = at;
            return Err(self.error(format!("exponent `{exponent}` is not an integer")));
        };
        let e = u64::from(n.unsigned_abs());
        let degree = u64::from(max_exponent(&base)) * e;
        let bits = coefficient_bits(&base) * e;
        if degree > u64::from(MAX_DEGREE) || bits > MAX_COEFFICIENT_BITS {
            self.pos = at;
            return Err(self.error(format!("exponent {n} makes the result too large")));
        }
        base.powi(n).ok_or_else(|| {
            self.pos = at;
            self.error("zero raised to a negative power")
        })
    }

    /// Reject results whose exponents or coefficients outgrow the limits.
    fn bounded(&self, e: Expr) -> Result<Expr, ParseError> {
        if max_exponent(&e) > MAX_DEGREE || coefficient_bits(&e) > MAX_COEFFICIENT_BITS {
            return Err(self.error("intermediate result too large"));
        }
        Ok(e)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of formula"));
        };
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::rational(n))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::symbol(Symbol::new(name)))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("expected `)`"));
                }
                Ok(inner)
            }
            _ => Err(self.error("expected a number, a symbol or `(`")),
        }
    }
}

/// Parse a textual formula into an expression.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    if parser.peek().is_none() {
        return Err(parser.error("empty formula"));
    }
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}
