//! Variable substitution, `${...}` arithmetic and leaf conversion.
//!
//! Substitution syntax inside scalars:
//! - `$name` and `${name}`: replaced by the variable (or scalar anchor) `name`. Unknown names
//!   are dropped and logged at debug level.
//! - `${expr}`: anything that is not a plain name is evaluated with `+ - * /`, unary sign,
//!   parentheses, numeric literals (unit suffixes allowed) and names of numeric variables.
//!   Unknown names are a syntax error here.
//! - `\c`: the character `c`, literally. A trailing `\` is a syntax error.
//! - `$` followed by anything else stays as is.

use tracing::debug;

use crate::error::Error;
use crate::parse_scalars::{parse_float, parse_int, parse_uint, parse_yaml11_bool};
use crate::schema::{Node, NodeKind};
use crate::value::Value;

const MAX_EXPR_DEPTH: u32 = 64;

/// Resolves a name to its text. `Err` aborts the substitution (for example a non-scalar
/// anchor used as a variable).
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Result<Option<String>, Error> + 'a;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_plain_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// Expand variables in `text`.
///
/// Arguments:
/// - `text`: scalar text.
/// - `lookup`: variable resolution (variable table first, then scalar anchors).
///
/// Returns:
/// - The expanded text; errors carry no location, the caller attaches the scalar's.
pub(crate) fn substitute(text: &str, lookup: &Lookup<'_>) -> Result<String, Error> {
    if !text.contains(['$', '\\']) {
        return Ok(text.to_owned());
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => return Err(Error::syntax("trailing `\\` in scalar")),
            },
            '$' => match chars.peek().copied() {
                Some((_, '{')) => {
                    chars.next();
                    let start = i + 2;
                    let Some(len) = text[start..].find('}') else {
                        return Err(Error::syntax("unterminated `${` in scalar"));
                    };
                    let inner = text[start..start + len].trim();
                    // Skip the body and the closing brace.
                    while let Some((j, _)) = chars.next() {
                        if j == start + len {
                            break;
                        }
                    }
                    if is_plain_name(inner) {
                        push_variable(&mut out, inner, lookup)?;
                    } else {
                        out.push_str(&evaluate(inner, lookup)?.to_string());
                    }
                }
                Some((_, n)) if is_name_char(n) => {
                    let start = i + 1;
                    let mut end = start;
                    while let Some(&(j, n)) = chars.peek() {
                        if !is_name_char(n) {
                            break;
                        }
                        end = j + n.len_utf8();
                        chars.next();
                    }
                    push_variable(&mut out, &text[start..end], lookup)?;
                }
                _ => out.push('$'),
            },
            c => out.push(c),
        }
    }
    Ok(out)
}

fn push_variable(out: &mut String, name: &str, lookup: &Lookup<'_>) -> Result<(), Error> {
    match lookup(name)? {
        Some(value) => out.push_str(&value),
        None => debug!(variable = name, "variable not found, substituting nothing"),
    }
    Ok(())
}

/// Result of `${...}` arithmetic. Integer arithmetic stays integral.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Evaluate an arithmetic expression.
pub(crate) fn evaluate(expr: &str, lookup: &Lookup<'_>) -> Result<Number, Error> {
    let mut p = ExprParser {
        s: expr,
        b: expr.as_bytes(),
        i: 0,
        depth: 0,
        lookup,
    };
    p.skip_ws();
    let v = p.expr()?;
    p.skip_ws();
    if !p.eof() {
        return Err(p.err(format!("unexpected `{}` in expression", &expr[p.i..])));
    }
    Ok(v)
}

struct ExprParser<'a, 'l> {
    s: &'a str,
    b: &'a [u8],
    i: usize,
    depth: u32,
    lookup: &'l Lookup<'l>,
}

impl<'a> ExprParser<'a, '_> {
    fn eof(&self) -> bool {
        self.i >= self.b.len()
    }

    fn peek(&self) -> Option<u8> {
        self.b.get(self.i).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.i += 1;
        }
    }

    fn err(&self, msg: String) -> Error {
        Error::syntax(format!("{msg} in `${{{}}}`", self.s))
    }

    fn enter(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(self.err("expression nested too deeply".to_owned()));
        }
        self.depth += 1;
        Ok(())
    }

    /// expr := term (('+'|'-') term)*
    fn expr(&mut self) -> Result<Number, Error> {
        let mut v = self.term()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some(op @ (b'+' | b'-')) => op,
                _ => return Ok(v),
            };
            self.i += 1;
            let rhs = self.term()?;
            v = arith(op, v, rhs)?;
        }
    }

    /// term := unary (('*'|'/') unary)*
    fn term(&mut self) -> Result<Number, Error> {
        let mut v = self.unary()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some(op @ (b'*' | b'/')) => op,
                _ => return Ok(v),
            };
            self.i += 1;
            let rhs = self.unary()?;
            v = arith(op, v, rhs)?;
        }
    }

    /// unary := ('+'|'-') unary | primary
    fn unary(&mut self) -> Result<Number, Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'-') => {
                self.i += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                match v {
                    Number::Int(i) => i
                        .checked_neg()
                        .map(Number::Int)
                        .ok_or_else(|| Error::value("integer overflow in expression")),
                    Number::Float(f) => Ok(Number::Float(-f)),
                }
            }
            Some(b'+') => {
                self.i += 1;
                self.enter()?;
                let v = self.unary();
                self.depth -= 1;
                v
            }
            _ => self.primary(),
        }
    }

    /// primary := '(' expr ')' | number | name
    fn primary(&mut self) -> Result<Number, Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.i += 1;
                self.enter()?;
                let v = self.expr()?;
                self.depth -= 1;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.err("missing `)`".to_owned()));
                }
                self.i += 1;
                Ok(v)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let token = self.number_token();
                number_from_text(token).ok_or_else(|| self.err(format!("bad number `{token}`")))
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.i;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                    self.i += 1;
                }
                let name = &self.s[start..self.i];
                let text = (self.lookup)(name)?
                    .ok_or_else(|| self.err(format!("unknown variable `{name}`")))?;
                number_from_text(&text)
                    .ok_or_else(|| Error::value(format!("variable `{name}` = `{text}` is not numeric")))
            }
            Some(_) => Err(self.err(format!("unexpected `{}`", &self.s[self.i..]))),
            None => Err(self.err("expression ends early".to_owned())),
        }
    }

    /// Digits, dot, unit letters and a signed exponent.
    fn number_token(&mut self) -> &'a str {
        let s: &'a str = self.s;
        let start = self.i;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                self.i += 1;
            } else if (c == b'+' || c == b'-')
                && matches!(self.b.get(self.i - 1), Some(b'e' | b'E'))
                && matches!(self.b.get(self.i + 1), Some(d) if d.is_ascii_digit())
                && self.b[start].is_ascii_digit()
            {
                self.i += 1;
            } else {
                break;
            }
        }
        &s[start..self.i]
    }
}

fn number_from_text(text: &str) -> Option<Number> {
    if let Ok(i) = parse_int(text, false) {
        return Some(Number::Int(i));
    }
    parse_float(text).ok().map(Number::Float)
}

fn arith(op: u8, a: Number, b: Number) -> Result<Number, Error> {
    let overflow = || Error::value("integer overflow in expression");
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let r = match op {
                b'+' => x.checked_add(y),
                b'-' => x.checked_sub(y),
                b'*' => x.checked_mul(y),
                _ => {
                    if y == 0 {
                        return Err(Error::value("division by zero in expression"));
                    }
                    x.checked_div(y)
                }
            };
            r.map(Number::Int).ok_or_else(overflow)
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Ok(Number::Float(match op {
                b'+' => x + y,
                b'-' => x - y,
                b'*' => x * y,
                _ => x / y,
            }))
        }
    }
}

/// Convert scalar text for a scalar schema node, applying units and bounds.
///
/// Called by:
/// - The matcher after substitution.
/// - Command-line, environment and scalar-hook writes.
pub(crate) fn convert_leaf(node: &Node, raw: &str, legacy_octal: bool) -> Result<Value, String> {
    match &node.kind {
        NodeKind::Int(bounds) => {
            let v = parse_int(raw, legacy_octal)?;
            bounds.check(v)?;
            Ok(Value::Int(v))
        }
        NodeKind::UInt(bounds) => {
            let v = parse_uint(raw, legacy_octal)?;
            bounds.check(v)?;
            Ok(Value::UInt(v))
        }
        NodeKind::Float(bounds) => {
            let v = parse_float(raw)?;
            bounds.check(v)?;
            Ok(Value::Float(v))
        }
        NodeKind::Bool => parse_yaml11_bool(raw).map(Value::Bool),
        NodeKind::String(_) => Ok(Value::Str(raw.to_owned())),
        other => Err(format!("a {} field cannot be set from a single value", other.name())),
    }
}
