//! Reader for the Python literal syntax that OmniParser prints per element.
//!
//! Lines look like `icon 3: {'type': 'icon', 'bbox': [0.1, 0.2, 0.3, 0.4],
//! 'interactivity': True, 'content': 'Chrome'}`: single-quoted strings,
//! `True`/`False`/`None`, lists and tuples. Values are read into
//! `serde_json::Value` so the rest of the crate can work with one value model.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest container nesting accepted before reading stops.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse a complete literal expression. Trailing input is an error.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut reader = Reader {
        src: input,
        pos: 0,
        depth: 0,
    };
    reader.skip_ws();
    let value = reader.value()?;
    reader.skip_ws();
    if reader.pos != reader.src.len() {
        return Err(reader.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Reader<'_> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            Some(open @ ('{' | '[' | '(')) => {
                if self.depth >= MAX_DEPTH {
                    return Err(self.error("nesting too deep"));
                }
                self.depth += 1;
                let value = match open {
                    '{' => self.dict(),
                    '[' => {
                        self.bump();
                        self.items(']').map(Value::Array)
                    }
                    _ => self.tuple(),
                };
                self.depth -= 1;
                value
            }
            Some('\'') | Some('"') => self.strings(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.name(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.bump();
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Value::Object(map));
        }
        loop {
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.error("expected ':' after dict key"));
            }
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => {
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.bump();
                        break;
                    }
                }
                Some('}') => break,
                _ => return Err(self.error("expected ',' or '}' in dict")),
            }
        }
        Ok(Value::Object(map))
    }

    /// Comma separated values up to `close`; the opening bracket is consumed.
    fn items(&mut self, close: char) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.bump();
            return Ok(items);
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {
                    self.skip_ws();
                    if self.peek() == Some(close) {
                        self.bump();
                        break;
                    }
                }
                Some(c) if c == close => break,
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
        Ok(items)
    }

    fn tuple(&mut self) -> Result<Value, LiteralError> {
        self.bump();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        match self.bump() {
            // `(x)` is just a parenthesised value
            Some(')') => Ok(first),
            Some(',') => {
                let mut rest = self.items(')')?;
                rest.insert(0, first);
                Ok(Value::Array(rest))
            }
            _ => Err(self.error("expected ',' or ')' in tuple")),
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self) -> Result<Value, LiteralError> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            if matches!(self.peek(), Some('\'') | Some('"')) {
                out.push_str(&self.string()?);
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(Value::String(out))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        match self.bump() {
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\n') => {}
            Some('x') => out.push(self.hex_char(2)?),
            Some('u') => out.push(self.hex_char(4)?),
            Some('U') => out.push(self.hex_char(8)?),
            // Unknown escapes keep their backslash
            Some(c) => {
                out.push('\\');
                out.push(c);
            }
            None => return Err(self.error("unterminated string")),
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated escape sequence"))?;
        let code =
            u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid escape sequence"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos = end;
        Ok(c)
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-') | Some('+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos].chars().filter(|&c| c != '_').collect();
        let invalid = || LiteralError {
            offset: start,
            message: format!("invalid number '{text}'"),
        };

        if !is_float {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Value::Number(int.into()));
            }
        }
        let float: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(float).map(Value::Number).ok_or_else(invalid)
    }

    fn name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            other => Err(LiteralError {
                offset: start,
                message: format!("unsupported name '{other}'"),
            }),
        }
    }
}
