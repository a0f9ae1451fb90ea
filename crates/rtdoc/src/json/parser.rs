use std::collections::HashMap;

use super::JsonValue;
use crate::{RtdocError, RtdocResult};

/// Longest object key the parser accepts, in bytes
pub const OBJECT_KEY_LIMIT: usize = 256;

/// Deepest array/object nesting the parser accepts
pub const MAX_NESTING: usize = 512;

/// Number of bytes of offending input quoted in parse errors
const FRAGMENT_LEN: usize = 16;

/// Parse JSON text into a [`JsonValue`]
///
/// The whole input must be a single value, optionally surrounded by
/// whitespace. Any byte at or below `0x20` counts as whitespace.
pub fn parse(text: &str) -> RtdocResult<JsonValue> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace();
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();

    if parser.pos < parser.bytes.len() {
        return Err(parser.unexpected("trailing characters"));
    }

    Ok(value)
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(byte) if byte <= b' ') {
            self.pos += 1;
        }
    }

    /// Build an error quoting the input starting at the current position
    fn unexpected(&self, what: &str) -> RtdocError {
        if self.pos >= self.bytes.len() {
            return RtdocError::parse(format!("{what}: unexpected end of input"), self.pos);
        }

        let mut end = (self.pos + FRAGMENT_LEN).min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        let start = if self.text.is_char_boundary(self.pos) {
            self.pos
        } else {
            self.text[..self.pos]
                .char_indices()
                .next_back()
                .map_or(0, |(index, _)| index)
        };

        RtdocError::parse(format!("{what} near '{}'", &self.text[start..end]), self.pos)
    }

    fn expect(&mut self, byte: u8, what: &str) -> RtdocResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn parse_value(&mut self, depth: usize) -> RtdocResult<JsonValue> {
        match self.peek() {
            Some(b'n') => self.parse_literal("null", JsonValue::Null),
            Some(b't') => self.parse_literal("true", JsonValue::Bool(true)),
            Some(b'f') => self.parse_literal("false", JsonValue::Bool(false)),
            Some(b'"') => self.parse_string().map(JsonValue::String),
            Some(b'[') => self.parse_array(depth + 1),
            Some(b'{') => self.parse_object(depth + 1),
            Some(byte) if byte == b'-' || byte.is_ascii_digit() => self.parse_number(),
            _ => Err(self.unexpected("expected a value")),
        }
    }

    fn parse_literal(&mut self, literal: &str, value: JsonValue) -> RtdocResult<JsonValue> {
        if self.bytes[self.pos..].starts_with(literal.as_bytes()) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(self.unexpected("invalid literal"))
        }
    }

    /// Validates the number grammar, then reads the consumed text as the
    /// nearest double. Integral values in `i32` range collapse to `Int`.
    fn parse_number(&mut self) -> RtdocResult<JsonValue> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        if !self.skip_digits() {
            self.pos = start;
            return Err(self.unexpected("invalid number"));
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            if !self.skip_digits() {
                return Err(self.unexpected("expected digits after decimal point"));
            }
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'-' | b'+')) {
                self.pos += 1;
            }
            if !self.skip_digits() {
                return Err(self.unexpected("expected exponent digits"));
            }
        }

        let value: f64 = self.text[start..self.pos]
            .parse()
            .map_err(|_| RtdocError::parse("invalid number", start))?;
        if !value.is_finite() {
            return Err(RtdocError::parse("number out of range", start));
        }
        Ok(number_value(value))
    }

    /// Consume a run of ASCII digits, reporting whether any were present
    fn skip_digits(&mut self) -> bool {
        let first = self.pos;
        while self.peek().is_some_and(|byte| byte.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos > first
    }

    fn parse_string(&mut self) -> RtdocResult<String> {
        self.expect(b'"', "expected '\"'")?;
        let start = self.pos;
        let mut buf = Vec::new();

        loop {
            match self.peek() {
                None => {
                    self.pos = start;
                    return Err(self.unexpected("unterminated string"));
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = match self.peek() {
                        Some(b'b') => 0x08,
                        Some(b'f') => 0x0c,
                        Some(b'n') => b'\n',
                        Some(b'r') => b'\r',
                        Some(b't') => b'\t',
                        Some(other) => other,
                        None => {
                            self.pos = start;
                            return Err(self.unexpected("unterminated string"));
                        }
                    };
                    buf.push(escaped);
                    self.pos += 1;
                }
                Some(byte) => {
                    buf.push(byte);
                    self.pos += 1;
                }
            }
        }

        String::from_utf8(buf).map_err(|_| RtdocError::parse("invalid UTF-8 in string", start))
    }

    fn parse_array(&mut self, depth: usize) -> RtdocResult<JsonValue> {
        if depth > MAX_NESTING {
            return Err(self.unexpected("nesting too deep"));
        }
        self.expect(b'[', "expected '['")?;
        let mut values = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(values));
        }

        loop {
            self.skip_whitespace();
            values.push(self.parse_value(depth)?);
            self.skip_whitespace();

            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(values));
                }
                _ => return Err(self.unexpected("expected ',' or ']'")),
            }
        }
    }

    fn parse_object(&mut self, depth: usize) -> RtdocResult<JsonValue> {
        if depth > MAX_NESTING {
            return Err(self.unexpected("nesting too deep"));
        }
        self.expect(b'{', "expected '{'")?;
        let mut entries = HashMap::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(entries));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.unexpected("expected a quoted key"));
            }
            let key_start = self.pos;
            let key = self.parse_string()?;
            if key.len() > OBJECT_KEY_LIMIT {
                return Err(RtdocError::parse(
                    format!("object key longer than {OBJECT_KEY_LIMIT} bytes"),
                    key_start,
                ));
            }

            self.skip_whitespace();
            self.expect(b':', "expected ':'")?;
            self.skip_whitespace();
            let value = self.parse_value(depth)?;
            entries.insert(key, value);
            self.skip_whitespace();

            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Object(entries));
                }
                _ => return Err(self.unexpected("expected ',' or '}'")),
            }
        }
    }
}

fn number_value(value: f64) -> JsonValue {
    if value.is_finite()
        && value.fract() == 0.0
        && value >= f64::from(i32::MIN)
        && value <= f64::from(i32::MAX)
    {
        JsonValue::Int(value as i32)
    } else {
        JsonValue::Double(value)
    }
}
