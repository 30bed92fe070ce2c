//! Object body parser
//!
//! Works on a byte slice with a cursor. The reader uses it for indirect
//! object headers, object bodies, trailers and object stream contents.

use log::trace;
use crate::error::{PdfError, PdfResult};
use super::{Array, Dictionary, Name, ObjectId, PdfNumber, PdfString, Value};

/// Nesting limit for arrays and dictionaries
const MAX_DEPTH: usize = 256;

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Cursor over PDF syntax
pub(crate) struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos: pos.min(data.len()) }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.data
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn error(&self, msg: &str) -> PdfError {
        PdfError::malformed(format!("{} at offset {}", msg, self.pos))
    }

    /// Skip whitespace and comments
    pub(crate) fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(b) = self.peek() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Read a run of regular characters
    pub(crate) fn read_token(&mut self) -> &'a [u8] {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) || is_delimiter(byte) {
                break;
            }
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    /// Consume `keyword` if it comes next
    pub(crate) fn try_keyword(&mut self, keyword: &[u8]) -> bool {
        let saved = self.pos;
        if self.read_token() == keyword {
            true
        } else {
            self.pos = saved;
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &[u8]) -> PdfResult<()> {
        if self.try_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{}'", String::from_utf8_lossy(keyword))))
        }
    }

    pub(crate) fn read_unsigned(&mut self) -> PdfResult<u64> {
        let token = self.read_token();
        std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| self.error("Expected unsigned integer"))
    }

    /// Parse an `N G obj` header
    pub(crate) fn read_object_header(&mut self) -> PdfResult<ObjectId> {
        let number = u32::try_from(self.read_unsigned()?).map_err(|_| self.error("Object number out of range"))?;
        let generation = u16::try_from(self.read_unsigned()?).map_err(|_| self.error("Generation out of range"))?;
        self.expect_keyword(b"obj")?;
        Ok(ObjectId::new(number, generation))
    }

    /// Parse one value
    pub(crate) fn read_value(&mut self) -> PdfResult<Value> {
        self.read_value_at_depth(0)
    }

    fn read_value_at_depth(&mut self, depth: usize) -> PdfResult<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("Objects nested too deeply"));
        }
        self.skip_whitespace();
        let byte = self.peek().ok_or_else(|| self.error("Unexpected end of data"))?;

        match byte {
            b'/' => {
                self.pos += 1;
                Ok(Value::Name(self.read_name()))
            }
            b'(' => {
                self.pos += 1;
                self.read_literal_string().map(Value::String)
            }
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                self.read_dictionary(depth).map(Value::Dictionary)
            }
            b'<' => {
                self.pos += 1;
                self.read_hex_string().map(Value::String)
            }
            b'[' => {
                self.pos += 1;
                self.read_array(depth).map(Value::Array)
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.read_number_or_reference(),
            _ => {
                let token = self.read_token();
                match token {
                    b"true" => Ok(Value::Boolean(true)),
                    b"false" => Ok(Value::Boolean(false)),
                    b"null" => Ok(Value::Null),
                    _ => Err(self.error(&format!("Unexpected token '{}'", String::from_utf8_lossy(token)))),
                }
            }
        }
    }

    fn read_name(&mut self) -> Name {
        let mut bytes = Vec::new();
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) || is_delimiter(byte) {
                break;
            }
            self.pos += 1;
            if byte == b'#' {
                let escaped = self
                    .data
                    .get(self.pos..self.pos + 2)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(decoded) = escaped {
                    bytes.push(decoded);
                    self.pos += 2;
                    continue;
                }
            }
            bytes.push(byte);
        }
        Name::from_bytes(&bytes)
    }

    fn read_literal_string(&mut self) -> PdfResult<PdfString> {
        let mut bytes = Vec::new();
        let mut depth = 1;

        loop {
            let byte = self.peek().ok_or_else(|| self.error("Unterminated string"))?;
            self.pos += 1;
            match byte {
                b'(' => {
                    depth += 1;
                    bytes.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(byte);
                }
                b'\\' => {
                    let escaped = self.peek().ok_or_else(|| self.error("Unterminated string"))?;
                    self.pos += 1;
                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0C),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (escaped - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u16;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push(value as u8);
                        }
                        other => bytes.push(other),
                    }
                }
                _ => bytes.push(byte),
            }
        }

        Ok(PdfString::new(bytes))
    }

    fn read_hex_string(&mut self) -> PdfResult<PdfString> {
        let start = self.pos;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == b'>')
            .map(|i| start + i)
            .ok_or_else(|| self.error("Unterminated hex string"))?;
        self.pos = end + 1;

        let digits: Vec<u8> = self.data[start..end]
            .iter()
            .copied()
            .filter(|b| !is_whitespace(*b))
            .collect();
        let mut padded = digits;
        if padded.len() % 2 == 1 {
            padded.push(b'0');
        }
        let bytes = hex::decode(&padded).map_err(|e| self.error(&format!("Invalid hex string: {}", e)))?;
        Ok(PdfString::hex(bytes))
    }

    fn read_array(&mut self, depth: usize) -> PdfResult<Array> {
        let mut array = Array::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(array);
                }
                Some(_) => array.push(self.read_value_at_depth(depth + 1)?),
                None => return Err(self.error("Unterminated array")),
            }
        }
    }

    fn read_dictionary(&mut self, depth: usize) -> PdfResult<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') if self.data.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    return Ok(dict);
                }
                Some(b'/') => {
                    self.pos += 1;
                    let key = self.read_name();
                    let value = self.read_value_at_depth(depth + 1)?;
                    // A null value is the same as an absent entry
                    if !value.is_null() {
                        dict.set(key, value);
                    }
                }
                Some(_) => return Err(self.error("Expected name as dictionary key")),
                None => return Err(self.error("Unterminated dictionary")),
            }
        }
    }

    fn read_number_or_reference(&mut self) -> PdfResult<Value> {
        let token = self.read_token();
        let text = std::str::from_utf8(token).map_err(|_| self.error("Invalid number"))?;

        if let Ok(number) = text.parse::<i64>() {
            // "N G R" lookahead
            if number >= 0 && !text.starts_with('+') {
                let saved = self.pos;
                let generation = self.read_token();
                if !generation.is_empty() && generation.iter().all(u8::is_ascii_digit) && self.try_keyword(b"R") {
                    if let Ok(generation) = std::str::from_utf8(generation).unwrap_or("").parse::<u16>() {
                        return Ok(Value::Reference(ObjectId::new(number as u32, generation)));
                    }
                }
                self.pos = saved;
            }
            return Ok(Value::Number(PdfNumber::Integer(number)));
        }

        parse_real(text)
            .map(|r| Value::Number(PdfNumber::Real(r)))
            .ok_or_else(|| self.error(&format!("Invalid number '{}'", text)))
    }

    /// After a stream dictionary: position of the first payload byte, if the
    /// `stream` keyword follows
    pub(crate) fn stream_start(&mut self) -> Option<usize> {
        if !self.try_keyword(b"stream") {
            return None;
        }
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
        trace!("Stream payload starts at {}", self.pos);
        Some(self.pos)
    }
}

/// Reals may be written as "-.5" or "4." and malformed files contain
/// things like "0.-5"; anything parseable after dropping stray signs wins
fn parse_real(text: &str) -> Option<f64> {
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }
    let negative = text.starts_with('-');
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let mut parts = cleaned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().map(|f| f.replace('.', "")).unwrap_or_default();
    let value: f64 = format!("{}.{}", if int_part.is_empty() { "0" } else { int_part }, frac_part)
        .trim_end_matches('.')
        .parse()
        .ok()?;
    Some(if negative { -value } else { value })
}

/// Find `needle` at or after `from`
pub(crate) fn find(data: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() || needle.is_empty() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

/// Find the last occurrence of `needle`
pub(crate) fn rfind(data: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > data.len() {
        return None;
    }
    (0..=data.len() - needle.len()).rev().find(|&i| &data[i..i + needle.len()] == needle)
}
