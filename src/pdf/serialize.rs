//! Byte-level content generation for PDF values

use crate::crypto::Encryptor;
use crate::error::PdfResult;
use super::{Array, Dictionary, Name, ObjectId, PdfNumber, PdfString, Value};

/// Writes values in PDF syntax.
///
/// With an encryptor attached, string contents are encrypted with the key
/// of the indirect object being written.
#[derive(Clone, Copy)]
pub struct Serializer<'a> {
    encryption: Option<(&'a dyn Encryptor, ObjectId)>,
}

impl<'a> Serializer<'a> {
    /// Serializer without encryption
    pub fn plain() -> Self {
        Self { encryption: None }
    }

    /// Serializer encrypting strings owned by object `owner`
    pub fn encrypting(encryptor: &'a dyn Encryptor, owner: ObjectId) -> Self {
        Self { encryption: Some((encryptor, owner)) }
    }

    /// Write `value`. Streams are written as their dictionary only; the
    /// writer appends the payload.
    pub fn write_value(&self, value: &Value, out: &mut Vec<u8>) -> PdfResult<()> {
        match value {
            Value::Null => out.extend_from_slice(b"null"),
            Value::Boolean(true) => out.extend_from_slice(b"true"),
            Value::Boolean(false) => out.extend_from_slice(b"false"),
            Value::Number(number) => write_number(*number, out),
            Value::Name(name) => write_name(name, out),
            Value::String(string) => self.write_string(string, out)?,
            Value::Literal(bytes) => out.extend_from_slice(bytes),
            Value::Array(array) => self.write_array(array, out)?,
            Value::Dictionary(dict) => self.write_dictionary(dict, out)?,
            Value::Stream(stream) => self.write_dictionary(stream.dict(), out)?,
            Value::Reference(id) => write_reference(*id, out),
        }
        Ok(())
    }

    pub fn write_array(&self, array: &Array, out: &mut Vec<u8>) -> PdfResult<()> {
        out.push(b'[');
        for (i, item) in array.iter().enumerate() {
            if i > 0 && needs_separator(out, item) {
                out.push(b' ');
            }
            self.write_value(item, out)?;
        }
        out.push(b']');
        Ok(())
    }

    pub fn write_dictionary(&self, dict: &Dictionary, out: &mut Vec<u8>) -> PdfResult<()> {
        out.extend_from_slice(b"<<");
        for (key, value) in dict {
            write_name(key, out);
            if needs_separator(out, value) {
                out.push(b' ');
            }
            self.write_value(value, out)?;
        }
        out.extend_from_slice(b">>");
        Ok(())
    }

    fn write_string(&self, string: &PdfString, out: &mut Vec<u8>) -> PdfResult<()> {
        match self.encryption {
            Some((encryptor, owner)) if !encryptor.is_embedded_files_only() => {
                let encrypted = encryptor.encrypt_bytes(owner, string.as_bytes())?;
                write_hex_string(&encrypted, out);
            }
            _ if string.is_hex() => write_hex_string(string.as_bytes(), out),
            _ => write_literal_string(string.as_bytes(), out),
        }
        Ok(())
    }
}

/// A space is needed unless either side is self-delimiting
fn needs_separator(out: &[u8], next: &Value) -> bool {
    let ends_delimited = matches!(out.last(), Some(b']' | b'>' | b')' | b'[' | b'<'));
    let starts_delimited = matches!(
        next,
        Value::Name(_) | Value::Array(_) | Value::Dictionary(_) | Value::Stream(_) | Value::String(_)
    );
    !(ends_delimited || starts_delimited)
}

pub(crate) fn write_reference(id: ObjectId, out: &mut Vec<u8>) {
    out.extend_from_slice(format!("{} {} R", id.number, id.generation).as_bytes());
}

/// Integers as is; reals with at most six decimals, no exponent and no
/// trailing zeros
pub(crate) fn write_number(number: PdfNumber, out: &mut Vec<u8>) {
    match number {
        PdfNumber::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        PdfNumber::Real(r) => out.extend_from_slice(format_real(r).as_bytes()),
    }
}

fn format_real(value: f64) -> String {
    if !value.is_finite() || value.abs() < 0.000_001 {
        return "0".to_string();
    }
    let mut text = format!("{:.6}", value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

fn is_regular(byte: u8) -> bool {
    !matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
    ) && (0x21..=0x7E).contains(&byte)
}

pub(crate) fn write_name(name: &Name, out: &mut Vec<u8>) {
    out.push(b'/');
    for &byte in name.as_str().as_bytes() {
        if is_regular(byte) {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

fn write_literal_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

fn write_hex_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'<');
    out.extend_from_slice(hex::encode_upper(bytes).as_bytes());
    out.push(b'>');
}
