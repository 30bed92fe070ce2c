//! PDF object types
//!
//! `Value` is the closed sum type over every PDF primitive and container.
//! Indirect objects are represented by `Value::Reference(ObjectId)`; the
//! object behind the reference lives in the owning document's registry.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use crate::error::{PdfError, PdfResult};
use super::{Array, Dictionary, Name, Stream};

/// Identity of an indirect object: `(object number, generation number)`.
///
/// Equality and ordering only look at the two numbers, lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjectId {
    /// Create a new object id
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        Self::new(number, generation)
    }
}

/// Kind tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Boolean,
    Number,
    Name,
    String,
    Literal,
    Array,
    Dictionary,
    Stream,
    IndirectReference,
}

impl Kind {
    /// Lower-case name used in diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::Name => "name",
            Kind::String => "string",
            Kind::Literal => "literal",
            Kind::Array => "array",
            Kind::Dictionary => "dictionary",
            Kind::Stream => "stream",
            Kind::IndirectReference => "indirect reference",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric value, integer or real
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PdfNumber {
    Integer(i64),
    Real(f64),
}

impl PdfNumber {
    /// Value as integer, truncating reals
    pub fn as_i64(self) -> i64 {
        match self {
            PdfNumber::Integer(i) => i,
            PdfNumber::Real(r) => r as i64,
        }
    }

    /// Value as float
    pub fn as_f64(self) -> f64 {
        match self {
            PdfNumber::Integer(i) => i as f64,
            PdfNumber::Real(r) => r,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, PdfNumber::Integer(_))
    }
}

/// PDF string object. The raw bytes are the value; `hex` only controls
/// how the string is written (`<...>` instead of `(...)`).
#[derive(Debug, Clone, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    hex: bool,
}

impl PdfString {
    /// Create a literal string from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into(), hex: false }
    }

    /// Create a string written in hexadecimal form
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into(), hex: true }
    }

    /// Encode text: ASCII stays single-byte, anything else becomes UTF-16BE
    /// with a byte order mark.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            Self::new(text.as_bytes())
        } else {
            Self::from_unicode(text)
        }
    }

    /// Encode text as UTF-16BE with a byte order mark
    pub fn from_unicode(text: &str) -> Self {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_hex(&self) -> bool {
        self.hex
    }

    pub fn set_hex(&mut self, hex: bool) {
        self.hex = hex;
    }

    /// Decode the string as text. UTF-16BE and UTF-8 byte order marks are
    /// honoured, other strings are read as PDFDocEncoding.
    pub fn to_text(&self) -> String {
        match self.bytes.as_slice() {
            [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
            _ => String::from_utf16_lossy(&self.text_units()),
        }
    }

    /// UTF-16 code units of the decoded text
    pub fn text_units(&self) -> Vec<u16> {
        match self.bytes.as_slice() {
            [0xFE, 0xFF, rest @ ..] => rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
            [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).encode_utf16().collect(),
            bytes => bytes.iter().map(|&b| pdf_doc_unit(b)).collect(),
        }
    }

    /// Order of the decoded text by UTF-16 code units, the order name tree
    /// keys are stored in. Equal texts with different encodings fall back
    /// to their raw bytes.
    pub fn compare_text(&self, other: &Self) -> Ordering {
        self.text_units()
            .cmp(&other.text_units())
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

/// PDFDocEncoding code points that differ from Latin-1, for 0x18..=0x1F
/// and 0x80..=0xA0
const PDF_DOC_LOW: [u16; 8] = [0x02D8, 0x02C7, 0x02C6, 0x02D9, 0x02DD, 0x02DB, 0x02DA, 0x02DC];
const PDF_DOC_HIGH: [u16; 33] = [
    0x2022, 0x2020, 0x2021, 0x2026, 0x2014, 0x2013, 0x0192, 0x2044, 0x2039, 0x203A, 0x2212, 0x2030, 0x201E, 0x201C,
    0x201D, 0x2018, 0x2019, 0x201A, 0x2122, 0xFB01, 0xFB02, 0x0141, 0x0152, 0x0160, 0x0178, 0x017D, 0x0131, 0x0142,
    0x0153, 0x0161, 0x017E, 0x009F, 0x20AC,
];

fn pdf_doc_unit(byte: u8) -> u16 {
    match byte {
        0x18..=0x1F => PDF_DOC_LOW[(byte - 0x18) as usize],
        0x80..=0xA0 => PDF_DOC_HIGH[(byte - 0x80) as usize],
        other => other as u16,
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl Hash for PdfString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

/// Unsigned byte-wise order on the raw bytes. Name trees sort their keys
/// with [`PdfString::compare_text`] instead.
impl Ord for PdfString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl PartialOrd for PdfString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for PdfString {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

/// A PDF value: primitive, container, or indirect reference
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Null object
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Numeric value
    Number(PdfNumber),
    /// Name object
    Name(Name),
    /// String value (literal or hexadecimal)
    String(PdfString),
    /// Pre-rendered content written verbatim
    Literal(Vec<u8>),
    /// Array object
    Array(Array),
    /// Dictionary object
    Dictionary(Dictionary),
    /// Stream object
    Stream(Box<Stream>),
    /// Indirect reference
    Reference(ObjectId),
}

/// Shared null used by the direct views when a reference cannot be resolved
pub(crate) static NULL: Value = Value::Null;

impl Value {
    /// Kind tag of this value
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Boolean(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::Name(_) => Kind::Name,
            Value::String(_) => Kind::String,
            Value::Literal(_) => Kind::Literal,
            Value::Array(_) => Kind::Array,
            Value::Dictionary(_) => Kind::Dictionary,
            Value::Stream(_) => Kind::Stream,
            Value::Reference(_) => Kind::IndirectReference,
        }
    }

    /// Diagnostic type name
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, Value::Dictionary(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Value::Stream(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<PdfNumber> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().map(PdfNumber::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(PdfNumber::as_f64)
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or of a stream
    pub fn dictionary_view(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            Value::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    /// Mutable dictionary of a dictionary or of a stream
    pub fn dictionary_view_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            Value::Stream(s) => Some(s.dict_mut()),
            _ => None,
        }
    }

    /// Dictionary view or an invalid type error
    pub fn expect_dict(&self) -> PdfResult<&Dictionary> {
        self.dictionary_view()
            .ok_or_else(|| PdfError::invalid_type("dictionary", self.type_name()))
    }

    /// Mutable dictionary view or an invalid type error
    pub fn expect_dict_mut(&mut self) -> PdfResult<&mut Dictionary> {
        let found = self.type_name();
        self.dictionary_view_mut()
            .ok_or_else(|| PdfError::invalid_type("dictionary", found))
    }

    /// Array or an invalid type error
    pub fn expect_array(&self) -> PdfResult<&Array> {
        self.as_array()
            .ok_or_else(|| PdfError::invalid_type("array", self.type_name()))
    }

    /// Whether this is a dictionary or stream whose `/Type` is `type_name`
    pub fn has_type(&self, type_name: &str) -> bool {
        self.dictionary_view()
            .and_then(|d| d.get_name(super::names::TYPE))
            .map_or(false, |n| n == type_name)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(PdfNumber::Integer(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(PdfNumber::Integer(n as i64))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(PdfNumber::Integer(n as i64))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(PdfNumber::Integer(n as i64))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(PdfNumber::Real(n))
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(PdfNumber::Real(n as f64))
    }
}

impl From<PdfNumber> for Value {
    fn from(n: PdfNumber) -> Self {
        Value::Number(n)
    }
}

impl From<Name> for Value {
    fn from(n: Name) -> Self {
        Value::Name(n)
    }
}

/// String slices become names, matching how dictionaries are usually filled
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Name(Name::new(s))
    }
}

impl From<PdfString> for Value {
    fn from(s: PdfString) -> Self {
        Value::String(s)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from(items))
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Self {
        Value::Dictionary(d)
    }
}

impl From<Stream> for Value {
    fn from(s: Stream) -> Self {
        Value::Stream(Box::new(s))
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Reference(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        match super::serialize::Serializer::plain().write_value(self, &mut out) {
            Ok(()) => f.write_str(&String::from_utf8_lossy(&out)),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}
