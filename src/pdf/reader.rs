//! Reading objects from an existing PDF file
//!
//! [`ObjectReader`] is the seam between a document and its backing file.
//! [`PdfReader`] implements it over an in-memory byte buffer: it locates
//! the cross-reference sections through `startxref` and the `/Prev` chain,
//! then parses object bodies on demand.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use log::{debug, trace, warn};
use crate::config::{ReaderProperties, MAX_OBJECT_NUMBER};
use crate::crypto::Encryptor;
use crate::error::{PdfError, PdfResult};
use crate::filter::{decode_bytes, DecodeLimits};
use super::parser::{find, is_whitespace, rfind, Lexer};
use super::stream::Payload;
use super::{names, Dictionary, ObjectId, Stream, Value, XrefEntry, XrefTable};

const PDF_MAGIC: &[u8] = b"%PDF-";
const STARTXREF: &[u8] = b"startxref";
const ENDSTREAM: &[u8] = b"endstream";

/// Source of indirect objects for a document opened from a file
pub trait ObjectReader: Send {
    /// Trailer dictionary of the newest cross-reference section
    fn trailer(&self) -> &Dictionary;

    /// Every cross-reference entry, newest section winning
    fn entries(&self) -> Vec<(ObjectId, XrefEntry)>;

    /// Parse the object `id`; `None` if it is not in the file
    fn read_object(&self, id: ObjectId) -> PdfResult<Option<Value>>;

    /// Payload of a stream parsed by this reader, decrypted, and decoded
    /// through its filters when `decoded` is set
    fn read_stream_bytes(&self, stream: &Stream, decoded: bool) -> PdfResult<Vec<u8>>;

    /// Limits applied when decoding stream data
    fn decode_limits(&self) -> DecodeLimits;

    /// Object streams and cross-reference streams of the file
    fn structural_objects(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Highest object number the file can plausibly hold. Entries above it
    /// are ignored when a registry is populated.
    fn max_object_number(&self) -> u32 {
        MAX_OBJECT_NUMBER
    }

    /// Header version, e.g. "1.7"
    fn version(&self) -> &str {
        "1.7"
    }
}

/// Reader over a complete PDF file held in memory
pub struct PdfReader {
    data: Arc<[u8]>,
    version: String,
    xref: XrefTable,
    trailer: Dictionary,
    xref_streams: Vec<ObjectId>,
    encrypt: Option<ObjectId>,
    props: ReaderProperties,
    object_streams: RefCell<HashMap<u32, Arc<Vec<(u32, Value)>>>>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("version", &self.version)
            .field("objects", &self.xref.len())
            .field("encrypted", &self.encrypt.is_some())
            .finish()
    }
}

impl PdfReader {
    /// Parse the file structure with default properties
    pub fn new(data: impl Into<Vec<u8>>) -> PdfResult<Self> {
        Self::with_properties(data, ReaderProperties::default())
    }

    pub fn with_properties(data: impl Into<Vec<u8>>, props: ReaderProperties) -> PdfResult<Self> {
        let bytes: Vec<u8> = data.into();
        let data: Arc<[u8]> = Arc::from(bytes);
        debug!("Opening PDF of {} bytes", data.len());

        let header_end = data.len().min(1024);
        let header = find(&data[..header_end], PDF_MAGIC, 0)
            .ok_or_else(|| PdfError::malformed("Invalid PDF header"))?;
        let version = Lexer::at(&data, header + PDF_MAGIC.len()).read_token();
        let version = String::from_utf8_lossy(version).into_owned();

        let mut reader = Self {
            data,
            version,
            xref: XrefTable::new(),
            trailer: Dictionary::new(),
            xref_streams: Vec::new(),
            encrypt: None,
            props,
            object_streams: RefCell::new(HashMap::new()),
        };

        if let Err(err) = reader.read_xref_chain() {
            if reader.props.strict {
                return Err(err);
            }
            warn!("Cross-reference data is broken ({}), rebuilding by scanning the file", err);
            reader.rebuild_xref()?;
        }

        reader.encrypt = reader.trailer.get_reference("Encrypt");
        if reader.encrypt.is_some() && reader.props.encryptor.is_none() {
            warn!("Document is encrypted but no encryptor was supplied, strings stay encrypted");
        }
        debug!("Read {} cross-reference entries, PDF version {}", reader.xref.len(), reader.version);
        Ok(reader)
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }

    fn limits(&self) -> DecodeLimits {
        DecodeLimits::from(&self.props)
    }

    fn read_xref_chain(&mut self) -> PdfResult<()> {
        let start = rfind(&self.data, STARTXREF)
            .ok_or_else(|| PdfError::Xref("No startxref found".to_string()))?;
        let mut offset = Lexer::at(&self.data, start + STARTXREF.len()).read_unsigned()? as usize;

        let mut visited = HashSet::new();
        let mut newest_trailer = None;
        loop {
            if !visited.insert(offset) {
                warn!("Cross-reference chain loops back to offset {}", offset);
                break;
            }
            let (table, trailer) = self.read_xref_section(offset)?;
            self.xref.merge_older(table);

            let prev = trailer.get_i64(names::PREV);
            if newest_trailer.is_none() {
                newest_trailer = Some(trailer);
            }
            match prev {
                Some(prev) if prev >= 0 => offset = prev as usize,
                _ => break,
            }
        }

        self.trailer = newest_trailer.unwrap_or_default();
        if self.trailer.get_reference(names::ROOT).is_none() {
            return Err(PdfError::Xref("Trailer has no /Root".to_string()));
        }
        Ok(())
    }

    /// One section at `offset`: a classic table with trailer, or an xref
    /// stream
    fn read_xref_section(&mut self, offset: usize) -> PdfResult<(XrefTable, Dictionary)> {
        if offset >= self.data.len() {
            return Err(PdfError::Xref(format!("Xref offset {} is past the end of file", offset)));
        }
        let data = Arc::clone(&self.data);
        let mut lexer = Lexer::at(&data, offset);

        if lexer.try_keyword(b"xref") {
            trace!("Classic xref table at {}", offset);
            let mut table = XrefTable::parse_table(&mut lexer)?;
            lexer.expect_keyword(b"trailer")?;
            let trailer = lexer.read_value()?
                .as_dict()
                .cloned()
                .ok_or_else(|| PdfError::Xref("Trailer is not a dictionary".to_string()))?;

            // Hybrid files list their compressed objects in a side stream
            if let Some(stream_offset) = trailer.get_i64("XRefStm") {
                let (hidden, _) = self.read_xref_stream(stream_offset as usize)?;
                for (number, entry) in hidden.iter() {
                    if matches!(entry, XrefEntry::Compressed { .. }) {
                        table.insert(number, entry);
                    }
                }
            }
            return Ok((table, trailer));
        }

        self.read_xref_stream(offset)
    }

    fn read_xref_stream(&mut self, offset: usize) -> PdfResult<(XrefTable, Dictionary)> {
        trace!("Xref stream at {}", offset);
        let (id, value) = self.parse_indirect_at(offset, None)?;
        let stream = match value {
            Value::Stream(stream) if stream.dict().type_name().map_or(false, |t| t == names::XREF) => stream,
            other => {
                return Err(PdfError::Xref(format!("Expected xref stream, found {}", other.type_name())))
            }
        };
        self.xref_streams.push(id);

        let data = self.read_stream_bytes(&stream, true)?;
        let table = XrefTable::parse_stream(stream.dict(), &data)?;

        let mut trailer = (*stream).into_dict();
        for key in [names::W, names::INDEX, names::FILTER, names::DECODE_PARMS, names::LENGTH, names::TYPE] {
            trailer.remove(key);
        }
        Ok((table, trailer))
    }

    /// Last resort for files with broken cross-reference data: find every
    /// `N G obj` and the last trailer
    fn rebuild_xref(&mut self) -> PdfResult<()> {
        let data = Arc::clone(&self.data);
        let mut table = XrefTable::new();
        let mut pos = 0;
        while let Some(found) = find(&data, b" obj", pos) {
            pos = found + 4;
            let line_start = data[..found]
                .iter()
                .rposition(|&b| b == b'\n' || b == b'\r')
                .map_or(0, |i| i + 1);
            let mut lexer = Lexer::at(&data, line_start);
            if let Ok(id) = lexer.read_object_header() {
                // later definitions override earlier ones
                table.insert(id.number, XrefEntry::InUse { offset: line_start as u64, generation: id.generation });
            }
        }
        self.xref = table;

        let trailer = rfind(&data, b"trailer")
            .and_then(|at| Lexer::at(&data, at + 7).read_value().ok())
            .and_then(|v| v.as_dict().cloned());
        self.trailer = match trailer {
            Some(trailer) => trailer,
            None => self.find_catalog_trailer()?,
        };
        Ok(())
    }

    fn find_catalog_trailer(&self) -> PdfResult<Dictionary> {
        for (number, entry) in self.xref.iter() {
            let id = ObjectId::new(number, entry.generation());
            if let Ok(Some(value)) = self.read_object(id) {
                if value.has_type(names::CATALOG) {
                    let mut trailer = Dictionary::new();
                    trailer.set(names::ROOT, id);
                    trailer.set(names::SIZE, self.xref.iter().map(|(n, _)| n.saturating_add(1)).max().unwrap_or(1));
                    return Ok(trailer);
                }
            }
        }
        Err(PdfError::malformed("No catalog found while rebuilding the file structure"))
    }

    /// Parse `N G obj <value> [stream ... endstream]` at `offset`
    fn parse_indirect_at(&self, offset: usize, expected: Option<ObjectId>) -> PdfResult<(ObjectId, Value)> {
        let mut lexer = Lexer::at(&self.data, offset);
        let id = lexer.read_object_header()?;
        if let Some(expected) = expected {
            if expected.number != id.number {
                return Err(PdfError::malformed(format!(
                    "Expected object {} at offset {}, found {}",
                    expected, offset, id
                )));
            }
        }

        let mut dict = match lexer.read_value()? {
            Value::Dictionary(dict) => dict,
            other => return Ok((id, other)),
        };
        let Some(start) = lexer.stream_start() else {
            return Ok((id, Value::Dictionary(dict)));
        };

        let length = self.stream_length(&dict, id, start);
        dict.set(names::LENGTH, length);
        Ok((id, Value::Stream(Box::new(Stream::backed(dict, id, start as u64, length)))))
    }

    /// Declared `/Length` when it ends at `endstream`, otherwise the
    /// distance to the next `endstream` keyword
    fn stream_length(&self, dict: &Dictionary, owner: ObjectId, start: usize) -> usize {
        let declared = match dict.get(names::LENGTH) {
            Some(Value::Reference(id)) if *id != owner => self
                .read_object(*id)
                .ok()
                .flatten()
                .and_then(|v| v.as_i64()),
            Some(value) => value.as_i64(),
            None => None,
        };

        if let Some(length) = declared.filter(|&l| l >= 0).map(|l| l as usize) {
            let end = start.saturating_add(length);
            if end <= self.data.len() {
                let after = Lexer::at(&self.data, end).read_token();
                if after.starts_with(ENDSTREAM) {
                    return length;
                }
            }
        }

        match find(&self.data, ENDSTREAM, start) {
            Some(mut end) => {
                warn!("Stream {} has a wrong /Length, using endstream position", owner);
                while end > start && is_whitespace(self.data[end - 1]) {
                    end -= 1;
                }
                end - start
            }
            None => self.data.len() - start,
        }
    }

    fn object_stream(&self, number: u32) -> PdfResult<Arc<Vec<(u32, Value)>>> {
        if let Some(cached) = self.object_streams.borrow().get(&number) {
            return Ok(Arc::clone(cached));
        }

        let id = ObjectId::new(number, 0);
        let stream = match self.read_object(id)? {
            Some(Value::Stream(stream)) => stream,
            _ => return Err(PdfError::malformed(format!("Object stream {} is missing", id))),
        };
        let data = self.read_stream_bytes(&stream, true)?;
        // each header pair takes at least four bytes
        let count = (stream.dict().get_i64(names::N).unwrap_or(0).max(0) as usize).min(data.len() / 4);
        let first = stream.dict().get_i64(names::FIRST).unwrap_or(0).max(0) as usize;
        trace!("Object stream {} holds {} objects", id, count);

        let mut header = Lexer::new(&data);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let number = header.read_unsigned()? as u32;
            let offset = header.read_unsigned()? as usize;
            offsets.push((number, offset));
        }

        let mut objects = Vec::with_capacity(count);
        for (number, offset) in offsets {
            let mut lexer = Lexer::at(&data, first.saturating_add(offset));
            match lexer.read_value() {
                Ok(value) => objects.push((number, value)),
                Err(err) => {
                    warn!("Object {} in object stream {} is unreadable: {}", number, id, err);
                    objects.push((number, Value::Null));
                }
            }
        }

        let objects = Arc::new(objects);
        self.object_streams.borrow_mut().insert(number, Arc::clone(&objects));
        Ok(objects)
    }

    fn decrypt_strings(&self, encryptor: &dyn Encryptor, id: ObjectId, value: &mut Value) -> PdfResult<()> {
        match value {
            Value::String(string) => {
                let hex = string.is_hex();
                let mut decrypted = super::PdfString::new(encryptor.decrypt_bytes(id, string.as_bytes())?);
                decrypted.set_hex(hex);
                *string = decrypted;
            }
            Value::Array(array) => {
                for item in array.iter_mut() {
                    self.decrypt_strings(encryptor, id, item)?;
                }
            }
            Value::Dictionary(dict) => {
                for (_, item) in dict.iter_mut() {
                    self.decrypt_strings(encryptor, id, item)?;
                }
            }
            Value::Stream(stream) => {
                for (_, item) in stream.dict_mut().iter_mut() {
                    self.decrypt_strings(encryptor, id, item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn should_decrypt(&self, id: ObjectId) -> Option<&dyn Encryptor> {
        let encryptor = self.props.encryptor.as_deref()?;
        (self.encrypt.is_some() && self.encrypt != Some(id) && !self.xref_streams.contains(&id))
            .then_some(encryptor)
    }
}

impl ObjectReader for PdfReader {
    fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    fn entries(&self) -> Vec<(ObjectId, XrefEntry)> {
        self.xref
            .iter()
            .map(|(number, entry)| (ObjectId::new(number, entry.generation()), entry))
            .collect()
    }

    /// Every object takes at least one byte of the file
    fn max_object_number(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX).clamp(1024, MAX_OBJECT_NUMBER)
    }

    fn read_object(&self, id: ObjectId) -> PdfResult<Option<Value>> {
        match self.xref.get(id.number) {
            Some(XrefEntry::InUse { offset, generation }) if *generation == id.generation => {
                let (_, mut value) = self.parse_indirect_at(*offset as usize, Some(id))?;
                if let Some(encryptor) = self.should_decrypt(id) {
                    self.decrypt_strings(encryptor, id, &mut value)?;
                }
                Ok(Some(value))
            }
            Some(XrefEntry::Compressed { stream, index }) if id.generation == 0 => {
                let objects = self.object_stream(*stream)?;
                let by_index = objects.get(*index as usize).filter(|(n, _)| *n == id.number);
                let found = by_index.or_else(|| objects.iter().find(|(n, _)| *n == id.number));
                Ok(found.map(|(_, value)| value.clone()))
            }
            _ => Ok(None),
        }
    }

    fn read_stream_bytes(&self, stream: &Stream, decoded: bool) -> PdfResult<Vec<u8>> {
        let Payload::Backed { owner, offset, length } = stream.payload() else {
            return Ok(stream.bytes_with(decoded, Some(self))?.unwrap_or_default());
        };

        let start = (*offset as usize).min(self.data.len());
        let end = start.saturating_add(*length).min(self.data.len());
        let mut raw = self.data[start..end].to_vec();

        if let Some(encryptor) = self.should_decrypt(*owner) {
            let is_embedded_file = stream.dict().type_name().map_or(false, |t| t == names::EMBEDDED_FILE);
            if !encryptor.is_embedded_files_only() || is_embedded_file {
                raw = encryptor.decrypt_bytes(*owner, &raw)?;
            }
        }

        if decoded {
            decode_bytes(&raw, stream.dict(), &self.limits())
        } else {
            Ok(raw)
        }
    }

    fn decode_limits(&self) -> DecodeLimits {
        self.limits()
    }

    fn structural_objects(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .xref
            .iter()
            .filter_map(|(_, entry)| match entry {
                XrefEntry::Compressed { stream, .. } => Some(ObjectId::new(stream, 0)),
                _ => None,
            })
            .collect();
        ids.extend(self.xref_streams.iter().copied());
        ids.sort();
        ids.dedup();
        ids
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{ObjectRegistry, PdfString};
    use pretty_assertions::assert_eq;
    use test_log::test;

    /// Assemble a file with a classic xref table from object bodies
    fn build_pdf(objects: &[&str], root: u32) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut table = XrefTable::new();
        for (i, body) in objects.iter().enumerate() {
            let number = i as u32 + 1;
            table.insert(number, XrefEntry::InUse { offset: out.len() as u64, generation: 0 });
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
        }
        let xref_offset = out.len();
        table.write_table(objects.len() as u32 + 1, &mut out).unwrap();
        out.extend_from_slice(
            format!("trailer\n<</Size {} /Root {} 0 R>>\nstartxref\n{}\n%%EOF", objects.len() + 1, root, xref_offset)
                .as_bytes(),
        );
        out
    }

    #[test]
    fn test_reads_objects_lazily() -> PdfResult<()> {
        let pdf = build_pdf(&["<</Type /Catalog /Pages 2 0 R>>", "<</Type /Pages /Kids [] /Count 0>>"], 1);
        let reader = PdfReader::new(pdf)?;
        assert_eq!(reader.version(), "1.4");
        assert_eq!(reader.trailer().get_reference(names::ROOT), Some(ObjectId::new(1, 0)));

        let pages = reader.read_object(ObjectId::new(2, 0))?.unwrap();
        assert!(pages.has_type(names::PAGES));
        assert_eq!(reader.read_object(ObjectId::new(2, 1))?, None);
        assert_eq!(reader.read_object(ObjectId::new(9, 0))?, None);
        Ok(())
    }

    #[test]
    fn test_stream_with_indirect_length() -> PdfResult<()> {
        let pdf = build_pdf(&[
            "<</Type /Catalog>>",
            "<</Length 3 0 R>>\nstream\nhello\nendstream",
            "5",
        ], 1);
        let reader = PdfReader::new(pdf)?;
        let value = reader.read_object(ObjectId::new(2, 0))?.unwrap();
        let stream = value.as_stream().unwrap();
        assert_eq!(reader.read_stream_bytes(stream, true)?, b"hello");
        assert_eq!(stream.dict().get_i64(names::LENGTH), Some(5));
        Ok(())
    }

    #[test]
    fn test_wrong_length_falls_back_to_endstream() -> PdfResult<()> {
        let pdf = build_pdf(&["<</Type /Catalog>>", "<</Length 99>>\nstream\nabc\nendstream"], 1);
        let reader = PdfReader::new(pdf)?;
        let value = reader.read_object(ObjectId::new(2, 0))?.unwrap();
        assert_eq!(reader.read_stream_bytes(value.as_stream().unwrap(), false)?, b"abc");
        Ok(())
    }

    #[test]
    fn test_broken_xref_is_rebuilt() -> PdfResult<()> {
        let mut pdf = build_pdf(&["<</Type /Catalog>>", "(two)"], 1);
        let at = rfind(&pdf, STARTXREF).unwrap();
        pdf.truncate(at);
        pdf.extend_from_slice(b"startxref\n999999\n%%EOF");

        let reader = PdfReader::new(pdf.clone())?;
        assert_eq!(reader.read_object(ObjectId::new(2, 0))?, Some(Value::from(PdfString::new("two"))));

        let strict = ReaderProperties::default().with_strict(true);
        assert!(PdfReader::with_properties(pdf, strict).is_err());
        Ok(())
    }

    /// Replace the header line of the first xref subsection
    fn with_subsection_header(pdf: &[u8], header: &str) -> Vec<u8> {
        let start = find(pdf, b"\nxref\n", 0).unwrap() + 6;
        let end = find(pdf, b"\n", start).unwrap();
        [&pdf[..start], header.as_bytes(), &pdf[end..]].concat()
    }

    #[test]
    fn test_overflowing_subsection_is_rebuilt() -> PdfResult<()> {
        let pdf = build_pdf(&["<</Type /Catalog>>", "(two)"], 1);
        let pdf = with_subsection_header(&pdf, "4294967295 3");
        let reader = PdfReader::new(pdf)?;
        assert_eq!(reader.read_object(ObjectId::new(2, 0))?, Some(Value::from(PdfString::new("two"))));
        assert!(reader.entries().iter().all(|(id, _)| id.number < 3));
        Ok(())
    }

    #[test]
    fn test_registry_skips_implausible_object_numbers() -> PdfResult<()> {
        let mut pdf = build_pdf(&["<</Type /Catalog>>", "(two)"], 1);
        let at = find(&pdf, b"trailer", 0).unwrap();
        pdf.splice(at..at, b"3000000000 1\n0000000009 00000 n \r\n".iter().copied());

        let reader = PdfReader::new(pdf)?;
        assert!(reader.entries().iter().any(|(id, _)| id.number == 3_000_000_000));
        let registry = ObjectRegistry::with_reader(Box::new(reader));
        assert_eq!(registry.size(), 3);
        assert!(registry.slot(3_000_000_000).is_none());
        assert_eq!(registry.load(ObjectId::new(2, 0))?, Some(&Value::from(PdfString::new("two"))));
        Ok(())
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(PdfReader::new(b"Not a PDF file".to_vec()), Err(PdfError::Malformed(_))));
    }
}
