//! Serialising indirect objects to the output file
//!
//! The writer owns the output sink and the cross-reference entries of the
//! objects written so far. Objects are taken out of the registry when they
//! are flushed; afterwards only their placement is remembered.

use std::io::{self, Read, Write};
use std::sync::Arc;
use log::{debug, trace, warn};
use crate::config::{WriterProperties, MAX_OBJECTS_IN_STREAM, NO_COMPRESSION, UNDEFINED_COMPRESSION};
use crate::crypto::Encryptor;
use crate::error::{PdfError, PdfResult};
use crate::filter::strategy::{encode_with, CompressionStrategy, StreamContext};
use crate::filter::filter_chain;
use super::registry::Placement;
use super::serialize::Serializer;
use super::stream::Payload;
use super::{names, Array, Dictionary, ObjectId, ObjectRegistry, Stream, Value, XrefEntry, XrefTable};

/// Binary marker comment written after the header
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Output sink that tracks the current byte offset
struct CountingWriter {
    inner: Box<dyn Write + Send>,
    offset: u64,
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.offset += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Object stream being filled
struct PendingObjectStream {
    id: ObjectId,
    offsets: Vec<(u32, usize)>,
    body: Vec<u8>,
}

/// Fields the document contributes to the trailer
#[derive(Debug, Default)]
pub(crate) struct TrailerInfo {
    pub root: Option<ObjectId>,
    pub info: Option<ObjectId>,
    pub encrypt: Option<ObjectId>,
    pub file_id: Option<(Vec<u8>, Vec<u8>)>,
}

pub(crate) struct DocumentWriter {
    out: CountingWriter,
    props: WriterProperties,
    strategy: Option<Arc<dyn CompressionStrategy>>,
    xref: XrefTable,
    object_stream: Option<PendingObjectStream>,
    /// The `/Encrypt` dictionary itself is written in clear text
    encrypt_dict: Option<ObjectId>,
}

impl std::fmt::Debug for DocumentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentWriter")
            .field("offset", &self.out.offset)
            .field("written", &self.xref.len())
            .field("full_compression", &self.props.full_compression)
            .finish()
    }
}

impl DocumentWriter {
    /// Start a file: writes the header line
    pub(crate) fn new(sink: Box<dyn Write + Send>, props: WriterProperties) -> PdfResult<Self> {
        let strategy = props.compression.strategy();
        let mut writer = Self {
            out: CountingWriter { inner: sink, offset: 0 },
            props,
            strategy,
            xref: XrefTable::new(),
            object_stream: None,
            encrypt_dict: None,
        };
        let header = format!("%PDF-{}\n", writer.props.pdf_version);
        writer.out.write_all(header.as_bytes())?;
        writer.out.write_all(BINARY_MARKER)?;
        Ok(writer)
    }

    pub(crate) fn properties(&self) -> &WriterProperties {
        &self.props
    }

    pub(crate) fn set_encrypt_dictionary(&mut self, id: ObjectId) {
        self.encrypt_dict = Some(id);
    }

    fn encryptor(&self) -> Option<&dyn Encryptor> {
        self.props.encryptor.as_deref()
    }

    /// Write object `id` and release its value. Streams nested inside the
    /// object are made indirect and written right after it.
    pub(crate) fn flush_object(&mut self, registry: &mut ObjectRegistry, id: ObjectId) -> PdfResult<()> {
        let Some(mut value) = registry.take_for_flush(id)? else {
            return Ok(());
        };

        let mut hoisted = Vec::new();
        hoist_nested_streams(&mut value, registry, &mut hoisted, true);
        if let Err(err) = check_references(&mut value, registry) {
            registry.attach(id, value)?;
            return Err(err);
        }

        let placement = match value {
            Value::Stream(stream) => self.write_stream_object(id, *stream, registry)?,
            other if self.props.full_compression && id.generation == 0 && Some(id) != self.encrypt_dict => {
                self.add_to_object_stream(id, &other, registry)?
            }
            other => self.write_plain_object(id, &other)?,
        };
        registry.mark_flushed(id, placement);

        for nested in hoisted {
            self.flush_object(registry, nested)?;
        }
        Ok(())
    }

    fn record(&mut self, id: ObjectId, placement: Placement) {
        let entry = match placement {
            Placement::InObjectStream { stream, index } => XrefEntry::Compressed { stream, index },
            Placement::Offset(offset) => XrefEntry::InUse { offset, generation: id.generation },
            Placement::Unplaced => return,
        };
        self.xref.insert(id.number, entry);
    }

    fn serializer(&self, id: ObjectId) -> Serializer<'_> {
        match self.encryptor() {
            Some(encryptor) if Some(id) != self.encrypt_dict => Serializer::encrypting(encryptor, id),
            _ => Serializer::plain(),
        }
    }

    fn write_plain_object(&mut self, id: ObjectId, value: &Value) -> PdfResult<Placement> {
        let mut body = Vec::new();
        self.serializer(id).write_value(value, &mut body)?;

        let placement = Placement::Offset(self.out.offset);
        trace!("Writing object {} at {}", id, self.out.offset);
        write!(self.out, "{} {} obj\n", id.number, id.generation)?;
        self.out.write_all(&body)?;
        self.out.write_all(b"\nendobj\n")?;
        self.record(id, placement);
        Ok(placement)
    }

    fn write_stream_object(&mut self, id: ObjectId, mut stream: Stream, registry: &ObjectRegistry) -> PdfResult<Placement> {
        let data = if let Payload::Buffer(data) = stream.payload() {
            data.clone()
        } else if stream.has_unconsumed_source() {
            let mut data = Vec::new();
            if let Some(mut source) = stream.take_source() {
                source.read_to_end(&mut data)?;
            }
            data
        } else {
            let reader = registry
                .reader()
                .ok_or_else(|| PdfError::malformed(format!("Stream {} lost its source file", id)))?;
            reader.read_stream_bytes(&stream, false)?
        };

        let data = self.compress(&mut stream, data)?;
        let is_xref = stream.dict().type_name().map_or(false, |t| t == names::XREF);
        let data = match self.encryptor() {
            Some(encryptor) if !is_xref && Some(id) != self.encrypt_dict => {
                let is_embedded_file = stream.dict().type_name().map_or(false, |t| t == names::EMBEDDED_FILE);
                if !encryptor.is_embedded_files_only() || is_embedded_file {
                    encryptor.encrypt_bytes(id, &data)?
                } else {
                    data
                }
            }
            _ => data,
        };
        stream.dict_mut().set(names::LENGTH, data.len());

        let mut dict_bytes = Vec::new();
        self.serializer(id).write_dictionary(stream.dict(), &mut dict_bytes)?;

        let placement = Placement::Offset(self.out.offset);
        trace!("Writing stream {} ({} bytes) at {}", id, data.len(), self.out.offset);
        write!(self.out, "{} {} obj\n", id.number, id.generation)?;
        self.out.write_all(&dict_bytes)?;
        self.out.write_all(b"\nstream\n")?;
        self.out.write_all(&data)?;
        self.out.write_all(b"\nendstream\nendobj\n")?;
        self.record(id, placement);
        Ok(placement)
    }

    /// Apply the configured strategy unless the stream opts out with level
    /// 0 or already carries that filter
    fn compress(&self, stream: &mut Stream, data: Vec<u8>) -> PdfResult<Vec<u8>> {
        let Some(strategy) = self.strategy.as_deref() else {
            return Ok(data);
        };
        let level = match stream.compression_level() {
            UNDEFINED_COMPRESSION => self.props.compression_level,
            level => level,
        };
        if level == NO_COMPRESSION {
            return Ok(data);
        }

        let filter_name = strategy.filter_name();
        let chain = filter_chain(stream.dict());
        if chain.iter().any(|(name, _)| *name == filter_name) {
            return Ok(data);
        }

        let encoded = encode_with(strategy, &data, &StreamContext { compression_level: level })?;
        let dict = stream.dict_mut();
        if chain.is_empty() {
            dict.set(names::FILTER, filter_name);
            if let Some(params) = strategy.decode_params() {
                dict.set(names::DECODE_PARMS, params);
            }
        } else {
            let mut filters = Array::new();
            filters.push(filter_name);
            let mut params = Array::new();
            params.push(strategy.decode_params().unwrap_or(Value::Null));
            let had_params = chain.iter().any(|(_, p)| p.is_some());
            for (name, param) in chain {
                filters.push(name);
                params.push(param.map_or(Value::Null, Value::from));
            }
            dict.set(names::FILTER, filters);
            if had_params || params.iter().any(|p| !p.is_null()) {
                dict.set(names::DECODE_PARMS, params);
            } else {
                dict.remove(names::DECODE_PARMS);
            }
        }
        Ok(encoded)
    }

    fn add_to_object_stream(&mut self, id: ObjectId, value: &Value, registry: &mut ObjectRegistry) -> PdfResult<Placement> {
        let full = self
            .object_stream
            .as_ref()
            .map_or(false, |pending| pending.offsets.len() >= MAX_OBJECTS_IN_STREAM);
        if full {
            self.finish_object_stream(registry)?;
        }
        if self.object_stream.is_none() {
            let stream_id = registry.create_next();
            trace!("Opening object stream {}", stream_id);
            self.object_stream = Some(PendingObjectStream {
                id: stream_id,
                offsets: Vec::new(),
                body: Vec::new(),
            });
        }

        let pending = self
            .object_stream
            .as_mut()
            .ok_or_else(|| PdfError::malformed("Object stream disappeared"))?;
        let index = pending.offsets.len() as u32;
        pending.offsets.push((id.number, pending.body.len()));
        // Strings inside object streams are covered by the stream's encryption
        Serializer::plain().write_value(value, &mut pending.body)?;
        pending.body.push(b'\n');

        let placement = Placement::InObjectStream { stream: pending.id.number, index };
        self.record(id, placement);
        Ok(placement)
    }

    /// Write the pending object stream, if any
    pub(crate) fn finish_object_stream(&mut self, registry: &mut ObjectRegistry) -> PdfResult<()> {
        let Some(pending) = self.object_stream.take() else {
            return Ok(());
        };

        let mut header = Vec::new();
        for (number, offset) in &pending.offsets {
            write!(header, "{} {} ", number, offset)?;
        }
        let first = header.len();
        header.extend_from_slice(&pending.body);

        let mut dict = Dictionary::with_type(names::OBJ_STM);
        dict.set(names::N, pending.offsets.len());
        dict.set(names::FIRST, first);
        let mut stream = Stream::with_dictionary(dict);
        stream.set_encoded(header);

        debug!("Writing object stream {} with {} objects", pending.id, pending.offsets.len());
        let placement = self.write_stream_object(pending.id, stream, registry)?;
        registry.mark_flushed(pending.id, placement);
        Ok(())
    }

    /// Finish the file: cross-reference section, trailer, `startxref`
    pub(crate) fn finish(mut self, registry: &mut ObjectRegistry, info: TrailerInfo) -> PdfResult<()> {
        self.finish_object_stream(registry)?;

        let mut trailer = Dictionary::new();
        if let Some(root) = info.root {
            trailer.set(names::ROOT, root);
        }
        if let Some(id) = info.info {
            trailer.set(names::INFO, id);
        }
        if let Some(id) = info.encrypt {
            trailer.set("Encrypt", id);
        }
        if let Some((first, second)) = info.file_id {
            trailer.set(names::ID, vec![
                Value::from(super::PdfString::hex(first)),
                Value::from(super::PdfString::hex(second)),
            ]);
        }

        let xref_offset = if self.props.full_compression {
            self.write_xref_stream(registry, trailer)?
        } else {
            let size = registry.size();
            trailer.set(names::SIZE, size);
            let offset = self.out.offset;
            let mut table = Vec::new();
            self.xref.write_table(size, &mut table)?;
            self.out.write_all(&table)?;
            self.out.write_all(b"trailer\n")?;
            let mut body = Vec::new();
            Serializer::plain().write_dictionary(&trailer, &mut body)?;
            self.out.write_all(&body)?;
            self.out.write_all(b"\n")?;
            offset
        };

        write!(self.out, "startxref\n{}\n%%EOF\n", xref_offset)?;
        self.out.flush()?;
        debug!("Wrote {} objects, {} bytes", self.xref.len(), self.out.offset);
        Ok(())
    }

    fn write_xref_stream(&mut self, registry: &mut ObjectRegistry, mut dict: Dictionary) -> PdfResult<u64> {
        let id = registry.create_next();
        let size = registry.size();
        let offset = self.out.offset;
        self.xref.insert(id.number, XrefEntry::InUse { offset, generation: id.generation });

        let (rows, widths) = self.xref.encode_stream(size)?;
        dict.set(names::TYPE, names::XREF);
        dict.set(names::SIZE, size);
        dict.set(names::W, widths);
        let mut stream = Stream::with_dictionary(dict);
        stream.set_encoded(rows);

        self.write_stream_object(id, stream, registry)?;
        registry.mark_flushed(id, Placement::Offset(offset));
        Ok(offset)
    }
}

/// Replace streams below the top level with references to new indirect
/// objects
fn hoist_nested_streams(value: &mut Value, registry: &mut ObjectRegistry, hoisted: &mut Vec<ObjectId>, top: bool) {
    match value {
        Value::Stream(_) if !top => {
            let stream = std::mem::take(value);
            let id = registry.insert(stream);
            registry.mark_must_be_flushed(id);
            trace!("Made nested stream indirect as {}", id);
            hoisted.push(id);
            *value = Value::Reference(id);
        }
        Value::Stream(stream) => {
            for (_, item) in stream.dict_mut().iter_mut() {
                hoist_nested_streams(item, registry, hoisted, false);
            }
        }
        Value::Array(array) => {
            for item in array.iter_mut() {
                hoist_nested_streams(item, registry, hoisted, false);
            }
        }
        Value::Dictionary(dict) => {
            for (_, item) in dict.iter_mut() {
                hoist_nested_streams(item, registry, hoisted, false);
            }
        }
        _ => {}
    }
}

/// References to freed objects are an error. Dangling references into a
/// source file are tolerated and written as null.
fn check_references(value: &mut Value, registry: &ObjectRegistry) -> PdfResult<()> {
    match value {
        Value::Reference(id) => {
            let id = *id;
            if registry.reference(id).map_or(false, |r| !r.is_free()) {
                return Ok(());
            }
            if registry.slot(id.number).is_some() {
                return Err(PdfError::FreedReference(id));
            }
            if registry.reader().is_some() {
                warn!("Reference {} points to a missing object, writing null", id);
                *value = Value::Null;
                return Ok(());
            }
            Err(PdfError::ForeignReference(id))
        }
        Value::Array(array) => array.iter_mut().try_for_each(|item| check_references(item, registry)),
        Value::Dictionary(dict) => dict.iter_mut().try_for_each(|(_, item)| check_references(item, registry)),
        Value::Stream(stream) => stream
            .dict_mut()
            .iter_mut()
            .try_for_each(|(_, item)| check_references(item, registry)),
        _ => Ok(()),
    }
}
