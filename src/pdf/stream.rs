//! PDF stream object implementation

use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};
use log::{trace, warn};
use crate::config::UNDEFINED_COMPRESSION;
use crate::error::{PdfError, PdfResult};
use crate::filter::{decode_bytes, DecodeLimits};
use super::{names, Dictionary, ObjectId, ObjectReader};

/// Caller supplied reader, consumed once when the stream is written.
#[derive(Clone)]
pub struct ByteSource(Arc<Mutex<Option<Box<dyn Read + Send>>>>);

impl ByteSource {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    /// Take the reader out, leaving the source consumed
    pub(crate) fn take(&self) -> Option<Box<dyn Read + Send>> {
        self.0.lock().ok().and_then(|mut guard| guard.take())
    }

    pub fn is_consumed(&self) -> bool {
        self.0.lock().map_or(true, |guard| guard.is_none())
    }
}

impl PartialEq for ByteSource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSource(consumed: {})", self.is_consumed())
    }
}

/// Where the bytes of a stream come from
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    /// Encoded bytes held in memory
    Buffer(Vec<u8>),
    /// External reader, not consumed yet
    Source(ByteSource),
    /// Range of the backing file, still encrypted if the file is
    Backed {
        owner: ObjectId,
        offset: u64,
        length: usize,
    },
}

/// PDF stream object: a dictionary plus exactly one payload source
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dict: Dictionary,
    payload: Payload,
    compression_level: i32,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    /// Empty in-memory stream
    pub fn new() -> Self {
        Self::with_dictionary(Dictionary::new())
    }

    pub fn with_dictionary(dict: Dictionary) -> Self {
        Self {
            dict,
            payload: Payload::Buffer(Vec::new()),
            compression_level: UNDEFINED_COMPRESSION,
        }
    }

    /// In-memory stream holding unfiltered `data`
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let mut stream = Self::new();
        stream.dict.set(names::LENGTH, data.len());
        stream.payload = Payload::Buffer(data);
        stream
    }

    /// Stream whose content is pulled from `reader` at write time.
    /// Its bytes cannot be read or replaced before that.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            dict: Dictionary::new(),
            payload: Payload::Source(ByteSource::new(reader)),
            compression_level: UNDEFINED_COMPRESSION,
        }
    }

    /// Stream parsed from a file, payload left in place
    pub(crate) fn backed(dict: Dictionary, owner: ObjectId, offset: u64, length: usize) -> Self {
        Self {
            dict,
            payload: Payload::Backed { owner, offset, length },
            compression_level: UNDEFINED_COMPRESSION,
        }
    }

    pub fn dict(&self) -> &Dictionary {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.dict
    }

    pub fn into_dict(self) -> Dictionary {
        self.dict
    }

    pub(crate) fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Compression level for this stream, `UNDEFINED_COMPRESSION` means
    /// the writer's level applies
    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    pub fn set_compression_level(&mut self, level: i32) {
        self.compression_level = level;
    }

    /// Whether the payload comes from an external reader that is still unread
    pub fn has_unconsumed_source(&self) -> bool {
        matches!(&self.payload, Payload::Source(source) if !source.is_consumed())
    }

    /// Whether a `/Filter` entry is present
    pub fn is_filtered(&self) -> bool {
        self.dict.contains_key(names::FILTER)
    }

    /// Bytes of an in-memory or reader-less stream.
    /// See [`Stream::bytes_with`].
    pub fn bytes(&self, decoded: bool) -> PdfResult<Option<Vec<u8>>> {
        self.bytes_with(decoded, None)
    }

    /// Single read path for stream content.
    ///
    /// Returns `None` with a warning when the payload is an unconsumed byte
    /// source. File backed payloads need the `reader` they were parsed
    /// from. With `decoded` the `/Filter` chain is undone, leaving image
    /// filters in place.
    pub fn bytes_with(&self, decoded: bool, reader: Option<&dyn ObjectReader>) -> PdfResult<Option<Vec<u8>>> {
        match &self.payload {
            Payload::Source(_) => {
                warn!("Stream bytes requested from an unconsumed byte source");
                Ok(None)
            }
            Payload::Buffer(data) if decoded && self.is_filtered() => {
                let limits = reader.map_or_else(DecodeLimits::default, |r| r.decode_limits());
                decode_bytes(data, &self.dict, &limits).map(Some)
            }
            Payload::Buffer(data) => Ok(Some(data.clone())),
            Payload::Backed { owner, .. } => {
                let reader = reader.ok_or_else(|| {
                    PdfError::no_writer(format!("stream {} needs its source reader", owner))
                })?;
                reader.read_stream_bytes(self, decoded).map(Some)
            }
        }
    }

    /// Replace (or append to) the content with unfiltered bytes.
    /// See [`Stream::set_data_with`].
    pub fn set_data(&mut self, data: &[u8], append: bool) -> PdfResult<()> {
        self.set_data_with(data, append, None)
    }

    /// Replace the payload with `data`, or with the decoded current content
    /// followed by `data` when `append` is set.
    ///
    /// `/Filter` and `/DecodeParms` are removed: new content is always raw,
    /// the writer compresses it again.
    pub fn set_data_with(&mut self, data: &[u8], append: bool, reader: Option<&dyn ObjectReader>) -> PdfResult<()> {
        if matches!(self.payload, Payload::Source(_)) {
            return Err(PdfError::UnconsumedByteSource);
        }

        let content = if append {
            let mut existing = self.bytes_with(true, reader)?.unwrap_or_default();
            existing.extend_from_slice(data);
            existing
        } else {
            data.to_vec()
        };

        trace!("Setting {} bytes of stream data", content.len());
        self.dict.remove(names::FILTER);
        self.dict.remove(names::DECODE_PARMS);
        self.dict.set(names::LENGTH, content.len());
        self.payload = Payload::Buffer(content);
        Ok(())
    }

    /// Replace the payload with already encoded bytes, keeping the filters
    pub(crate) fn set_encoded(&mut self, data: Vec<u8>) {
        self.dict.set(names::LENGTH, data.len());
        self.payload = Payload::Buffer(data);
    }

    /// Reader of a byte-source payload, taken for writing
    pub(crate) fn take_source(&mut self) -> Option<Box<dyn Read + Send>> {
        match &self.payload {
            Payload::Source(source) => source.take(),
            _ => None,
        }
    }
}
