//! Pluggable stream compression
//!
//! A [`CompressionStrategy`] names the filter it produces, optionally the
//! decode parameters a reader needs, and wraps a raw output sink in an
//! encoding sink. The writer picks one strategy per document and knows
//! nothing about the concrete codec.

use std::fmt;
use std::io::{self, BufWriter, Write};
use flate2::write::ZlibEncoder;
use crate::config::DEFAULT_COMPRESSION;
use crate::error::{PdfError, PdfResult};
use crate::pdf::{names, Name, Value};
use super::codecs::{encode_ascii85_group, encode_run_length};

const BUFFER_SIZE: usize = 32 * 1024;

/// Per-stream information handed to a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamContext {
    /// Effective compression level of the stream being written
    pub compression_level: i32,
}

impl Default for StreamContext {
    fn default() -> Self {
        Self { compression_level: DEFAULT_COMPRESSION }
    }
}

/// Output sink produced by a strategy. `finish` must be called to flush
/// trailing bytes and end-of-data markers.
pub trait EncodingSink: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Trait for stream compression strategies
pub trait CompressionStrategy: Send + Sync + fmt::Debug {
    /// Filter name written to `/Filter`
    fn filter_name(&self) -> Name;

    /// Parameters written to `/DecodeParms`, if any
    fn decode_params(&self) -> Option<Value> {
        None
    }

    /// Wrap `output` so that bytes written to the result end up encoded
    fn wrap_for_writing<'a>(
        &self,
        output: &'a mut dyn Write,
        context: &StreamContext,
    ) -> Box<dyn EncodingSink + 'a>;
}

/// Run `data` through `strategy` into a fresh buffer
pub fn encode_with(
    strategy: &dyn CompressionStrategy,
    data: &[u8],
    context: &StreamContext,
) -> PdfResult<Vec<u8>> {
    let mut encoded = Vec::with_capacity(data.len() / 2 + 16);
    {
        let mut sink = strategy.wrap_for_writing(&mut encoded, context);
        sink.write_all(data)
            .map_err(|e| PdfError::Compression(e.to_string()))?;
        sink.finish()
            .map_err(|e| PdfError::Compression(e.to_string()))?;
    }
    Ok(encoded)
}

// Flate

/// Zlib/deflate compression
#[derive(Debug, Clone, Copy, Default)]
pub struct FlateStrategy;

struct FlateSink<'a> {
    inner: BufWriter<ZlibEncoder<&'a mut dyn Write>>,
}

impl Write for FlateSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl EncodingSink for FlateSink<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let encoder = self.inner.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
        Ok(())
    }
}

fn flate_level(level: i32) -> flate2::Compression {
    match level {
        0..=9 => flate2::Compression::new(level as u32),
        _ => flate2::Compression::default(),
    }
}

impl CompressionStrategy for FlateStrategy {
    fn filter_name(&self) -> Name {
        Name::new(names::FLATE_DECODE)
    }

    fn wrap_for_writing<'a>(
        &self,
        output: &'a mut dyn Write,
        context: &StreamContext,
    ) -> Box<dyn EncodingSink + 'a> {
        let encoder = ZlibEncoder::new(output, flate_level(context.compression_level));
        Box::new(FlateSink {
            inner: BufWriter::with_capacity(BUFFER_SIZE, encoder),
        })
    }
}

// ASCII85

/// 7-bit clean base-85 encoding, roughly +25% in size
#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii85Strategy;

struct Ascii85Sink<'a> {
    output: &'a mut dyn Write,
    pending: Vec<u8>,
}

impl Write for Ascii85Sink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() / 4 * 4;
        if whole > 0 {
            let mut encoded = Vec::with_capacity(whole / 4 * 5);
            for chunk in self.pending[..whole].chunks(4) {
                encode_ascii85_group(chunk, &mut encoded);
            }
            self.output.write_all(&encoded)?;
            self.pending.drain(..whole);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

impl EncodingSink for Ascii85Sink<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        let mut tail = Vec::with_capacity(7);
        if !self.pending.is_empty() {
            encode_ascii85_group(&self.pending, &mut tail);
        }
        tail.extend_from_slice(b"~>");
        self.output.write_all(&tail)?;
        self.output.flush()
    }
}

impl CompressionStrategy for Ascii85Strategy {
    fn filter_name(&self) -> Name {
        Name::new(names::ASCII85_DECODE)
    }

    fn wrap_for_writing<'a>(
        &self,
        output: &'a mut dyn Write,
        _context: &StreamContext,
    ) -> Box<dyn EncodingSink + 'a> {
        Box::new(Ascii85Sink { output, pending: Vec::with_capacity(4) })
    }
}

// ASCIIHex

/// Hexadecimal encoding, doubles the size
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiHexStrategy;

struct AsciiHexSink<'a> {
    output: &'a mut dyn Write,
}

impl Write for AsciiHexSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write_all(hex::encode_upper(buf).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

impl EncodingSink for AsciiHexSink<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.output.write_all(b">")?;
        self.output.flush()
    }
}

impl CompressionStrategy for AsciiHexStrategy {
    fn filter_name(&self) -> Name {
        Name::new(names::ASCII_HEX_DECODE)
    }

    fn wrap_for_writing<'a>(
        &self,
        output: &'a mut dyn Write,
        _context: &StreamContext,
    ) -> Box<dyn EncodingSink + 'a> {
        Box::new(AsciiHexSink { output })
    }
}

// RunLength

/// Run-length encoding, only pays off on long runs of repeated bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLengthStrategy;

struct RunLengthSink<'a> {
    output: &'a mut dyn Write,
    buffered: Vec<u8>,
}

impl Write for RunLengthSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffered.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl EncodingSink for RunLengthSink<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        let encoded = encode_run_length(&self.buffered);
        self.output.write_all(&encoded)?;
        self.output.flush()
    }
}

impl CompressionStrategy for RunLengthStrategy {
    fn filter_name(&self) -> Name {
        Name::new(names::RUN_LENGTH_DECODE)
    }

    fn wrap_for_writing<'a>(
        &self,
        output: &'a mut dyn Write,
        _context: &StreamContext,
    ) -> Box<dyn EncodingSink + 'a> {
        Box::new(RunLengthSink { output, buffered: Vec::new() })
    }
}
