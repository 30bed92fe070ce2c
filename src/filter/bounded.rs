//! Memory-bounded output buffer for decompression

use std::io::{self, Write};
use crate::config::DEFAULT_MAX_STREAM_SIZE;
use crate::error::{MemoryLimitIoError, PdfError, PdfResult};

/// Growable byte buffer that refuses to grow past a fixed ceiling.
///
/// Every decoder writes into one of these. A write that would push the
/// size past the ceiling, or past what a 32-bit count can hold, fails as a
/// whole and leaves the buffer untouched.
///
/// Not meant to be shared between threads.
#[derive(Debug)]
pub struct BoundedBuffer {
    buf: Vec<u8>,
    max_size: usize,
}

impl BoundedBuffer {
    /// Create a buffer with the given ceiling in bytes
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Append `data`, failing with a memory limit error if the result would
    /// not fit
    pub fn try_extend(&mut self, data: &[u8]) -> PdfResult<()> {
        self.check(data.len()).map_err(PdfError::MemoryLimit)?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn check(&self, additional: usize) -> Result<(), String> {
        let new_len = self.buf.len() as u64 + additional as u64;
        if new_len > i32::MAX as u64 {
            return Err("a single decompressed stream exceeded the maximum 32-bit size".to_string());
        }
        if new_len > self.max_size as u64 {
            return Err(format!(
                "a single decompressed stream occupied more than the allowed {} bytes",
                self.max_size
            ));
        }
        Ok(())
    }
}

impl Default for BoundedBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STREAM_SIZE)
    }
}

impl Write for BoundedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Err(msg) = self.check(data.len()) {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, MemoryLimitIoError(msg)));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_writes_under_ceiling() -> PdfResult<()> {
        let mut buf = BoundedBuffer::new(8);
        buf.try_extend(b"abcd")?;
        buf.write_all(b"efgh")?;
        assert_eq!(buf.as_slice(), b"abcdefgh");
        Ok(())
    }

    #[test]
    fn test_exceeding_ceiling_fails_without_growing() {
        let mut buf = BoundedBuffer::new(6);
        buf.try_extend(b"abcd").unwrap();

        let err = buf.try_extend(b"efg").unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert_eq!(buf.len(), 4);

        let io_err = buf.write(b"efg").unwrap_err();
        assert!(PdfError::from_io(io_err).is_resource_exhaustion());
        assert!(buf.len() <= buf.max_size());
    }

    #[test]
    fn test_io_copy_is_bounded() {
        let mut buf = BoundedBuffer::new(100);
        let source = vec![1u8; 1000];
        let err = io::copy(&mut source.as_slice(), &mut buf).unwrap_err();
        assert!(matches!(PdfError::from_io(err), PdfError::MemoryLimit(_)));
        assert!(buf.len() <= 100);
    }

    #[test]
    fn test_default_ceiling() {
        assert_eq!(BoundedBuffer::default().max_size(), i32::MAX as usize - 8);
    }
}
