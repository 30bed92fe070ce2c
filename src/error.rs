//! Error types for the PDF object kernel

use std::io;
use thiserror::Error;
use crate::pdf::ObjectId;

/// Main error type for object model, copy and serialization operations
#[derive(Error, Debug)]
pub enum PdfError {
    /// Content mutation or re-registration of an already flushed object
    #[error("Object {0} has already been flushed")]
    FlushedObject(ObjectId),

    /// The document has no writer, so no new references can be minted
    #[error("Document has no writer: {0}")]
    NoWriter(String),

    /// Copy target document was opened in reading mode
    #[error("Cannot copy to a document opened in reading mode")]
    ReadOnlyDocument,

    /// Source object belongs to a document that is being written
    #[error("Cannot copy indirect object {0} from a document that is being written")]
    CopyFromWritingDocument(ObjectId),

    /// Reference minted by another document used in this one
    #[error("Reference {0} belongs to another document")]
    ForeignReference(ObjectId),

    /// A freed reference is still used by a written object
    #[error("Reference {0} points to a freed object")]
    FreedReference(ObjectId),

    /// Stream data requested from a byte source that was not consumed yet
    #[error("Stream payload comes from an unconsumed byte source")]
    UnconsumedByteSource,

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: &'static str,
        found: &'static str,
    },

    /// Missing required dictionary entry
    #[error("Missing required dictionary entry: {0}")]
    MissingDictionaryEntry(String),

    /// Decompressed data exceeded the configured ceiling
    #[error("Memory limit exceeded: {0}")]
    MemoryLimit(String),

    /// Malformed PDF structure
    #[error("Malformed PDF structure: {0}")]
    Malformed(String),

    /// Object not found
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Cross reference table error
    #[error("Cross reference table error: {0}")]
    Xref(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Encryption collaborator failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for object kernel operations
pub type PdfResult<T> = Result<T, PdfError>;

impl PdfError {
    /// Create a new malformed PDF error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new missing writer error
    pub fn no_writer(operation: impl Into<String>) -> Self {
        Self::NoWriter(operation.into())
    }

    /// Create a new memory limit error
    pub fn memory_limit(msg: impl Into<String>) -> Self {
        Self::MemoryLimit(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new invalid object type error
    pub fn invalid_type(expected: &'static str, found: &'static str) -> Self {
        Self::InvalidObjectType { expected, found }
    }

    /// Check if error is a caller precondition violation
    pub fn is_precondition(&self) -> bool {
        matches!(self,
            Self::FlushedObject(_) |
            Self::NoWriter(_) |
            Self::ReadOnlyDocument |
            Self::CopyFromWritingDocument(_) |
            Self::ForeignReference(_) |
            Self::FreedReference(_) |
            Self::UnconsumedByteSource |
            Self::InvalidObjectType { .. } |
            Self::InvalidArgument(_)
        )
    }

    /// Check if error is the resource exhaustion guard firing
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::MemoryLimit(_))
    }

    /// Check if error is related to PDF structure
    pub fn is_structure_error(&self) -> bool {
        matches!(self,
            Self::Malformed(_) |
            Self::Xref(_) |
            Self::ObjectNotFound(_) |
            Self::MissingDictionaryEntry(_)
        )
    }
}

/// Marker error carried inside `io::Error` when a bounded buffer overflows.
#[derive(Error, Debug)]
#[error("{0}")]
pub(crate) struct MemoryLimitIoError(pub(crate) String);

impl PdfError {
    /// Convert an IO error, recovering memory limit failures raised by
    /// bounded sinks wrapped in `io::Write` adapters.
    pub(crate) fn from_io(err: io::Error) -> Self {
        if err.get_ref().map_or(false, |inner| inner.is::<MemoryLimitIoError>()) {
            let msg = err.into_inner()
                .map(|inner| inner.to_string())
                .unwrap_or_default();
            return Self::MemoryLimit(msg);
        }
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PdfError::malformed("Invalid header");
        assert!(matches!(err, PdfError::Malformed(_)));

        let err = PdfError::memory_limit("too big");
        assert!(matches!(err, PdfError::MemoryLimit(_)));

        let err = PdfError::no_writer("make indirect");
        assert!(matches!(err, PdfError::NoWriter(_)));
    }

    #[test]
    fn test_error_categorization() {
        let flushed = PdfError::FlushedObject(ObjectId::new(3, 0));
        assert!(flushed.is_precondition());
        assert!(!flushed.is_resource_exhaustion());

        let limit = PdfError::memory_limit("x");
        assert!(limit.is_resource_exhaustion());
        assert!(!limit.is_structure_error());

        let structure = PdfError::malformed("x");
        assert!(structure.is_structure_error());
        assert!(!structure.is_precondition());
    }

    #[test]
    fn test_error_display() {
        let err = PdfError::FlushedObject(ObjectId::new(12, 1));
        assert_eq!(err.to_string(), "Object 12 1 R has already been flushed");

        let err = PdfError::InvalidObjectType {
            expected: "dictionary",
            found: "array",
        };
        assert_eq!(err.to_string(), "Invalid object type: expected dictionary, found array");
    }

    #[test]
    fn test_memory_limit_survives_io_wrapping() {
        let io_err = io::Error::new(io::ErrorKind::OutOfMemory, MemoryLimitIoError("ceiling".into()));
        let err = PdfError::from_io(io_err);
        assert!(matches!(err, PdfError::MemoryLimit(ref m) if m == "ceiling"));

        let plain = PdfError::from_io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(plain, PdfError::Io(_)));
    }
}
