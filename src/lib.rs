//! PDF Kernel Library for Rust
//!
//! The object model underneath a PDF toolkit: values, indirect references
//! and their registry, streams with filter decoding and compression, a
//! reader and writer for the file structure, balanced name and number
//! trees, deep copies between documents and page copying with link and
//! outline readdressing.
//!
//! ```no_run
//! use pdf_kernel::{Document, PdfResult, WriterProperties};
//!
//! fn merge(first: &[u8], second: &[u8]) -> PdfResult<Vec<u8>> {
//!     let output = tempfile::NamedTempFile::new()?;
//!     let mut merged = Document::create(output.reopen()?, WriterProperties::default().with_smart_mode(true))?;
//!     for data in [first, second] {
//!         let source = Document::from_bytes(data)?;
//!         source.copy_pages_to(1..=source.page_count(), &mut merged, true)?;
//!     }
//!     merged.close()?;
//!     Ok(std::fs::read(output.path())?)
//! }
//! ```

pub mod config;
pub mod copy;
pub mod crypto;
mod error;
pub mod filter;
pub mod navigation;
pub mod pdf;
pub mod tree;

pub use config::{CompressionKind, ReaderProperties, WriterProperties};
pub use copy::{CopyFilter, CopySite, NullCopyFilter, SerializedContent};
pub use crypto::Encryptor;
pub use error::{PdfError, PdfResult};
pub use navigation::{Destination, DestinationResolver, OutlineId, Outlines, PageCopier, ResolutionReport};
pub use pdf::{Array, Dictionary, Document, DocumentId, Name, ObjectId, PdfReader, PdfString, Stream, Value};
pub use tree::{NameTree, NumberTree};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;
    use test_log::test;

    #[test]
    fn test_document_written_to_file() -> PdfResult<()> {
        let file = NamedTempFile::new()?;
        let mut doc = Document::create(file.reopen()?, WriterProperties::default())?;
        doc.add_new_page([0.0, 0.0, 612.0, 792.0])?;
        doc.close()?;

        let data = fs::read(file.path())?;
        assert!(data.starts_with(b"%PDF-"));
        assert!(data.ends_with(b"%%EOF\n"));
        assert_eq!(Document::from_bytes(data)?.page_count(), 1);
        Ok(())
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
