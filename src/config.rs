//! Writer and reader configuration

use std::fmt;
use std::sync::Arc;
use crate::crypto::Encryptor;
use crate::filter::strategy::{
    Ascii85Strategy, AsciiHexStrategy, CompressionStrategy, FlateStrategy, RunLengthStrategy,
};

/// Compression level not set on a stream; the writer's level applies
pub const UNDEFINED_COMPRESSION: i32 = i32::MIN;
/// Codec default level
pub const DEFAULT_COMPRESSION: i32 = -1;
/// Streams are written uncompressed
pub const NO_COMPRESSION: i32 = 0;
pub const BEST_SPEED: i32 = 1;
pub const BEST_COMPRESSION: i32 = 9;

/// Maximum number of objects packed into one object stream
pub const MAX_OBJECTS_IN_STREAM: usize = 200;
/// Fan-out of name and number tree nodes
pub const TREE_NODE_SIZE: usize = 40;
/// Maximum number of hops followed when resolving a reference chain
pub const MAX_REFERENCE_CHAIN: usize = 31;
/// Largest object number a registry accepts from a cross-reference section
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;
/// Default ceiling for decompressed stream buffers
pub const DEFAULT_MAX_STREAM_SIZE: usize = i32::MAX as usize - 8;

/// Built-in stream compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Flate,
    Ascii85,
    AsciiHex,
    RunLength,
    None,
}

/// Compression selected for streams written by a document
#[derive(Clone)]
pub enum Compression {
    Builtin(CompressionKind),
    Custom(Arc<dyn CompressionStrategy>),
}

impl Compression {
    /// Strategy instance, `None` when streams stay uncompressed
    pub fn strategy(&self) -> Option<Arc<dyn CompressionStrategy>> {
        match self {
            Compression::Builtin(CompressionKind::Flate) => Some(Arc::new(FlateStrategy)),
            Compression::Builtin(CompressionKind::Ascii85) => Some(Arc::new(Ascii85Strategy)),
            Compression::Builtin(CompressionKind::AsciiHex) => Some(Arc::new(AsciiHexStrategy)),
            Compression::Builtin(CompressionKind::RunLength) => Some(Arc::new(RunLengthStrategy)),
            Compression::Builtin(CompressionKind::None) => None,
            Compression::Custom(strategy) => Some(Arc::clone(strategy)),
        }
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Builtin(kind) => write!(f, "Builtin({:?})", kind),
            Compression::Custom(strategy) => write!(f, "Custom({})", strategy.filter_name()),
        }
    }
}

/// Settings for documents that write output
#[derive(Debug, Clone)]
pub struct WriterProperties {
    /// Level used for streams that do not set their own
    pub compression_level: i32,
    pub compression: Compression,
    /// Pack objects into object streams and write an xref stream
    pub full_compression: bool,
    /// Reuse identical objects while copying from other documents
    pub smart_mode: bool,
    /// Header version, e.g. "1.7"
    pub pdf_version: String,
    pub encryptor: Option<Arc<dyn Encryptor>>,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION,
            compression: Compression::Builtin(CompressionKind::Flate),
            full_compression: false,
            smart_mode: false,
            pdf_version: "1.7".to_string(),
            encryptor: None,
        }
    }
}

impl WriterProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_compression(mut self, kind: CompressionKind) -> Self {
        self.compression = Compression::Builtin(kind);
        self
    }

    /// Use a caller supplied compression strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn CompressionStrategy>) -> Self {
        self.compression = Compression::Custom(strategy);
        self
    }

    pub fn with_full_compression(mut self, enabled: bool) -> Self {
        self.full_compression = enabled;
        self
    }

    pub fn with_smart_mode(mut self, enabled: bool) -> Self {
        self.smart_mode = enabled;
        self
    }

    pub fn with_pdf_version(mut self, version: impl Into<String>) -> Self {
        self.pdf_version = version.into();
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }
}

/// Settings for documents that read an existing file
#[derive(Debug, Clone)]
pub struct ReaderProperties {
    /// Ceiling for any buffer produced by decompression
    pub max_stream_size: usize,
    /// Fail on problems that are tolerated by default
    pub strict: bool,
    pub encryptor: Option<Arc<dyn Encryptor>>,
}

impl Default for ReaderProperties {
    fn default() -> Self {
        Self {
            max_stream_size: DEFAULT_MAX_STREAM_SIZE,
            strict: false,
            encryptor: None,
        }
    }
}

impl ReaderProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stream_size(mut self, max: usize) -> Self {
        self.max_stream_size = max;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }
}
