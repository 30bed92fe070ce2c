//! PDF object model, file parsing and file writing

mod array;
mod dict;
mod document;
mod name;
mod object;
pub(crate) mod parser;
mod reader;
mod registry;
pub(crate) mod serialize;
mod stream;
mod writer;
mod xref;

pub use array::Array;
pub use dict::Dictionary;
pub use document::{Document, DocumentId};
pub(crate) use document::INHERITABLE_PAGE_KEYS;
#[cfg(test)]
pub(crate) use document::test_support;
pub use name::{names, Name};
pub(crate) use object::NULL;
pub use object::{Kind, ObjectId, PdfNumber, PdfString, Value};
pub use reader::{ObjectReader, PdfReader};
pub use registry::{IndirectReference, ObjectRegistry, Placement, RefState, Resolve, MAX_GENERATION};
pub use serialize::Serializer;
pub use stream::{ByteSource, Stream};
pub use xref::{XrefEntry, XrefTable};
