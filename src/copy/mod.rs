//! Copying objects between documents
//!
//! Copies are deep: every object reachable from the copied value is
//! recreated in the target document. Indirect objects are copied once per
//! source document unless duplication is requested explicitly, and with
//! smart mode enabled objects of equal content share one target object.

mod smart;

pub use smart::SerializedContent;

use std::collections::HashMap;
use log::{trace, warn};
use crate::error::{PdfError, PdfResult};
use crate::pdf::{names, Array, Dictionary, Document, DocumentId, Name, ObjectId, Resolve, Stream, Value};

/// Dictionary types that are never shared through smart mode
const NOT_DEDUPLICATED: [&str; 3] = [names::PAGE, "OCG", "OCMD"];

/// Step from an indirect object down to a nested container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(Name),
    Index(usize),
}

/// Where a dictionary entry sits in the source document
#[derive(Clone, Copy)]
pub struct CopySite<'a> {
    /// Source dictionary holding the entry
    pub parent: &'a Dictionary,
    /// Nearest indirect object enclosing `parent`
    pub anchor: Option<ObjectId>,
    /// Path from `anchor` to `parent`
    pub path: &'a [Segment],
    /// Source document, for following references
    pub source: &'a dyn Resolve,
}

/// Hook consulted for every dictionary entry before it is copied.
///
/// Returning `false` leaves the entry out of the copy; the filter may
/// record what it skipped and deal with it later.
pub trait CopyFilter {
    fn should_process(&mut self, site: &CopySite<'_>, key: &Name, value: &Value) -> bool;
}

impl<F> CopyFilter for F
where
    F: FnMut(&CopySite<'_>, &Name, &Value) -> bool,
{
    fn should_process(&mut self, site: &CopySite<'_>, key: &Name, value: &Value) -> bool {
        self(site, key, value)
    }
}

/// Copies everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCopyFilter;

impl CopyFilter for NullCopyFilter {
    fn should_process(&mut self, _: &CopySite<'_>, _: &Name, _: &Value) -> bool {
        true
    }
}

/// Objects copied into a document so far
#[derive(Debug, Default)]
pub(crate) struct CopyCache {
    /// Source object to its copy
    copied: HashMap<(DocumentId, ObjectId), ObjectId>,
    /// Content key to the object holding that content
    smart: HashMap<SerializedContent, ObjectId>,
}

impl CopyCache {
    pub(crate) fn copy_of(&self, source: DocumentId, id: ObjectId) -> Option<ObjectId> {
        self.copied.get(&(source, id)).copied()
    }

    pub(crate) fn record(&mut self, source: DocumentId, id: ObjectId, copy: ObjectId) {
        self.copied.insert((source, id), copy);
    }

    pub(crate) fn len(&self) -> usize {
        self.copied.len()
    }
}

/// One copy run from `source` into `target`
pub(crate) struct CopyEngine<'a> {
    source: &'a Document,
    target: &'a mut Document,
    filter: &'a mut dyn CopyFilter,
    smart_mode: bool,
}

impl<'a> CopyEngine<'a> {
    pub(crate) fn new(source: &'a Document, target: &'a mut Document, filter: &'a mut dyn CopyFilter) -> PdfResult<Self> {
        let smart_mode = match target.writer_properties() {
            Some(props) => props.smart_mode,
            None => return Err(PdfError::ReadOnlyDocument),
        };
        Ok(Self { source, target, filter, smart_mode })
    }

    pub(crate) fn target(&mut self) -> &mut Document {
        &mut *self.target
    }

    /// Copy `value`; an indirect source yields a reference to the copy
    pub(crate) fn copy(&mut self, value: &Value, allow_duplicating: bool) -> PdfResult<Value> {
        self.copy_excluding(value, &[], allow_duplicating)
    }

    /// Like [`copy`](Self::copy), leaving out `excluded` keys of the
    /// top-level dictionary
    pub(crate) fn copy_excluding(&mut self, value: &Value, excluded: &[&str], allow_duplicating: bool) -> PdfResult<Value> {
        match value {
            Value::Reference(id) => self.copy_indirect(*id, excluded, allow_duplicating),
            other => self.copy_direct(other, None, &mut Vec::new(), excluded),
        }
    }

    /// Copy `value`, the content of source object `anchor`, without
    /// allocating a target object for it
    pub(crate) fn copy_contents(&mut self, value: &Value, anchor: ObjectId, excluded: &[&str]) -> PdfResult<Value> {
        self.copy_direct(value, Some(anchor), &mut Vec::new(), excluded)
    }

    fn copy_indirect(&mut self, id: ObjectId, excluded: &[&str], allow_duplicating: bool) -> PdfResult<Value> {
        if self.source.is_writable() {
            return Err(PdfError::CopyFromWritingDocument(id));
        }

        let resolved = self.source.resolve(id, true)?;
        match &resolved {
            Value::Null => return Ok(Value::Null),
            Value::Reference(last) => {
                warn!("Not copying {}: reference chain does not end", last);
                return Ok(Value::Null);
            }
            value if value.has_type(names::CATALOG) => {
                warn!("Copying the catalog dictionary is not allowed, writing null");
                return Ok(Value::Null);
            }
            _ => {}
        }

        let source_id = self.source.id();
        if !allow_duplicating {
            if let Some(copy) = self.target.copy_cache.copy_of(source_id, id) {
                return Ok(Value::Reference(copy));
            }
        }

        let mut content_key = None;
        if self.smart_mode && !allow_duplicating && is_shareable(&resolved) {
            content_key = SerializedContent::of(Some(id), &resolved, self.source, self.source.reader())?;
            let existing = content_key.and_then(|key| self.target.copy_cache.smart.get(&key).copied());
            if let Some(existing) = existing {
                trace!("{} has the content of {}, sharing it", id, existing);
                self.target.copy_cache.record(source_id, id, existing);
                return Ok(Value::Reference(existing));
            }
        }

        // Recorded before the content so cycles come back to this copy
        let copy_id = self.target.create_next_reference()?;
        self.target.copy_cache.record(source_id, id, copy_id);
        trace!("Copying {} as {}", id, copy_id);

        let copy = self.copy_direct(&resolved, Some(id), &mut Vec::new(), excluded)?;
        self.target.make_indirect_at(copy_id, copy)?;
        if let Some(key) = content_key {
            self.target.copy_cache.smart.insert(key, copy_id);
        }
        Ok(Value::Reference(copy_id))
    }

    fn copy_direct(
        &mut self,
        value: &Value,
        anchor: Option<ObjectId>,
        path: &mut Vec<Segment>,
        excluded: &[&str],
    ) -> PdfResult<Value> {
        let copy = match value {
            Value::Reference(id) => self.copy_indirect(*id, &[], false)?,
            Value::Array(array) => {
                let mut copy = Array::new();
                for (index, item) in array.iter().enumerate() {
                    path.push(Segment::Index(index));
                    let item = self.copy_direct(item, anchor, path, &[]);
                    path.pop();
                    copy.push(item?);
                }
                Value::Array(copy)
            }
            Value::Dictionary(dict) => Value::Dictionary(self.copy_dictionary(dict, anchor, path, excluded)?),
            Value::Stream(stream) => {
                let dict = self.copy_dictionary(stream.dict(), anchor, path, excluded)?;
                let data = stream
                    .bytes_with(false, self.source.reader())?
                    .ok_or(PdfError::UnconsumedByteSource)?;
                let mut copy = Stream::with_dictionary(dict);
                copy.set_encoded(data);
                copy.set_compression_level(stream.compression_level());
                Value::from(copy)
            }
            other => other.clone(),
        };
        Ok(copy)
    }

    fn copy_dictionary(
        &mut self,
        dict: &Dictionary,
        anchor: Option<ObjectId>,
        path: &mut Vec<Segment>,
        excluded: &[&str],
    ) -> PdfResult<Dictionary> {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if excluded.contains(&key.as_str()) {
                continue;
            }
            let site = CopySite {
                parent: dict,
                anchor,
                path: path.as_slice(),
                source: self.source,
            };
            if !self.filter.should_process(&site, key, value) {
                trace!("Copy filter skipped {}", key);
                continue;
            }
            path.push(Segment::Key(key.clone()));
            let item = self.copy_direct(value, anchor, path, &[]);
            path.pop();
            copy.set(key.clone(), item?);
        }
        Ok(copy)
    }
}

fn is_shareable(value: &Value) -> bool {
    match value {
        Value::Dictionary(dict) => !dict.type_name().map_or(false, |t| NOT_DEDUPLICATED.contains(&t.as_str())),
        Value::Stream(_) => true,
        _ => false,
    }
}

impl Document {
    /// Copy `value` from this document into `target`.
    ///
    /// This document must be read-only and `target` must have a writer.
    /// Unless `allow_duplicating` is set, an indirect object already copied
    /// from this document is not copied again.
    pub fn copy_to(&self, value: &Value, target: &mut Document, allow_duplicating: bool) -> PdfResult<Value> {
        self.copy_to_with(value, target, allow_duplicating, &mut NullCopyFilter)
    }

    /// [`copy_to`](Self::copy_to) with a filter consulted for every
    /// dictionary entry
    pub fn copy_to_with(
        &self,
        value: &Value,
        target: &mut Document,
        allow_duplicating: bool,
        filter: &mut dyn CopyFilter,
    ) -> PdfResult<Value> {
        CopyEngine::new(self, target, filter)?.copy(value, allow_duplicating)
    }
}
