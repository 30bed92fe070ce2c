//! PDF documents
//!
//! A [`Document`] owns the object registry of one file together with the
//! catalog, the flattened page list, the name and number trees and the
//! outline. Documents are opened for reading, created for writing, or
//! stamped (read and rewritten in full).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use log::{debug, trace, warn};
use crate::config::WriterProperties;
use crate::copy::CopyCache;
use crate::error::{PdfError, PdfResult};
use crate::navigation::Outlines;
use crate::tree::{NameTree, NodeSink, NumberTree};
use super::writer::{DocumentWriter, TrailerInfo};
use super::{names, Array, Dictionary, Name, ObjectId, ObjectReader, ObjectRegistry, PdfReader, PdfString, Resolve, Value};

/// Written to `/Producer` of the document information dictionary
const PRODUCER: &str = concat!("pdf-kernel ", env!("CARGO_PKG_VERSION"));

/// Page attributes that may be inherited from the page tree
pub(crate) const INHERITABLE_PAGE_KEYS: [&str; 4] = [names::RESOURCES, names::MEDIA_BOX, names::CROP_BOX, names::ROTATE];

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document {}", self.0)
    }
}

pub struct Document {
    id: DocumentId,
    registry: ObjectRegistry,
    writer: Option<DocumentWriter>,
    trailer: Dictionary,
    catalog: ObjectId,
    pages_root: ObjectId,
    pages: Vec<ObjectId>,
    name_trees: HashMap<Name, NameTree>,
    number_trees: HashMap<Name, NumberTree>,
    outlines: Option<Outlines>,
    pub(crate) copy_cache: CopyCache,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("objects", &self.registry.size())
            .field("pages", &self.pages.len())
            .field("writable", &self.writer.is_some())
            .finish()
    }
}

impl Document {
    /// New empty document written to `sink` when closed
    pub fn create(sink: impl Write + Send + 'static, props: WriterProperties) -> PdfResult<Self> {
        let writer = DocumentWriter::new(Box::new(sink), props)?;
        let mut registry = ObjectRegistry::new();

        let catalog = registry.create_next();
        let mut pages = Dictionary::with_type(names::PAGES);
        pages.set(names::KIDS, Array::new());
        pages.set(names::COUNT, 0);
        let pages_root = registry.insert(Value::from(pages));
        let mut catalog_dict = Dictionary::with_type(names::CATALOG);
        catalog_dict.set(names::PAGES, pages_root);
        registry.attach(catalog, Value::from(catalog_dict))?;

        let id = DocumentId::next();
        debug!("Created {}", id);
        Ok(Self {
            id,
            registry,
            writer: Some(writer),
            trailer: Dictionary::new(),
            catalog,
            pages_root,
            pages: Vec::new(),
            name_trees: HashMap::new(),
            number_trees: HashMap::new(),
            outlines: None,
            copy_cache: CopyCache::default(),
        })
    }

    /// Read-only document; objects are read from `reader` on first access
    pub fn open(reader: impl ObjectReader + 'static) -> PdfResult<Self> {
        Self::from_reader(Box::new(reader), None)
    }

    /// Read-only document over a complete file in memory
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> PdfResult<Self> {
        Self::open(PdfReader::new(data)?)
    }

    /// Document read from `reader` and rewritten in full to `sink`
    pub fn stamp(reader: impl ObjectReader + 'static, sink: impl Write + Send + 'static, props: WriterProperties) -> PdfResult<Self> {
        let writer = DocumentWriter::new(Box::new(sink), props)?;
        Self::from_reader(Box::new(reader), Some(writer))
    }

    fn from_reader(reader: Box<dyn ObjectReader>, writer: Option<DocumentWriter>) -> PdfResult<Self> {
        let trailer = reader.trailer().clone();
        let registry = ObjectRegistry::with_reader(reader);

        let catalog = trailer
            .get_reference(names::ROOT)
            .ok_or_else(|| PdfError::malformed("Trailer has no /Root"))?;
        let pages_root = registry
            .load(catalog)?
            .and_then(Value::as_dict)
            .ok_or_else(|| PdfError::malformed(format!("Catalog {} is not a dictionary", catalog)))?
            .get_reference(names::PAGES)
            .ok_or(PdfError::MissingDictionaryEntry(names::PAGES.to_string()))?;
        let pages = collect_pages(&registry, pages_root)?;

        let id = DocumentId::next();
        debug!("Opened {} with {} pages{}", id, pages.len(), if writer.is_some() { " for stamping" } else { "" });
        Ok(Self {
            id,
            registry,
            writer,
            trailer,
            catalog,
            pages_root,
            pages,
            name_trees: HashMap::new(),
            number_trees: HashMap::new(),
            outlines: None,
            copy_cache: CopyCache::default(),
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Whether the document has a writer and can mint references
    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn writer_properties(&self) -> Option<&WriterProperties> {
        self.writer.as_ref().map(DocumentWriter::properties)
    }

    pub fn reader(&self) -> Option<&dyn ObjectReader> {
        self.registry.reader()
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Trailer of the file the document was read from
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn catalog_id(&self) -> ObjectId {
        self.catalog
    }

    pub fn catalog(&self) -> PdfResult<&Dictionary> {
        self.registry
            .load(self.catalog)?
            .ok_or(PdfError::ObjectNotFound(self.catalog))?
            .expect_dict()
    }

    pub fn catalog_mut(&mut self) -> PdfResult<&mut Dictionary> {
        self.registry.get_mut(self.catalog)?.expect_dict_mut()
    }

    fn require_writer(&self, operation: &str) -> PdfResult<()> {
        if self.writer.is_none() {
            return Err(PdfError::no_writer(operation));
        }
        Ok(())
    }

    /// Object behind `id`, read on first access
    pub fn get(&self, id: ObjectId) -> PdfResult<Option<&Value>> {
        self.registry.load(id)
    }

    /// Mutable access to the object behind `id`
    pub fn get_mut(&mut self, id: ObjectId) -> PdfResult<&mut Value> {
        self.registry.get_mut(id)
    }

    /// See [`ObjectRegistry::resolve`]
    pub fn resolve(&self, id: ObjectId, recursive: bool) -> PdfResult<Value> {
        self.registry.resolve(id, recursive)
    }

    /// Allocate a reference to be filled in later with
    /// [`make_indirect_at`](Self::make_indirect_at)
    pub fn create_next_reference(&mut self) -> PdfResult<ObjectId> {
        self.require_writer("create_next_reference")?;
        Ok(self.registry.create_next())
    }

    /// Store `value` as a new indirect object
    pub fn make_indirect(&mut self, value: impl Into<Value>) -> PdfResult<ObjectId> {
        self.require_writer("make_indirect")?;
        Ok(self.registry.insert(value.into()))
    }

    /// Store `value` under a reference from
    /// [`create_next_reference`](Self::create_next_reference), or replace
    /// the object behind `id`. Flushed objects cannot be replaced.
    pub fn make_indirect_at(&mut self, id: ObjectId, value: impl Into<Value>) -> PdfResult<()> {
        self.require_writer("make_indirect_at")?;
        self.registry.attach(id, value.into())
    }

    /// Release the object behind `id`. Its slot is reused later; writing a
    /// reference to it fails.
    pub fn free(&mut self, id: ObjectId) -> PdfResult<()> {
        self.registry.free(id)
    }

    /// Write the object now and drop its value
    pub fn flush(&mut self, id: ObjectId) -> PdfResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| PdfError::no_writer("flush"))?;
        writer.flush_object(&mut self.registry, id)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page `number`, counting from 1
    pub fn page(&self, number: usize) -> Option<ObjectId> {
        number.checked_sub(1).and_then(|index| self.pages.get(index)).copied()
    }

    pub fn pages(&self) -> &[ObjectId] {
        &self.pages
    }

    /// Number of the page `id`, counting from 1
    pub fn page_number(&self, id: ObjectId) -> Option<usize> {
        self.pages.iter().position(|&page| page == id).map(|index| index + 1)
    }

    /// Append `page` to the page tree
    pub fn add_page(&mut self, mut page: Dictionary) -> PdfResult<ObjectId> {
        page.set(names::TYPE, names::PAGE);
        page.set(names::PARENT, self.pages_root);
        let id = self.make_indirect(page)?;
        self.append_page(id)?;
        Ok(id)
    }

    /// Append an empty page of the given size
    pub fn add_new_page(&mut self, media_box: [f64; 4]) -> PdfResult<ObjectId> {
        let mut page = Dictionary::new();
        page.set(names::MEDIA_BOX, Array::from_numbers(&media_box));
        page.set(names::RESOURCES, Dictionary::new());
        self.add_page(page)
    }

    /// Hook the indirect page `id` into the root of the page tree
    pub(crate) fn append_page(&mut self, id: ObjectId) -> PdfResult<()> {
        let count = self.pages.len() + 1;
        let root = self.registry.get_mut(self.pages_root)?.expect_dict_mut()?;
        root.set(names::COUNT, count);
        let kids_ref = root.get_reference(names::KIDS);
        match kids_ref {
            Some(kids) => {
                self.registry
                    .get_mut(kids)?
                    .as_array_mut()
                    .ok_or_else(|| PdfError::invalid_type("array", "object"))?
                    .push(id);
            }
            None => match root.get_mut(names::KIDS) {
                Some(Value::Array(kids)) => kids.push(id),
                _ => {
                    root.set(names::KIDS, vec![Value::Reference(id)]);
                }
            },
        }
        if let Some(page) = self.registry.get_mut(id)?.as_dict_mut() {
            page.set(names::PARENT, self.pages_root);
        }
        self.pages.push(id);
        trace!("Appended page {} as number {}", id, count);
        Ok(())
    }

    /// Value of `key` on the page or the nearest page tree ancestor
    pub fn inherited_attribute(&self, page: ObjectId, key: &str) -> PdfResult<Option<Value>> {
        let mut visited = HashSet::new();
        let mut current = Some(page);
        while let Some(id) = current {
            if !visited.insert(id) {
                warn!("Page tree loop at {}", id);
                break;
            }
            let Some(node) = self.get(id)?.and_then(Value::as_dict) else {
                break;
            };
            if let Some(value) = node.get(key) {
                return Ok(Some(value.clone()));
            }
            current = node.get_reference(names::PARENT);
        }
        Ok(None)
    }

    /// Name tree `tree_type` (`Dests`, `EmbeddedFiles`, ...), loaded on
    /// first use and written back on close when modified
    pub fn name_tree(&mut self, tree_type: &str) -> PdfResult<&mut NameTree> {
        if !self.name_trees.contains_key(tree_type) {
            let tree = NameTree::load(tree_type, self.catalog()?, self);
            self.name_trees.insert(Name::new(tree_type), tree);
        }
        self.name_trees
            .get_mut(tree_type)
            .ok_or_else(|| PdfError::malformed(format!("Name tree {} vanished", tree_type)))
    }

    /// Current state of a name tree without caching it
    pub fn read_name_tree(&self, tree_type: &str) -> PdfResult<NameTree> {
        match self.name_trees.get(tree_type) {
            Some(tree) => Ok(tree.clone()),
            None => Ok(NameTree::load(tree_type, self.catalog()?, self)),
        }
    }

    /// Number tree stored under catalog `key`, e.g. `PageLabels`
    pub fn number_tree(&mut self, key: &str) -> PdfResult<&mut NumberTree> {
        if !self.number_trees.contains_key(key) {
            let tree = match self.catalog()?.direct_dict(key, self) {
                Some(root) => NumberTree::load(root, self),
                None => NumberTree::new(),
            };
            self.number_trees.insert(Name::new(key), tree);
        }
        self.number_trees
            .get_mut(key)
            .ok_or_else(|| PdfError::malformed(format!("Number tree {} vanished", key)))
    }

    /// Document outline, parsed on first use
    pub fn outlines(&mut self) -> PdfResult<&mut Outlines> {
        if self.outlines.is_none() {
            let outlines = Outlines::load(self.catalog()?, self);
            self.outlines = Some(outlines);
        }
        self.outlines
            .as_mut()
            .ok_or_else(|| PdfError::malformed("Outline vanished"))
    }

    /// Current state of the outline without caching it
    pub fn read_outlines(&self) -> PdfResult<Outlines> {
        match &self.outlines {
            Some(outlines) => Ok(outlines.clone()),
            None => Ok(Outlines::load(self.catalog()?, self)),
        }
    }

    /// Finish the document. Writable documents write the outline and the
    /// modified trees, every object not yet flushed, then the
    /// cross-reference section and trailer.
    pub fn close(mut self) -> PdfResult<()> {
        if self.writer.is_none() {
            debug!("Closed read-only {}", self.id);
            return Ok(());
        }

        self.write_outlines()?;
        self.write_name_trees()?;
        self.write_number_trees()?;
        self.release_structural_objects()?;
        let info = self.prepare_info()?;
        let encrypt = self.prepare_encryption()?;
        self.flush_all()?;

        let file_id = self.file_id();
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer.finish(&mut self.registry, TrailerInfo {
            root: Some(self.catalog),
            info,
            encrypt,
            file_id: Some(file_id),
        })?;
        debug!("Closed {} with {} objects", self.id, self.registry.size() - 1);
        Ok(())
    }

    fn write_outlines(&mut self) -> PdfResult<()> {
        let Some(outlines) = self.outlines.take() else {
            return Ok(());
        };
        if !outlines.is_modified() {
            return Ok(());
        }

        let registry = &mut self.registry;
        let objects = outlines.to_objects(|| registry.create_next());
        for id in objects.released {
            if self.registry.reference(id).map_or(false, |r| !r.is_free() && !r.is_flushed()) {
                self.registry.free(id)?;
            }
        }
        for (id, dict) in objects.objects {
            self.registry.attach(id, Value::from(dict))?;
        }
        let catalog = self.catalog_mut()?;
        match objects.root {
            Some(root) => {
                catalog.set(names::OUTLINES, root);
            }
            None => {
                catalog.remove(names::OUTLINES);
            }
        }
        Ok(())
    }

    fn write_name_trees(&mut self) -> PdfResult<()> {
        let mut trees: Vec<(Name, NameTree)> = std::mem::take(&mut self.name_trees).into_iter().collect();
        trees.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, tree) in trees {
            if !tree.is_modified() {
                continue;
            }
            if tree.is_empty() {
                if let Some(names_dict) = self.names_dictionary(false)? {
                    names_dict.remove(key.as_str());
                }
            } else {
                let root = tree.build_tree(self)?;
                let root = self.make_indirect(root)?;
                if let Some(names_dict) = self.names_dictionary(true)? {
                    names_dict.set(key.clone(), root);
                }
            }
            if key == names::DESTS {
                self.catalog_mut()?.remove(names::DESTS);
            }
            debug!("Wrote name tree {} with {} entries", key, tree.len());
        }
        Ok(())
    }

    /// Catalog `/Names` dictionary, created on demand
    fn names_dictionary(&mut self, create: bool) -> PdfResult<Option<&mut Dictionary>> {
        let entry = self.catalog()?.get(names::NAMES).map(Value::as_reference);
        match entry {
            Some(Some(id)) => Ok(self.registry.get_mut(id)?.as_dict_mut()),
            Some(None) => Ok(self.catalog_mut()?.get_dict_mut(names::NAMES)),
            None if create => {
                let catalog = self.catalog_mut()?;
                catalog.set(names::NAMES, Dictionary::new());
                Ok(catalog.get_dict_mut(names::NAMES))
            }
            None => Ok(None),
        }
    }

    fn write_number_trees(&mut self) -> PdfResult<()> {
        let trees = std::mem::take(&mut self.number_trees);
        for (key, tree) in trees {
            if !tree.is_modified() {
                continue;
            }
            if tree.is_empty() {
                self.catalog_mut()?.remove(key.as_str());
            } else {
                let root = tree.build_tree(self)?;
                let root = self.make_indirect(root)?;
                self.catalog_mut()?.set(key.clone(), root);
            }
        }
        Ok(())
    }

    /// Object and cross-reference streams of the source file are not
    /// copied to the output, nor is its encryption dictionary
    fn release_structural_objects(&mut self) -> PdfResult<()> {
        let structural = match self.registry.reader() {
            Some(reader) => reader.structural_objects(),
            None => return Ok(()),
        };
        for id in structural {
            if self.registry.reference(id).map_or(false, |r| !r.is_free()) {
                self.registry.mark_original_object_stream(id)?;
            }
        }
        if let Some(id) = self.trailer.get_reference("Encrypt") {
            if self.registry.reference(id).map_or(false, |r| !r.is_free()) {
                self.registry.free(id)?;
            }
        }
        Ok(())
    }

    fn prepare_info(&mut self) -> PdfResult<Option<ObjectId>> {
        let producer = PdfString::from_text(PRODUCER);
        if let Some(id) = self.trailer.get_reference(names::INFO) {
            if self.registry.load(id)?.map_or(false, Value::is_dictionary) {
                self.registry.get_mut(id)?.expect_dict_mut()?.set("Producer", producer);
                return Ok(Some(id));
            }
        }
        let mut info = Dictionary::new();
        info.set("Producer", producer);
        Ok(Some(self.registry.insert(Value::from(info))))
    }

    fn prepare_encryption(&mut self) -> PdfResult<Option<ObjectId>> {
        let Some(encryptor) = self.writer_properties().and_then(|props| props.encryptor.clone()) else {
            return Ok(None);
        };
        let id = self.registry.insert(Value::from(encryptor.encryption_dictionary()));
        if let Some(writer) = self.writer.as_mut() {
            writer.set_encrypt_dictionary(id);
        }
        Ok(Some(id))
    }

    fn flush_all(&mut self) -> PdfResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| PdfError::no_writer("close"))?;
        let mut number = 1;
        while number < self.registry.size() {
            let pending = self
                .registry
                .slot(number)
                .filter(|r| !r.is_free() && !r.is_flushed())
                .map(|r| r.id());
            if let Some(id) = pending {
                writer.flush_object(&mut self.registry, id)?;
            }
            number += 1;
        }
        Ok(())
    }

    /// `/ID` pair: the first entry survives from the source file
    fn file_id(&self) -> (Vec<u8>, Vec<u8>) {
        let mut context = md5::Context::new();
        context.consume(self.id.0.to_be_bytes());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        context.consume(nanos.to_be_bytes());
        context.consume(self.registry.size().to_be_bytes());
        let fresh = context.compute().0.to_vec();
        trace!("File id {}", hex::encode(&fresh));

        let original = self
            .trailer
            .get_array(names::ID)
            .and_then(|ids| ids.first())
            .and_then(Value::as_string)
            .map(|s| s.as_bytes().to_vec());
        (original.unwrap_or_else(|| fresh.clone()), fresh)
    }
}

impl Resolve for Document {
    fn lookup(&self, id: ObjectId) -> Option<&Value> {
        self.registry.lookup(id)
    }
}

impl NodeSink for Document {
    fn add_node(&mut self, node: Dictionary) -> PdfResult<ObjectId> {
        self.make_indirect(node)
    }
}

/// Leaves of the page tree below `root`, in document order
fn collect_pages(registry: &ObjectRegistry, root: ObjectId) -> PdfResult<Vec<ObjectId>> {
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            warn!("Page tree node {} is reachable twice, skipping", id);
            continue;
        }
        let Some(node) = registry.load(id)?.and_then(Value::as_dict) else {
            warn!("Page tree node {} is missing", id);
            continue;
        };
        let is_page = node.type_name().map_or(false, |t| t == names::PAGE);
        match node.direct_array(names::KIDS, registry) {
            Some(kids) if !is_page => {
                for kid in kids.iter().rev() {
                    match kid.as_reference() {
                        Some(kid) => stack.push(kid),
                        None => warn!("Ignoring direct page tree kid under {}", id),
                    }
                }
            }
            _ => pages.push(id),
        }
    }
    Ok(pages)
}


#[cfg(test)]
mod tests {
    use super::test_support::{reopened, SharedBuffer};
    use super::*;
    use crate::config::CompressionKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(WriterProperties::default())]
    #[case(WriterProperties::default().with_full_compression(true))]
    #[case(WriterProperties::default().with_compression(CompressionKind::None))]
    fn test_pages_survive_round_trip(#[case] props: WriterProperties) -> PdfResult<()> {
        let (doc, ids) = reopened(props, |doc| {
            let first = doc.add_new_page([0.0, 0.0, 612.0, 792.0])?;
            let second = doc.add_new_page([0.0, 0.0, 595.0, 842.0])?;
            Ok(vec![first, second])
        })?;
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages(), ids.as_slice());
        assert_eq!(doc.page_number(ids[1]), Some(2));
        let media_box = doc.inherited_attribute(ids[1], names::MEDIA_BOX)?.unwrap();
        assert_eq!(media_box.as_array().map(|a| a[2].as_f64()), Some(Some(595.0)));
        assert!(doc.trailer().get_array(names::ID).is_some());
        Ok(())
    }

    #[test_log::test]
    fn test_read_only_documents_cannot_mint_references() -> PdfResult<()> {
        let (mut doc, _) = reopened(WriterProperties::default(), |_| Ok(()))?;
        let err = doc.make_indirect(Value::from(1)).unwrap_err();
        assert!(matches!(err, PdfError::NoWriter(_)));
        assert!(err.is_precondition());
        assert!(doc.flush(doc.catalog_id()).is_err());
        Ok(())
    }

    #[test_log::test]
    fn test_flushed_objects_reject_changes() -> PdfResult<()> {
        let mut doc = Document::create(SharedBuffer::default(), WriterProperties::default())?;
        let id = doc.make_indirect(Dictionary::new())?;
        doc.flush(id)?;
        assert!(matches!(doc.get_mut(id), Err(PdfError::FlushedObject(_))));
        assert!(matches!(doc.make_indirect_at(id, Value::Null), Err(PdfError::FlushedObject(_))));
        assert_eq!(doc.get(id)?, None);
        Ok(())
    }

    #[test_log::test]
    fn test_reference_to_freed_object_fails_on_close() -> PdfResult<()> {
        let mut doc = Document::create(SharedBuffer::default(), WriterProperties::default())?;
        let gone = doc.make_indirect(Value::from(1))?;
        doc.catalog_mut()?.set("Gone", gone);
        doc.free(gone)?;
        assert!(matches!(doc.close(), Err(PdfError::FreedReference(id)) if id == gone));
        Ok(())
    }

    #[test_log::test]
    fn test_failed_flush_leaves_object_in_place() -> PdfResult<()> {
        let output = SharedBuffer::default();
        let mut doc = Document::create(output.clone(), WriterProperties::default())?;
        let gone = doc.make_indirect(Value::from(1))?;
        let mut holder = Dictionary::new();
        holder.set("Gone", gone);
        holder.set("Kept", PdfString::from("still here"));
        let holder = doc.make_indirect(holder)?;
        doc.catalog_mut()?.set("Holder", holder);
        doc.free(gone)?;

        assert!(matches!(doc.flush(holder), Err(PdfError::FreedReference(id)) if id == gone));
        let kept = doc.get_mut(holder)?.expect_dict_mut()?;
        assert_eq!(kept.get_reference("Gone"), Some(gone));
        kept.remove("Gone");
        doc.flush(holder)?;
        doc.close()?;

        let doc = Document::from_bytes(output.bytes())?;
        let holder = doc.catalog()?.direct_dict("Holder", &doc).unwrap();
        assert_eq!(holder.get_string("Kept"), Some(&PdfString::from("still here")));
        Ok(())
    }

    #[test_log::test]
    fn test_inherited_attributes() -> PdfResult<()> {
        let mut doc = Document::create(SharedBuffer::default(), WriterProperties::default())?;
        let page = doc.add_page(Dictionary::new())?;
        let root = doc.catalog()?.get_reference(names::PAGES).unwrap();
        doc.get_mut(root)?.expect_dict_mut()?.set(names::ROTATE, 90);
        assert_eq!(doc.inherited_attribute(page, names::ROTATE)?, Some(Value::from(90)));
        assert_eq!(doc.inherited_attribute(page, names::CROP_BOX)?, None);
        Ok(())
    }

    #[test_log::test]
    fn test_name_tree_written_and_reloaded() -> PdfResult<()> {
        let (mut doc, page) = reopened(WriterProperties::default(), |doc| {
            let page = doc.add_new_page([0.0, 0.0, 100.0, 100.0])?;
            let dests = doc.name_tree(names::DESTS)?;
            for i in 0..45 {
                dests.add_entry(format!("d{:02}", i).as_str(), vec![Value::Reference(page), Value::from(names::FIT)]);
            }
            doc.name_tree(names::JAVA_SCRIPT)?.add_entry("init", PdfString::from("app.alert(1)"));
            Ok(page)
        })?;

        let dests = doc.name_tree(names::DESTS)?;
        assert_eq!(dests.len(), 45);
        let first = dests.get(&PdfString::from("d00")).and_then(Value::as_array).unwrap();
        assert_eq!(first[0], Value::Reference(page));
        assert_eq!(doc.read_name_tree(names::JAVA_SCRIPT)?.len(), 1);
        Ok(())
    }

    #[test_log::test]
    fn test_emptied_tree_and_outline_disappear() -> PdfResult<()> {
        let buffer = SharedBuffer::default();
        let mut doc = Document::create(buffer.clone(), WriterProperties::default())?;
        doc.name_tree(names::EMBEDDED_FILES)?.add_entry("a.txt", 1);
        let outlines = doc.outlines()?;
        let root = outlines.root();
        outlines.add_outline(root, "Only", None);
        doc.close()?;

        let source = buffer.bytes();
        let reader = PdfReader::new(source)?;
        let stamped = SharedBuffer::default();
        let mut doc = Document::stamp(reader, stamped.clone(), WriterProperties::default())?;
        assert_eq!(doc.read_outlines()?.children(root).len(), 1);
        doc.name_tree(names::EMBEDDED_FILES)?.remove_entry(&PdfString::from("a.txt"));
        let outlines = doc.outlines()?;
        let only = outlines.children(root)[0];
        outlines.remove_outline(only);
        doc.close()?;

        let doc = Document::from_bytes(stamped.bytes())?;
        let catalog = doc.catalog()?;
        assert!(!catalog.contains_key(names::OUTLINES));
        let names_dict = catalog.direct_dict(names::NAMES, &doc);
        assert!(names_dict.map_or(true, |d| !d.contains_key(names::EMBEDDED_FILES)));
        Ok(())
    }

    #[test_log::test]
    fn test_page_labels() -> PdfResult<()> {
        let (mut doc, _) = reopened(WriterProperties::default(), |doc| {
            let labels = doc.number_tree(names::PAGE_LABELS)?;
            let mut roman = Dictionary::new();
            roman.set(names::S, "r");
            labels.add_entry(0, roman);
            let mut decimal = Dictionary::new();
            decimal.set(names::S, "D");
            labels.add_entry(4, decimal);
            Ok(())
        })?;
        let labels = doc.number_tree(names::PAGE_LABELS)?;
        assert_eq!(labels.numbers().keys().copied().collect::<Vec<_>>(), vec![0, 4]);
        Ok(())
    }

    #[test_log::test]
    fn test_stamping_keeps_objects_and_info() -> PdfResult<()> {
        let buffer = SharedBuffer::default();
        let mut doc = Document::create(buffer.clone(), WriterProperties::default().with_full_compression(true))?;
        doc.add_new_page([0.0, 0.0, 200.0, 200.0])?;
        doc.close()?;

        let stamped = SharedBuffer::default();
        let mut doc = Document::stamp(PdfReader::new(buffer.bytes())?, stamped.clone(), WriterProperties::default())?;
        doc.add_new_page([0.0, 0.0, 300.0, 300.0])?;
        doc.close()?;

        let doc = Document::from_bytes(stamped.bytes())?;
        assert_eq!(doc.page_count(), 2);
        let info = doc.trailer().get_reference(names::INFO).unwrap();
        let producer = doc.get(info)?.and_then(Value::as_dict).and_then(|d| d.get_string("Producer"));
        assert_eq!(producer.map(PdfString::to_text), Some(PRODUCER.to_string()));
        let reader = doc.reader().unwrap();
        assert!(reader.structural_objects().is_empty());
        Ok(())
    }

    #[test_log::test]
    fn test_document_ids_are_unique() -> PdfResult<()> {
        let a = Document::create(SharedBuffer::default(), WriterProperties::default())?;
        let b = Document::create(SharedBuffer::default(), WriterProperties::default())?;
        assert_ne!(a.id(), b.id());
        Ok(())
    }
}
