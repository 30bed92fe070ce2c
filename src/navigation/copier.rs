//! Copying pages between documents

use std::collections::{HashMap, HashSet};
use log::{debug, trace};
use crate::copy::{CopyEngine, NullCopyFilter};
use crate::error::{PdfError, PdfResult};
use crate::pdf::{names, Dictionary, Document, ObjectId, Resolve, Value, INHERITABLE_PAGE_KEYS};
use crate::tree::NameTree;
use super::outline::{OutlineId, Outlines};
use super::resolver::{
    attach_annotation, is_goto, readdress_destination, Destination, DestinationCopyFilter, DestinationResolver, Readdress,
    ResolutionReport,
};

/// Page entries not taken over by a page copy
pub const PAGE_EXCLUDED_KEYS: [&str; 4] = [names::PARENT, names::ANNOTS, names::STRUCT_PARENTS, names::B];

/// Copies pages of one read-only source document into writable targets.
///
/// Link annotations and GoTo actions found on the copied pages are
/// collected while copying and readdressed by [`finish`](Self::finish),
/// so links may point at pages copied after them.
pub struct PageCopier<'a> {
    source: &'a Document,
    resolver: DestinationResolver,
    page_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCopier<'a> {
    pub fn new(source: &'a Document) -> PdfResult<Self> {
        if source.is_writable() {
            return Err(PdfError::CopyFromWritingDocument(source.catalog_id()));
        }
        Ok(Self {
            source,
            resolver: DestinationResolver::new(),
            page_map: HashMap::new(),
        })
    }

    pub fn resolver(&self) -> &DestinationResolver {
        &self.resolver
    }

    /// Source page to target page
    pub fn page_map(&self) -> &HashMap<ObjectId, ObjectId> {
        &self.page_map
    }

    /// Copy page `number` (counting from 1) to the end of `target`
    pub fn copy_page(&mut self, number: usize, target: &mut Document) -> PdfResult<ObjectId> {
        let source = self.source;
        let page_id = source.page(number).ok_or_else(|| {
            PdfError::invalid_argument(format!("Page {} out of range 1..={}", number, source.page_count()))
        })?;
        let page = source.resolve(page_id, true)?.expect_dict()?.clone();

        let mut links = Vec::new();
        let mut filter = DestinationCopyFilter { resolver: &mut self.resolver };
        let mut engine = CopyEngine::new(source, target, &mut filter)?;

        let copy_id = engine.target().create_next_reference()?;
        engine.target().copy_cache.record(source.id(), page_id, copy_id);
        trace!("Copying page {} ({}) as {}", number, page_id, copy_id);

        let mut copy = match engine.copy_contents(&Value::from(page.clone()), page_id, &PAGE_EXCLUDED_KEYS)? {
            Value::Dictionary(dict) => dict,
            _ => Dictionary::new(),
        };
        for key in INHERITABLE_PAGE_KEYS {
            if page.contains_key(key) {
                continue;
            }
            if let Some(inherited) = source.inherited_attribute(page_id, key)? {
                copy.set(key, engine.copy(&inherited, false)?);
            }
        }
        engine.target().make_indirect_at(copy_id, copy)?;
        engine.target().append_page(copy_id)?;

        let annotations: Vec<Value> = page
            .direct_array(names::ANNOTS, source)
            .map(|annots| annots.iter().cloned().collect())
            .unwrap_or_default();
        for annotation in annotations {
            let Some(dict) = source.direct(&annotation).as_dict() else {
                continue;
            };
            if let Some(destination) = link_destination(dict, source) {
                links.push((destination, annotation));
                continue;
            }
            let copied = engine.copy_excluding(&annotation, &[names::P, names::PARENT], true)?;
            let id = match copied {
                Value::Reference(id) => id,
                Value::Null => continue,
                other => engine.target().make_indirect(other)?,
            };
            attach_annotation(engine.target(), id, copy_id)?;
        }
        drop(engine);

        for (destination, annotation) in links {
            self.resolver
                .store_destination_to_readdress(destination, Readdress::Link { annotation, page: copy_id });
        }
        self.page_map.insert(page_id, copy_id);
        Ok(copy_id)
    }

    /// Copy pages `numbers` in the order given
    pub fn copy_pages(&mut self, numbers: impl IntoIterator<Item = usize>, target: &mut Document) -> PdfResult<Vec<ObjectId>> {
        numbers.into_iter().map(|number| self.copy_page(number, target)).collect()
    }

    /// Readdress the collected destinations and, with `copy_outlines`,
    /// append the outline items that lead to copied pages to the outline
    /// of `target`
    pub fn finish(mut self, target: &mut Document, copy_outlines: bool) -> PdfResult<ResolutionReport> {
        let dests = self.source.read_name_tree(names::DESTS)?;
        let report = self.resolver.drain(self.source, target, &self.page_map, &dests)?;
        if copy_outlines {
            self.copy_outlines(target, &dests)?;
        }
        debug!(
            "Copied {} pages from {}: {} destinations readdressed, {} dropped",
            self.page_map.len(),
            self.source.id(),
            report.resolved,
            report.dropped
        );
        Ok(report)
    }

    fn copy_outlines(&self, target: &mut Document, dests: &NameTree) -> PdfResult<()> {
        let outlines = self.source.read_outlines()?;
        let mut kept = HashSet::new();
        self.mark_kept(&outlines, outlines.root(), dests, &mut kept);
        if kept.is_empty() {
            return Ok(());
        }
        let target_root = target.outlines()?.root();
        self.copy_outline_children(&outlines, outlines.root(), target_root, &kept, target, dests)
    }

    /// Whether `id` or one of its descendants leads to a copied page
    fn mark_kept(&self, outlines: &Outlines, id: OutlineId, dests: &NameTree, kept: &mut HashSet<OutlineId>) -> bool {
        let mut keep = self
            .outline_destination(outlines, id)
            .and_then(|destination| destination.page(self.source, dests))
            .map_or(false, |page| self.page_map.contains_key(&page));
        for &child in outlines.children(id) {
            keep |= self.mark_kept(outlines, child, dests, kept);
        }
        if keep && id != outlines.root() {
            kept.insert(id);
        }
        keep
    }

    fn outline_destination(&self, outlines: &Outlines, id: OutlineId) -> Option<Destination> {
        if let Some(destination) = outlines.destination(id) {
            return Destination::from_value(destination, self.source);
        }
        let action = self.source.direct(outlines.action(id)?).as_dict()?;
        Destination::of_action(action, self.source)
    }

    fn copy_outline_children(
        &self,
        outlines: &Outlines,
        parent: OutlineId,
        target_parent: OutlineId,
        kept: &HashSet<OutlineId>,
        target: &mut Document,
        dests: &NameTree,
    ) -> PdfResult<()> {
        for &child in outlines.children(parent) {
            if !kept.contains(&child) {
                continue;
            }
            let destination = match outlines.destination(child).and_then(|d| Destination::from_value(d, self.source)) {
                Some(destination) => readdress_destination(&destination, self.source, target, &self.page_map, dests)?,
                None => None,
            };
            let action = match outlines.action(child) {
                Some(action) => self.copy_outline_action(action, target, dests)?,
                None => None,
            };

            let target_outlines = target.outlines()?;
            let node = target_outlines.add_outline(target_parent, outlines.title(child), None);
            target_outlines.set_open(node, outlines.is_open(child));
            if let Some(color) = outlines.color(child) {
                target_outlines.set_color(node, color);
            }
            if let Some(style) = outlines.style(child) {
                target_outlines.set_style(node, style);
            }
            if let Some(destination) = destination {
                target_outlines.add_destination(node, destination);
            }
            if let Some(action) = action {
                target_outlines.add_action(node, action);
            }
            self.copy_outline_children(outlines, child, node, kept, target, dests)?;
        }
        Ok(())
    }

    /// GoTo actions are readdressed and dropped when their page was not
    /// copied; other actions are copied as they are
    fn copy_outline_action(&self, action: &Value, target: &mut Document, dests: &NameTree) -> PdfResult<Option<Value>> {
        let mut filter = NullCopyFilter;
        let goto = self.source.direct(action).as_dict().filter(|dict| is_goto(dict));
        let Some(goto) = goto else {
            return Ok(Some(CopyEngine::new(self.source, target, &mut filter)?.copy(action, true)?));
        };
        let Some(destination) = Destination::of_action(goto, self.source) else {
            return Ok(None);
        };
        let Some(readdressed) = readdress_destination(&destination, self.source, target, &self.page_map, dests)? else {
            return Ok(None);
        };
        let mut copy = CopyEngine::new(self.source, target, &mut filter)?.copy_excluding(&Value::from(goto.clone()), &[names::D], true)?;
        copy.expect_dict_mut()?.set(names::D, readdressed);
        Ok(Some(copy))
    }
}

/// Destination of a link annotation, from `/Dest` or a GoTo `/A`
fn link_destination(annotation: &Dictionary, source: &Document) -> Option<Destination> {
    if annotation.get_name(names::SUBTYPE).map_or(true, |subtype| subtype != names::LINK) {
        return None;
    }
    if let Some(destination) = annotation.get(names::DEST) {
        return Destination::from_value(destination, source);
    }
    Destination::of_action(annotation.direct_dict(names::A, source)?, source)
}

impl Document {
    /// Copy pages `numbers` (counting from 1) to the end of `target`,
    /// readdressing links between them. With `copy_outlines` the outline
    /// items leading to the copied pages are copied as well.
    pub fn copy_pages_to(
        &self,
        numbers: impl IntoIterator<Item = usize>,
        target: &mut Document,
        copy_outlines: bool,
    ) -> PdfResult<Vec<ObjectId>> {
        let mut copier = PageCopier::new(self)?;
        let pages = copier.copy_pages(numbers, target)?;
        copier.finish(target, copy_outlines)?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use crate::config::WriterProperties;
    use crate::pdf::test_support::reopened;
    use crate::pdf::{Array, PdfString};
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn link_to(page: ObjectId) -> Dictionary {
        let mut link = Dictionary::with_type("Annot");
        link.set(names::SUBTYPE, names::LINK);
        link.set(names::DEST, vec![Value::Reference(page), Value::from(names::FIT)]);
        link
    }

    /// Three pages; page 1 links to page 3 and carries a text note
    fn linked_source() -> PdfResult<(Document, Vec<ObjectId>)> {
        reopened(WriterProperties::default(), |doc| {
            let pages = (0..3)
                .map(|_| doc.add_new_page([0.0, 0.0, 100.0, 100.0]))
                .collect::<PdfResult<Vec<_>>>()?;
            let link = doc.make_indirect(link_to(pages[2]))?;
            let mut note = Dictionary::with_type("Annot");
            note.set(names::SUBTYPE, "Text");
            note.set(names::CONTENTS, PdfString::from("note"));
            note.set(names::P, pages[0]);
            let note = doc.make_indirect(note)?;
            doc.get_mut(pages[0])?
                .expect_dict_mut()?
                .set(names::ANNOTS, vec![Value::Reference(link), Value::Reference(note)]);
            Ok(pages)
        })
    }

    fn annots(doc: &Document, page: ObjectId) -> PdfResult<Vec<ObjectId>> {
        Ok(doc
            .get(page)?
            .and_then(Value::as_dict)
            .and_then(|d| d.get_array(names::ANNOTS))
            .map(|a| a.iter().filter_map(Value::as_reference).collect())
            .unwrap_or_default())
    }

    #[test]
    fn test_forward_link_is_readdressed() -> PdfResult<()> {
        let (source, _) = linked_source()?;
        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let mut copier = PageCopier::new(&source)?;
        let first = copier.copy_page(1, &mut target)?;
        assert_eq!(copier.resolver().len(), 1);
        let third = copier.copy_page(3, &mut target)?;
        let report = copier.finish(&mut target, false)?;
        assert_eq!(report, ResolutionReport { resolved: 1, dropped: 0 });

        let annotations = annots(&target, first)?;
        assert_eq!(annotations.len(), 2);
        let link = annotations
            .iter()
            .filter_map(|&id| target.get(id).ok().flatten().and_then(Value::as_dict))
            .find(|d| d.get_name(names::SUBTYPE).map_or(false, |s| s == names::LINK))
            .unwrap();
        assert_eq!(link.get_array(names::DEST).unwrap()[0], Value::Reference(third));
        assert_eq!(link.get_reference(names::P), Some(first));
        Ok(())
    }

    #[test]
    fn test_link_to_missing_page_is_dropped() -> PdfResult<()> {
        let (source, _) = linked_source()?;
        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let pages = source.copy_pages_to([1], &mut target, false)?;
        let annotations = annots(&target, pages[0])?;
        assert_eq!(annotations.len(), 1);
        let note = target.get(annotations[0])?.and_then(Value::as_dict).unwrap();
        assert_eq!(note.get_reference(names::P), Some(pages[0]));
        Ok(())
    }

    #[test]
    fn test_inherited_attributes_are_materialised() -> PdfResult<()> {
        let (source, page) = reopened(WriterProperties::default(), |doc| {
            let root = doc.catalog()?.get_reference(names::PAGES).unwrap();
            doc.get_mut(root)?.expect_dict_mut()?.set(names::ROTATE, 90);
            doc.add_page(Dictionary::new())
        })?;
        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let copied = source.copy_pages_to([1], &mut target, false)?;
        let dict = target.get(copied[0])?.and_then(Value::as_dict).unwrap();
        assert_eq!(dict.get_i64(names::ROTATE), Some(90));
        assert!(!dict.contains_key(names::ANNOTS));
        assert_eq!(target.page_number(copied[0]), Some(1));
        assert!(source.page_number(page).is_some());
        Ok(())
    }

    #[test]
    fn test_named_destination_moves_to_target_tree() -> PdfResult<()> {
        let (source, _) = reopened(WriterProperties::default(), |doc| {
            let first = doc.add_new_page([0.0, 0.0, 10.0, 10.0])?;
            let second = doc.add_new_page([0.0, 0.0, 10.0, 10.0])?;
            doc.name_tree(names::DESTS)?
                .add_entry("end", vec![Value::Reference(second), Value::from(names::FIT)]);
            let mut link = Dictionary::with_type("Annot");
            link.set(names::SUBTYPE, names::LINK);
            let mut action = Dictionary::new();
            action.set(names::S, names::GOTO);
            action.set(names::D, PdfString::from("end"));
            link.set(names::A, action);
            let link = doc.make_indirect(link)?;
            doc.get_mut(first)?.expect_dict_mut()?.set(names::ANNOTS, vec![Value::Reference(link)]);
            Ok(())
        })?;

        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let pages = source.copy_pages_to([1, 2], &mut target, false)?;
        let dests = target.name_tree(names::DESTS)?;
        let end = dests.get(&PdfString::from("end")).and_then(Value::as_array).unwrap();
        assert_eq!(end[0], Value::Reference(pages[1]));

        let link = annots(&target, pages[0])?[0];
        let action = target.get(link)?.and_then(Value::as_dict).and_then(|d| d.get_dict(names::A)).unwrap();
        assert_eq!(action.get_string(names::D), Some(&PdfString::from("end")));
        Ok(())
    }

    #[test]
    fn test_outline_follows_copied_pages() -> PdfResult<()> {
        let (source, _) = reopened(WriterProperties::default(), |doc| {
            let first = doc.add_new_page([0.0, 0.0, 10.0, 10.0])?;
            let second = doc.add_new_page([0.0, 0.0, 10.0, 10.0])?;
            let outlines = doc.outlines()?;
            let root = outlines.root();
            let one = outlines.add_outline(root, "One", None);
            outlines.add_destination(one, vec![Value::Reference(first), Value::from(names::FIT)]);
            let two = outlines.add_outline(root, "Two", None);
            outlines.add_destination(two, vec![Value::Reference(second), Value::from(names::FIT)]);
            outlines.set_color(two, [1.0, 0.0, 0.0]);
            Ok(())
        })?;

        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let pages = source.copy_pages_to([2], &mut target, true)?;
        let outlines = target.outlines()?;
        let root = outlines.root();
        let children = outlines.children(root).to_vec();
        assert_eq!(children.len(), 1);
        assert_eq!(outlines.title(children[0]), "Two");
        assert_eq!(outlines.color(children[0]), Some([1.0, 0.0, 0.0]));
        let destination = outlines.destination(children[0]).and_then(Value::as_array).unwrap();
        assert_eq!(destination, &Array::from(vec![Value::Reference(pages[0]), Value::from(names::FIT)]));
        Ok(())
    }

    #[test]
    fn test_page_out_of_range() -> PdfResult<()> {
        let (source, _) = linked_source()?;
        let mut target = Document::create(io::sink(), WriterProperties::default())?;
        let err = PageCopier::new(&source)?.copy_page(4, &mut target).unwrap_err();
        assert!(matches!(err, PdfError::InvalidArgument(_)));
        Ok(())
    }
}
