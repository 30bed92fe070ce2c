//! Destinations that must be readdressed once the pages they point at
//! have been copied

use std::collections::HashMap;
use log::{debug, trace};
use crate::copy::{CopyEngine, CopyFilter, CopySite, NullCopyFilter, Segment};
use crate::error::PdfResult;
use crate::pdf::{names, Array, Dictionary, Document, Name, ObjectId, PdfString, Resolve, Value};
use crate::tree::NameTree;

/// Target of a link, GoTo action or outline item
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// `[page /Fit]`, `[page /XYZ left top zoom]`, ... where `page` is a
    /// page reference or a zero-based page index
    Explicit(Array),
    /// Key into the `Dests` name tree
    Named(PdfString),
}

impl Destination {
    /// Destination held by `value`: an array, a name or string, or a
    /// dictionary with `/D`
    pub fn from_value<R: Resolve + ?Sized>(value: &Value, resolver: &R) -> Option<Self> {
        let value = match resolver.direct(value) {
            Value::Dictionary(dict) => resolver.direct(dict.get(names::D)?),
            other => other,
        };
        match value {
            Value::Array(array) => Some(Self::Explicit(array.clone())),
            Value::String(name) => Some(Self::Named(name.clone())),
            Value::Name(name) => Some(Self::Named(PdfString::from(name.as_str()))),
            _ => None,
        }
    }

    /// Destination of a GoTo action
    pub fn of_action<R: Resolve + ?Sized>(action: &Dictionary, resolver: &R) -> Option<Self> {
        if !is_goto(action) {
            return None;
        }
        Self::from_value(action.get(names::D)?, resolver)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Explicit(array) => Value::Array(array.clone()),
            Self::Named(name) => Value::String(name.clone()),
        }
    }

    /// Page the destination points at in `source`
    pub fn page(&self, source: &Document, dests: &NameTree) -> Option<ObjectId> {
        match self {
            Self::Explicit(array) => explicit_page(array, source),
            Self::Named(name) => {
                let array = source.direct(dests.get(name)?).as_array()?;
                explicit_page(array, source)
            }
        }
    }
}

pub(crate) fn is_goto(action: &Dictionary) -> bool {
    action.get_name(names::S).map_or(false, |s| s == names::GOTO)
}

fn explicit_page(array: &Array, source: &Document) -> Option<ObjectId> {
    match source.direct(array.first()?) {
        Value::Number(index) if index.is_integer() => {
            let index = usize::try_from(index.as_i64()).ok()?;
            source.page(index + 1)
        }
        _ => array.first()?.as_reference(),
    }
}

/// Where a rewritten destination goes in the target document
#[derive(Debug, Clone, PartialEq)]
pub enum Readdress {
    /// Entry `key` left out while copying the source object `anchor`; it is
    /// set in the copy, in the container reached through `path`. `action`
    /// holds the GoTo action when the entry is an action rather than a
    /// bare destination.
    Entry {
        anchor: ObjectId,
        path: Vec<Segment>,
        key: Name,
        action: Option<Value>,
    },
    /// Link annotation of a source page; copied and attached to `page` of
    /// the target once its destination is known
    Link { annotation: Value, page: ObjectId },
}

/// A destination waiting for the page map to be complete
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDestination {
    pub destination: Destination,
    pub readdress: Readdress,
}

/// Outcome of draining a [`DestinationResolver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub dropped: usize,
}

/// Destinations collected while copying pages from one source document.
///
/// Copying happens in two phases: pages are copied first while the
/// destinations found on them are stored here, then [`drain`] rewrites
/// every destination against the completed page map. Destinations whose
/// page was not copied are dropped.
///
/// [`drain`]: DestinationResolver::drain
#[derive(Debug, Clone, Default)]
pub struct DestinationResolver {
    pending: Vec<PendingDestination>,
}

impl DestinationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_destination_to_readdress(&mut self, destination: Destination, readdress: Readdress) {
        trace!("Deferring destination {:?}", destination);
        self.pending.push(PendingDestination { destination, readdress });
    }

    pub fn pending(&self) -> &[PendingDestination] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Rewrite every pending destination. `page_map` maps source pages to
    /// their copies in `target`; `dests` is the `Dests` tree of `source`.
    pub fn drain(
        &mut self,
        source: &Document,
        target: &mut Document,
        page_map: &HashMap<ObjectId, ObjectId>,
        dests: &NameTree,
    ) -> PdfResult<ResolutionReport> {
        let mut report = ResolutionReport::default();
        for pending in std::mem::take(&mut self.pending) {
            let resolved = match readdress_destination(&pending.destination, source, target, page_map, dests)? {
                Some(destination) => apply(pending.readdress, destination, source, target)?,
                None => false,
            };
            if resolved {
                report.resolved += 1;
            } else {
                debug!("Dropping destination {:?}, its page was not copied", pending.destination);
                report.dropped += 1;
            }
        }
        Ok(report)
    }
}

/// `destination` pointed at the copy of its page, or `None` when the page
/// was not copied. Named destinations keep their name and get an entry in
/// the `Dests` tree of `target`.
pub(crate) fn readdress_destination(
    destination: &Destination,
    source: &Document,
    target: &mut Document,
    page_map: &HashMap<ObjectId, ObjectId>,
    dests: &NameTree,
) -> PdfResult<Option<Value>> {
    match destination {
        Destination::Explicit(array) => Ok(rewrite_explicit(array, source, page_map).map(Value::Array)),
        Destination::Named(name) => {
            let Some(array) = dests.get(name).and_then(|value| source.direct(value).as_array()) else {
                return Ok(None);
            };
            let Some(rewritten) = rewrite_explicit(array, source, page_map) else {
                return Ok(None);
            };
            let target_dests = target.name_tree(names::DESTS)?;
            if target_dests.get(name).is_none() {
                target_dests.add_entry(name.clone(), rewritten);
            }
            Ok(Some(Value::String(name.clone())))
        }
    }
}

fn rewrite_explicit(array: &Array, source: &Document, page_map: &HashMap<ObjectId, ObjectId>) -> Option<Array> {
    let page = page_map.get(&explicit_page(array, source)?)?;
    let mut rewritten = Array::new();
    rewritten.push(*page);
    for item in array.iter().skip(1) {
        rewritten.push(source.direct(item).clone());
    }
    Some(rewritten)
}

fn apply(readdress: Readdress, destination: Value, source: &Document, target: &mut Document) -> PdfResult<bool> {
    match readdress {
        Readdress::Entry { anchor, path, key, action } => {
            let Some(copy) = target.copy_cache.copy_of(source.id(), anchor) else {
                return Ok(false);
            };
            let replacement = match action {
                Some(action) => copy_action(&action, destination, source, target)?,
                None => destination,
            };
            let Some(container) = container_mut(target.get_mut(copy)?, &path) else {
                return Ok(false);
            };
            container.set(key, replacement);
            Ok(true)
        }
        Readdress::Link { annotation, page } => {
            let Some(original) = source.direct(&annotation).as_dict() else {
                return Ok(false);
            };
            let goto = original
                .direct_dict(names::A, source)
                .filter(|action| is_goto(action))
                .is_some();

            let mut filter = NullCopyFilter;
            let copy = CopyEngine::new(source, target, &mut filter)?.copy_excluding(
                &annotation,
                &[names::DEST, names::A, names::P, names::PARENT],
                true,
            )?;
            let id = match copy {
                Value::Reference(id) => id,
                Value::Null => return Ok(false),
                other => target.make_indirect(other)?,
            };
            let entry = match original.get(names::A).filter(|_| goto) {
                Some(action) => (names::A, copy_action(action, destination, source, target)?),
                None => (names::DEST, destination),
            };
            target.get_mut(id)?.expect_dict_mut()?.set(entry.0, entry.1);
            attach_annotation(target, id, page)?;
            Ok(true)
        }
    }
}

/// Copy of the GoTo `action` with `/D` replaced by `destination`
fn copy_action(action: &Value, destination: Value, source: &Document, target: &mut Document) -> PdfResult<Value> {
    let mut filter = NullCopyFilter;
    let mut copy = CopyEngine::new(source, target, &mut filter)?.copy_excluding(action, &[names::D], true)?;
    match &mut copy {
        Value::Reference(id) => {
            target.get_mut(*id)?.expect_dict_mut()?.set(names::D, destination);
        }
        other => {
            other.expect_dict_mut()?.set(names::D, destination);
        }
    }
    Ok(copy)
}

fn container_mut<'a>(value: &'a mut Value, path: &[Segment]) -> Option<&'a mut Dictionary> {
    let mut current = value;
    for segment in path {
        current = match segment {
            Segment::Key(key) => current.dictionary_view_mut()?.get_mut(key.as_str())?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    current.dictionary_view_mut()
}

/// Point the annotation `id` at `page` and list it in the page's `/Annots`
pub(crate) fn attach_annotation(target: &mut Document, id: ObjectId, page: ObjectId) -> PdfResult<()> {
    if let Some(annotation) = target.get_mut(id)?.dictionary_view_mut() {
        annotation.set(names::P, page);
    }
    let page = target.get_mut(page)?.expect_dict_mut()?;
    match page.get_mut(names::ANNOTS) {
        Some(Value::Array(annots)) => annots.push(id),
        _ => {
            page.set(names::ANNOTS, vec![Value::Reference(id)]);
        }
    }
    Ok(())
}

/// Copy filter that holds back GoTo actions and `/Dest` entries. They are
/// stored in the resolver and written once the page map is complete.
pub(crate) struct DestinationCopyFilter<'r> {
    pub(crate) resolver: &'r mut DestinationResolver,
}

impl CopyFilter for DestinationCopyFilter<'_> {
    fn should_process(&mut self, site: &CopySite<'_>, key: &Name, value: &Value) -> bool {
        let (destination, action) = if key == names::DEST {
            (Destination::from_value(value, site.source), None)
        } else {
            match site.source.direct(value).as_dict() {
                Some(action) if is_goto(action) => (Destination::of_action(action, site.source), Some(value.clone())),
                _ => return true,
            }
        };

        match (site.anchor, destination) {
            (Some(anchor), Some(destination)) => {
                self.resolver.store_destination_to_readdress(destination, Readdress::Entry {
                    anchor,
                    path: site.path.to_vec(),
                    key: key.clone(),
                    action,
                });
            }
            _ => debug!("Dropping /{} outside an indirect object or without a destination", key),
        }
        false
    }
}
