//! Document outline (bookmarks)
//!
//! The outline is held as an arena of nodes addressed by [`OutlineId`].
//! The `/First` `/Last` `/Prev` `/Next` `/Parent` links of the file format
//! are derived from the child lists when the outline is written.

use std::collections::HashSet;
use log::{debug, trace, warn};
use crate::pdf::{names, Array, Dictionary, ObjectId, PdfString, Resolve, Value};

/// Entries derived from the tree structure; everything else on a node is
/// carried over untouched
const STRUCTURAL_KEYS: [&str; 11] = [
    names::TITLE, names::PARENT, names::PREV, names::NEXT, names::FIRST, names::LAST,
    names::COUNT, names::DEST, names::A, names::C, names::F,
];

/// Handle of one outline node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutlineId(usize);

#[derive(Debug, Clone, PartialEq)]
struct OutlineNode {
    title: String,
    parent: Option<OutlineId>,
    children: Vec<OutlineId>,
    object: Option<ObjectId>,
    open: bool,
    destination: Option<Value>,
    action: Option<Value>,
    color: Option<[f64; 3]>,
    style: Option<i64>,
    extra: Dictionary,
    removed: bool,
}

impl OutlineNode {
    fn new(title: impl Into<String>, parent: Option<OutlineId>) -> Self {
        Self {
            title: title.into(),
            parent,
            children: Vec::new(),
            object: None,
            open: true,
            destination: None,
            action: None,
            color: None,
            style: None,
            extra: Dictionary::new(),
            removed: false,
        }
    }
}

/// Objects produced when an outline is written back
#[derive(Debug, Default)]
pub(crate) struct OutlineObjects {
    /// Outline root, `None` when the catalog entry must go
    pub root: Option<ObjectId>,
    pub objects: Vec<(ObjectId, Dictionary)>,
    /// Objects of removed nodes
    pub released: Vec<ObjectId>,
}

/// Outline tree of a document
#[derive(Debug, Clone, PartialEq)]
pub struct Outlines {
    nodes: Vec<OutlineNode>,
    modified: bool,
}

impl Default for Outlines {
    fn default() -> Self {
        Self::new()
    }
}

impl Outlines {
    /// Empty outline with just a root
    pub fn new() -> Self {
        Self {
            nodes: vec![OutlineNode::new("Outlines", None)],
            modified: false,
        }
    }

    /// Parse the `/Outlines` entry of `catalog`. Sibling chains are
    /// followed with a visited set so `/Next` cycles end the walk.
    pub fn load<R: Resolve + ?Sized>(catalog: &Dictionary, resolver: &R) -> Self {
        let mut outlines = Self::new();
        let Some(entry) = catalog.get(names::OUTLINES) else {
            return outlines;
        };
        let Some(root) = resolver.direct(entry).as_dict() else {
            warn!("Catalog /Outlines is not a dictionary");
            return outlines;
        };

        let mut visited = HashSet::new();
        if let Value::Reference(id) = entry {
            outlines.nodes[0].object = Some(*id);
            visited.insert(*id);
        }
        outlines.nodes[0].open = root.get_i64(names::COUNT).map_or(true, |count| count >= 0);
        outlines.nodes[0].extra = extra_entries(root);
        outlines.nodes[0].extra.remove(names::TYPE);
        outlines.load_children(OutlineId(0), root, resolver, &mut visited);
        debug!("Loaded outline with {} nodes", outlines.nodes.len());
        outlines
    }

    fn load_children<R: Resolve + ?Sized>(
        &mut self,
        parent: OutlineId,
        dict: &Dictionary,
        resolver: &R,
        visited: &mut HashSet<ObjectId>,
    ) {
        let mut next = dict.get(names::FIRST);
        while let Some(link) = next {
            let object = match link {
                Value::Reference(id) => {
                    if !visited.insert(*id) {
                        warn!("Outline item {} is linked twice, stopping", id);
                        break;
                    }
                    Some(*id)
                }
                _ => None,
            };
            let Some(item) = resolver.direct(link).as_dict() else {
                warn!("Outline item is not a dictionary");
                break;
            };

            let title = item.direct_get(names::TITLE, resolver).and_then(Value::as_string).map(PdfString::to_text);
            let mut node = OutlineNode::new(title.unwrap_or_default(), Some(parent));
            node.object = object;
            node.open = item.get_i64(names::COUNT).map_or(true, |count| count >= 0);
            node.destination = item.get(names::DEST).cloned();
            node.action = item.get(names::A).cloned();
            node.color = item.direct_array(names::C, resolver).and_then(|c| {
                let rgb: Vec<f64> = c.iter().filter_map(Value::as_f64).collect();
                <[f64; 3]>::try_from(rgb).ok()
            });
            node.style = item.direct_get(names::F, resolver).and_then(Value::as_i64);
            node.extra = extra_entries(item);

            let id = OutlineId(self.nodes.len());
            trace!("Outline item {:?} \"{}\"", id, node.title);
            self.nodes.push(node);
            self.nodes[parent.0].children.push(id);
            self.load_children(id, item, resolver, visited);

            next = item.get(names::NEXT);
        }
    }

    pub fn root(&self) -> OutlineId {
        OutlineId(0)
    }

    fn node(&self, id: OutlineId) -> &OutlineNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: OutlineId) -> &mut OutlineNode {
        self.modified = true;
        &mut self.nodes[id.0]
    }

    pub fn title(&self, id: OutlineId) -> &str {
        &self.node(id).title
    }

    pub fn set_title(&mut self, id: OutlineId, title: impl Into<String>) {
        self.node_mut(id).title = title.into();
    }

    pub fn children(&self, id: OutlineId) -> &[OutlineId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: OutlineId) -> Option<OutlineId> {
        self.node(id).parent
    }

    /// Indirect object the node was read from
    pub fn object_id(&self, id: OutlineId) -> Option<ObjectId> {
        self.node(id).object
    }

    /// No live items below the root
    pub fn is_empty(&self) -> bool {
        self.nodes[0].removed || self.nodes[0].children.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Insert a new item under `parent` at `position`, or last
    pub fn add_outline(&mut self, parent: OutlineId, title: impl Into<String>, position: Option<usize>) -> OutlineId {
        let id = OutlineId(self.nodes.len());
        self.nodes.push(OutlineNode::new(title, Some(parent)));
        let parent_node = self.node_mut(parent);
        parent_node.removed = false;
        let index = position.map_or(parent_node.children.len(), |p| p.min(parent_node.children.len()));
        parent_node.children.insert(index, id);
        id
    }

    pub fn is_open(&self, id: OutlineId) -> bool {
        self.node(id).open
    }

    pub fn set_open(&mut self, id: OutlineId, open: bool) {
        self.node_mut(id).open = open;
    }

    /// `/Count` written for the node: `-1` when closed, the number of
    /// children when open, absent for an open node without children
    pub fn count(&self, id: OutlineId) -> Option<i64> {
        let node = self.node(id);
        if !node.open {
            Some(-1)
        } else if node.children.is_empty() {
            None
        } else {
            Some(node.children.len() as i64)
        }
    }

    pub fn color(&self, id: OutlineId) -> Option<[f64; 3]> {
        self.node(id).color
    }

    pub fn set_color(&mut self, id: OutlineId, rgb: [f64; 3]) {
        self.node_mut(id).color = Some(rgb);
    }

    /// Style flags: 1 italic, 2 bold
    pub fn style(&self, id: OutlineId) -> Option<i64> {
        self.node(id).style
    }

    pub fn set_style(&mut self, id: OutlineId, style: i64) {
        self.node_mut(id).style = Some(style);
    }

    pub fn destination(&self, id: OutlineId) -> Option<&Value> {
        self.node(id).destination.as_ref()
    }

    pub fn add_destination(&mut self, id: OutlineId, destination: impl Into<Value>) {
        self.node_mut(id).destination = Some(destination.into());
    }

    pub fn action(&self, id: OutlineId) -> Option<&Value> {
        self.node(id).action.as_ref()
    }

    pub fn add_action(&mut self, id: OutlineId, action: impl Into<Value>) {
        self.node_mut(id).action = Some(action.into());
    }

    /// Remove `id` and its subtree. A parent left without children is
    /// removed as well, up to the root; removing the root empties the
    /// outline.
    pub fn remove_outline(&mut self, id: OutlineId) {
        self.modified = true;
        let Some(parent) = self.node(id).parent else {
            let children = std::mem::take(&mut self.nodes[0].children);
            for child in children {
                self.mark_removed(child);
            }
            self.nodes[0].removed = true;
            return;
        };
        self.nodes[parent.0].children.retain(|&child| child != id);
        self.mark_removed(id);
        if self.nodes[parent.0].children.is_empty() {
            self.remove_outline(parent);
        }
    }

    fn mark_removed(&mut self, id: OutlineId) {
        let node = &mut self.nodes[id.0];
        node.removed = true;
        let children = std::mem::take(&mut node.children);
        for child in children {
            self.mark_removed(child);
        }
    }

    /// Live items in document order, root excluded
    pub fn iter(&self) -> impl Iterator<Item = OutlineId> + '_ {
        let mut stack: Vec<OutlineId> = self.nodes[0].children.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
            Some(id)
        })
    }

    /// Dictionaries for every live node. Nodes keep the object they were
    /// read from; new nodes get one from `allocate`.
    pub(crate) fn to_objects(&self, mut allocate: impl FnMut() -> ObjectId) -> OutlineObjects {
        let mut result = OutlineObjects::default();
        result.released = self
            .nodes
            .iter()
            .filter(|node| node.removed)
            .filter_map(|node| node.object)
            .collect();
        if self.is_empty() {
            result.released.extend(self.nodes[0].object);
            result.released.sort();
            result.released.dedup();
            return result;
        }

        let mut ids: Vec<Option<ObjectId>> = vec![None; self.nodes.len()];
        let live = std::iter::once(self.root()).chain(self.iter()).collect::<Vec<_>>();
        for &id in &live {
            ids[id.0] = Some(self.node(id).object.unwrap_or_else(&mut allocate));
        }
        let object_of = |id: OutlineId| ids[id.0].map(Value::Reference).unwrap_or_default();

        for &id in &live {
            let node = self.node(id);
            let mut dict = node.extra.clone();
            if id == self.root() {
                dict.set(names::TYPE, names::OUTLINES);
            } else {
                dict.set(names::TITLE, PdfString::from_text(&node.title));
                if let Some(parent) = node.parent {
                    dict.set(names::PARENT, object_of(parent));
                }
                let siblings = node.parent.map_or(&[][..], |p| self.children(p));
                if let Some(index) = siblings.iter().position(|&s| s == id) {
                    if index > 0 {
                        dict.set(names::PREV, object_of(siblings[index - 1]));
                    }
                    if let Some(&next) = siblings.get(index + 1) {
                        dict.set(names::NEXT, object_of(next));
                    }
                }
                if let Some(destination) = &node.destination {
                    dict.set(names::DEST, destination.clone());
                }
                if let Some(action) = &node.action {
                    dict.set(names::A, action.clone());
                }
                if let Some(rgb) = node.color {
                    dict.set(names::C, Array::from_numbers(&rgb));
                }
                if let Some(style) = node.style {
                    dict.set(names::F, style);
                }
            }
            if let (Some(first), Some(last)) = (node.children.first(), node.children.last()) {
                dict.set(names::FIRST, object_of(*first));
                dict.set(names::LAST, object_of(*last));
            }
            if let Some(count) = self.count(id) {
                dict.set(names::COUNT, count);
            }
            if let Some(object) = ids[id.0] {
                result.objects.push((object, dict));
            }
        }
        result.root = ids[0];
        result
    }
}

fn extra_entries(dict: &Dictionary) -> Dictionary {
    dict.iter()
        .filter(|(key, _)| !STRUCTURAL_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::ObjectRegistry;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn sample() -> (Outlines, OutlineId, OutlineId, OutlineId) {
        let mut outlines = Outlines::new();
        let root = outlines.root();
        let first = outlines.add_outline(root, "Chapter 1", None);
        let second = outlines.add_outline(root, "Chapter 2", None);
        let nested = outlines.add_outline(first, "Section 1.1", None);
        (outlines, first, second, nested)
    }

    fn written(outlines: &Outlines) -> (OutlineObjects, ObjectRegistry) {
        let mut registry = ObjectRegistry::new();
        let objects = outlines.to_objects(|| registry.create_next());
        for (id, dict) in &objects.objects {
            registry.attach(*id, Value::from(dict.clone())).unwrap();
        }
        (objects, registry)
    }

    #[test]
    fn test_count_semantics() {
        let (mut outlines, first, second, _) = sample();
        assert_eq!(outlines.count(outlines.root()), Some(2));
        assert_eq!(outlines.count(first), Some(1));
        assert_eq!(outlines.count(second), None);

        outlines.set_open(first, false);
        assert_eq!(outlines.count(first), Some(-1));
        outlines.set_open(second, false);
        assert_eq!(outlines.count(second), Some(-1));
    }

    #[test]
    fn test_insert_at_position() {
        let (mut outlines, first, second, _) = sample();
        let root = outlines.root();
        let preface = outlines.add_outline(root, "Preface", Some(0));
        assert_eq!(outlines.children(root), &[preface, first, second]);
        let titles: Vec<&str> = outlines.iter().map(|id| outlines.title(id)).collect();
        assert_eq!(titles, vec!["Preface", "Chapter 1", "Section 1.1", "Chapter 2"]);
    }

    #[test]
    fn test_removal_collapses_empty_parents() {
        let (mut outlines, first, second, nested) = sample();
        outlines.remove_outline(nested);
        assert_eq!(outlines.children(outlines.root()), &[second]);
        assert_eq!(outlines.parent(first), Some(outlines.root()));

        outlines.remove_outline(second);
        assert!(outlines.is_empty());
        let objects = outlines.to_objects(|| ObjectId::new(1, 0));
        assert_eq!(objects.root, None);
    }

    #[test]
    fn test_written_links_parse_back() {
        let (mut outlines, first, second, nested) = sample();
        outlines.set_color(second, [1.0, 0.0, 0.0]);
        outlines.set_style(second, 2);
        outlines.add_destination(nested, vec![Value::Reference(ObjectId::new(40, 0)), Value::from(names::FIT)]);
        outlines.set_open(first, false);

        let (objects, registry) = written(&outlines);
        let root_id = objects.root.unwrap();
        let binding = Value::Reference(root_id);
        let root = registry.direct(&binding).as_dict().unwrap();
        assert_eq!(root.get_i64(names::COUNT), Some(2));
        assert_eq!(root.type_name().map(|t| t.as_str()), Some(names::OUTLINES));

        let mut catalog = Dictionary::with_type(names::CATALOG);
        catalog.set(names::OUTLINES, root_id);
        let parsed = Outlines::load(&catalog, &registry);
        let titles: Vec<&str> = parsed.iter().map(|id| parsed.title(id)).collect();
        assert_eq!(titles, vec!["Chapter 1", "Section 1.1", "Chapter 2"]);

        let items: Vec<OutlineId> = parsed.iter().collect();
        assert!(!parsed.is_open(items[0]));
        assert_eq!(parsed.destination(items[1]), outlines.destination(nested));
        assert_eq!(parsed.color(items[2]), Some([1.0, 0.0, 0.0]));
        assert_eq!(parsed.style(items[2]), Some(2));
        assert!(parsed.object_id(items[2]).is_some());
    }

    #[test]
    fn test_next_cycle_terminates() -> crate::error::PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let root_id = registry.create_next();
        let item_id = registry.create_next();
        let mut item = Dictionary::new();
        item.set(names::TITLE, PdfString::from("loop"));
        item.set(names::NEXT, item_id);
        registry.attach(item_id, Value::from(item))?;
        let mut root = Dictionary::with_type(names::OUTLINES);
        root.set(names::FIRST, item_id);
        registry.attach(root_id, Value::from(root))?;

        let mut catalog = Dictionary::new();
        catalog.set(names::OUTLINES, root_id);
        let parsed = Outlines::load(&catalog, &registry);
        assert_eq!(parsed.children(parsed.root()).len(), 1);
        Ok(())
    }
}
