use std::collections::BTreeMap;
use log::{debug, warn};
use crate::error::PdfResult;
use crate::pdf::{names, Dictionary, Name, PdfString, Resolve, Value};
use super::{build_tree, parse_tree, NodeSink};

/// Name tree of one catalog `/Names` category (`Dests`, `EmbeddedFiles`,
/// `JavaScript`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct NameTree {
    tree_type: Name,
    items: BTreeMap<PdfString, Value>,
    modified: bool,
}

impl NameTree {
    pub fn new(tree_type: impl Into<Name>) -> Self {
        Self {
            tree_type: tree_type.into(),
            items: BTreeMap::new(),
            modified: false,
        }
    }

    /// Read the tree `/Names /<tree_type>` of `catalog`. For `Dests` the
    /// legacy catalog `/Dests` dictionary is merged in first and every
    /// destination is reduced to its explicit array.
    pub fn load<R: Resolve + ?Sized>(tree_type: impl Into<Name>, catalog: &Dictionary, resolver: &R) -> Self {
        let mut tree = Self::new(tree_type);
        let is_dests = tree.tree_type == names::DESTS;

        if is_dests {
            if let Some(legacy) = catalog.direct_dict(names::DESTS, resolver) {
                for (key, value) in legacy.iter() {
                    if let Some(dest) = destination_array(value, resolver) {
                        tree.items.insert(PdfString::new(key.as_str().as_bytes()), dest);
                    }
                }
            }
        }

        let root = catalog
            .direct_dict(names::NAMES, resolver)
            .and_then(|names_dict| names_dict.direct_dict(tree.tree_type.as_str(), resolver));
        if let Some(root) = root {
            for (key, value) in parse_tree::<PdfString, R>(root, resolver) {
                if !is_dests {
                    tree.items.insert(key, value);
                    continue;
                }
                match destination_array(&value, resolver) {
                    Some(dest) => {
                        tree.items.insert(key, dest);
                    }
                    None => {
                        tree.items.remove(&key);
                    }
                }
            }
        }
        debug!("Loaded name tree {} with {} entries", tree.tree_type, tree.items.len());
        tree
    }

    pub fn tree_type(&self) -> &Name {
        &self.tree_type
    }

    pub fn names(&self) -> &BTreeMap<PdfString, Value> {
        &self.items
    }

    pub fn get(&self, key: &PdfString) -> Option<&Value> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add or replace an entry; see [`add_entry_with`](Self::add_entry_with)
    pub fn add_entry(&mut self, key: impl Into<PdfString>, value: impl Into<Value>) {
        self.add_entry_with(key, value, |_| {});
    }

    /// Add or replace an entry.
    ///
    /// Re-adding the same indirect object under a key is a no-op. Any other
    /// value for an existing key is logged, reported to `on_conflict` and
    /// replaces the old one.
    pub fn add_entry_with(
        &mut self,
        key: impl Into<PdfString>,
        value: impl Into<Value>,
        on_conflict: impl FnOnce(&PdfString),
    ) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.items.get(&key) {
            if value.is_reference() && existing.as_reference() == value.as_reference() {
                return;
            }
            warn!("Name \"{}\" already exists in the {} name tree", key.to_text(), self.tree_type);
            on_conflict(&key);
        }
        self.items.insert(key, value);
        self.modified = true;
    }

    pub fn remove_entry(&mut self, key: &PdfString) -> Option<Value> {
        let removed = self.items.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self) {
        self.modified = true;
    }

    /// Root dictionary of the balanced tree; intermediate nodes go to `sink`
    pub fn build_tree(&self, sink: &mut dyn NodeSink) -> PdfResult<Dictionary> {
        build_tree(&self.items, sink)
    }
}

/// Explicit destination array behind a `Dests` value, unwrapping `/D`
fn destination_array<R: Resolve + ?Sized>(value: &Value, resolver: &R) -> Option<Value> {
    match resolver.direct(value) {
        Value::Array(array) => Some(Value::Array(array.clone())),
        Value::Dictionary(dict) => dict.direct_array(names::D, resolver).map(|a| Value::Array(a.clone())),
        other => {
            warn!("Ignoring {} destination in the name tree", other.type_name());
            None
        }
    }
}
