//! Balanced name and number trees
//!
//! Trees are kept as flat sorted maps in memory and rebuilt from scratch
//! every time they are written. Leaves hold at most [`TREE_NODE_SIZE`]
//! key/value pairs and interior nodes at most [`TREE_NODE_SIZE`] kids.

mod name_tree;
mod number_tree;

pub use name_tree::NameTree;
pub use number_tree::NumberTree;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use log::{trace, warn};
use crate::config::TREE_NODE_SIZE;
use crate::error::PdfResult;
use crate::pdf::{names, Array, Dictionary, ObjectId, ObjectRegistry, PdfString, Resolve, Value};

/// Destination for the intermediate nodes of a tree being built
pub trait NodeSink {
    /// Store `node` as an indirect object and return its id
    fn add_node(&mut self, node: Dictionary) -> PdfResult<ObjectId>;
}

impl NodeSink for ObjectRegistry {
    fn add_node(&mut self, node: Dictionary) -> PdfResult<ObjectId> {
        Ok(self.insert(Value::from(node)))
    }
}

/// Key type of a tree: strings for name trees, integers for number trees
pub trait TreeKey: Ord + Clone {
    /// Entry holding the leaf pairs, `/Names` or `/Nums`
    const LEAF_KEY: &'static str;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    /// Order of the keys on disk
    fn tree_order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// Name tree keys are stored in the order of their decoded text
impl TreeKey for PdfString {
    const LEAF_KEY: &'static str = names::NAMES;

    fn tree_order(&self, other: &Self) -> Ordering {
        self.compare_text(other)
    }

    fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            // Some writers put names where strings belong
            Value::Name(n) => Some(PdfString::new(n.as_str().as_bytes())),
            _ => None,
        }
    }
}

impl TreeKey for i64 {
    const LEAF_KEY: &'static str = names::NUMS;

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(n.as_i64()),
            _ => None,
        }
    }
}

fn limits<K: TreeKey>(first: &K, last: &K) -> Array {
    Array::from(vec![first.to_value(), last.to_value()])
}

/// Build the on-disk form of `items` and return the root dictionary.
///
/// A map that fits in one leaf yields a single leaf root without
/// `/Limits`. Otherwise leaves and interior layers are written through
/// `sink` and the root only carries `/Kids`.
pub fn build_tree<K: TreeKey>(items: &BTreeMap<K, Value>, sink: &mut dyn NodeSink) -> PdfResult<Dictionary> {
    let mut entries: Vec<(&K, &Value)> = items.iter().collect();
    entries.sort_by(|a, b| a.0.tree_order(b.0));

    let mut root = Dictionary::new();
    if entries.len() <= TREE_NODE_SIZE {
        let leaf: Array = entries
            .iter()
            .flat_map(|(key, value)| [key.to_value(), (*value).clone()])
            .collect();
        root.set(K::LEAF_KEY, leaf);
        return Ok(root);
    }

    // (node, first key, last key) of the layer being built
    let mut layer: Vec<(ObjectId, &K, &K)> = Vec::with_capacity(entries.len() / TREE_NODE_SIZE + 1);
    for chunk in entries.chunks(TREE_NODE_SIZE) {
        let (first, last) = (chunk[0].0, chunk[chunk.len() - 1].0);
        let mut leaf = Dictionary::new();
        leaf.set(names::LIMITS, limits(first, last));
        let pairs: Array = chunk
            .iter()
            .flat_map(|(key, value)| [key.to_value(), (*value).clone()])
            .collect();
        leaf.set(K::LEAF_KEY, pairs);
        layer.push((sink.add_node(leaf)?, first, last));
    }
    trace!("Built {} tree leaves for {} entries", layer.len(), entries.len());

    while layer.len() > TREE_NODE_SIZE {
        let mut parents = Vec::with_capacity(layer.len() / TREE_NODE_SIZE + 1);
        for group in layer.chunks(TREE_NODE_SIZE) {
            let (first, last) = (group[0].1, group[group.len() - 1].2);
            let mut node = Dictionary::new();
            node.set(names::LIMITS, limits(first, last));
            let kids: Array = group.iter().map(|(id, _, _)| Value::Reference(*id)).collect();
            node.set(names::KIDS, kids);
            parents.push((sink.add_node(node)?, first, last));
        }
        trace!("Tree layer reduced from {} to {} nodes", layer.len(), parents.len());
        layer = parents;
    }

    let kids: Array = layer.iter().map(|(id, _, _)| Value::Reference(*id)).collect();
    root.set(names::KIDS, kids);
    Ok(root)
}

/// Read every key/value pair below `root`.
///
/// Values are kept as stored, references are not followed. A leaf with an
/// odd number of elements hands its last key over to the next leaf, whose
/// first element then becomes that key's value.
pub fn parse_tree<K: TreeKey, R: Resolve + ?Sized>(root: &Dictionary, resolver: &R) -> BTreeMap<K, Value> {
    let mut items = BTreeMap::new();
    let mut visited = HashSet::new();
    let leftover = collect_items(root, resolver, &mut items, None, &mut visited);
    if leftover.is_some() {
        warn!("Tree ends with a key that has no value, dropping it");
    }
    items
}

fn collect_items<K: TreeKey, R: Resolve + ?Sized>(
    node: &Dictionary,
    resolver: &R,
    items: &mut BTreeMap<K, Value>,
    mut leftover: Option<Value>,
    visited: &mut HashSet<ObjectId>,
) -> Option<Value> {
    if let Some(pairs) = node.direct_array(K::LEAF_KEY, resolver) {
        let mut values = pairs.iter();
        loop {
            let key = match leftover.take() {
                Some(key) => key,
                None => match values.next() {
                    Some(key) => resolver.direct(key).clone(),
                    None => return None,
                },
            };
            let Some(value) = values.next() else {
                return Some(key);
            };
            match K::from_value(&key) {
                Some(key) => {
                    items.insert(key, value.clone());
                }
                None => warn!("Skipping tree entry with a {} key", key.type_name()),
            }
        }
    }

    if let Some(kids) = node.get(names::KIDS).map(|kids| resolver.direct(kids)).and_then(Value::as_array) {
        for kid in kids.iter() {
            if let Value::Reference(id) = kid {
                if !visited.insert(*id) {
                    warn!("Tree node {} is reachable twice, skipping", id);
                    continue;
                }
            }
            match resolver.direct(kid).as_dict() {
                Some(kid) => leftover = collect_items(kid, resolver, items, leftover, visited),
                None => warn!("Tree kid is not a dictionary"),
            }
        }
    }
    leftover
}
