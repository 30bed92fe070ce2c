use std::collections::BTreeMap;
use crate::error::PdfResult;
use crate::pdf::{Dictionary, Resolve, Value};
use super::{build_tree, parse_tree, NodeSink};

/// Number tree such as `/PageLabels` or a structure `/ParentTree`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberTree {
    items: BTreeMap<i64, Value>,
    modified: bool,
}

impl NumberTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<R: Resolve + ?Sized>(root: &Dictionary, resolver: &R) -> Self {
        Self {
            items: parse_tree::<i64, R>(root, resolver),
            modified: false,
        }
    }

    pub fn numbers(&self) -> &BTreeMap<i64, Value> {
        &self.items
    }

    pub fn get(&self, key: i64) -> Option<&Value> {
        self.items.get(&key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add or replace the entry for `key`
    pub fn add_entry(&mut self, key: i64, value: impl Into<Value>) {
        self.items.insert(key, value.into());
        self.modified = true;
    }

    pub fn remove_entry(&mut self, key: i64) -> Option<Value> {
        let removed = self.items.remove(&key);
        self.modified |= removed.is_some();
        removed
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn build_tree(&self, sink: &mut dyn NodeSink) -> PdfResult<Dictionary> {
        build_tree(&self.items, sink)
    }
}
