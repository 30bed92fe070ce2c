//! PDF dictionary implementation

use std::collections::btree_map::{self, BTreeMap};
use super::{Array, Name, ObjectId, PdfString, Resolve, Value};

/// PDF dictionary object.
///
/// Entries are kept sorted by key so iteration and serialization are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<Name, Value>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Create a dictionary with its `/Type` entry set
    pub fn with_type(type_name: &str) -> Self {
        let mut dict = Self::new();
        dict.set(super::names::TYPE, Name::new(type_name));
        dict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the raw value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get the raw value stored under `key` for mutation
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Set value, returning the previous one
    pub fn set(&mut self, key: impl Into<Name>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Raw view over the entries, references left as stored
    pub fn iter(&self) -> btree_map::Iter<'_, Name, Value> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, Name, Value> {
        self.entries.iter_mut()
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&Name, &mut Value) -> bool) {
        self.entries.retain(|k, v| keep(k, v));
    }

    /// Get name value
    pub fn get_name(&self, key: &str) -> Option<&Name> {
        self.get(key).and_then(Value::as_name)
    }

    /// Get integer value
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Get real value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Get string value
    pub fn get_string(&self, key: &str) -> Option<&PdfString> {
        self.get(key).and_then(Value::as_string)
    }

    pub fn get_array(&self, key: &str) -> Option<&Array> {
        self.get(key).and_then(Value::as_array)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dict)
    }

    pub fn get_dict_mut(&mut self, key: &str) -> Option<&mut Dictionary> {
        self.get_mut(key).and_then(Value::as_dict_mut)
    }

    /// Get reference value
    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Value::as_reference)
    }

    /// `/Type` of this dictionary
    pub fn type_name(&self) -> Option<&Name> {
        self.get_name(super::names::TYPE)
    }

    /// Value under `key` with one level of indirection resolved
    pub fn direct_get<'a, R: Resolve + ?Sized>(&'a self, key: &str, resolver: &'a R) -> Option<&'a Value> {
        self.get(key).map(|value| resolver.direct(value))
    }

    /// Dictionary (or stream dictionary) under `key`, resolving one reference
    pub fn direct_dict<'a, R: Resolve + ?Sized>(&'a self, key: &str, resolver: &'a R) -> Option<&'a Dictionary> {
        self.direct_get(key, resolver).and_then(Value::dictionary_view)
    }

    /// Array under `key`, resolving one reference
    pub fn direct_array<'a, R: Resolve + ?Sized>(&'a self, key: &str, resolver: &'a R) -> Option<&'a Array> {
        self.direct_get(key, resolver).and_then(Value::as_array)
    }

    /// Direct view: every value that is a reference is replaced by the
    /// object it points to. Unresolvable references read as null.
    pub fn direct_iter<'a, R: Resolve + ?Sized>(
        &'a self,
        resolver: &'a R,
    ) -> impl Iterator<Item = (&'a Name, &'a Value)> + 'a {
        self.entries.iter().map(move |(k, v)| (k, resolver.direct(v)))
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a Value);
    type IntoIter = btree_map::Iter<'a, Name, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Dictionary {
    type Item = (Name, Value);
    type IntoIter = btree_map::IntoIter<Name, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Name, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Name, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::names;
    use test_log::test;

    struct FixedResolver(Value);

    impl Resolve for FixedResolver {
        fn lookup(&self, id: ObjectId) -> Option<&Value> {
            (id == ObjectId::new(4, 0)).then_some(&self.0)
        }
    }

    #[test]
    fn test_typed_getters() {
        let mut dict = Dictionary::with_type(names::PAGE);
        dict.set("Rotate", 90);
        dict.set("Title", PdfString::from_text("Intro"));
        dict.set("Parent", ObjectId::new(2, 0));

        assert_eq!(dict.type_name().map(Name::as_str), Some("Page"));
        assert_eq!(dict.get_i64("Rotate"), Some(90));
        assert_eq!(dict.get_string("Title").map(PdfString::to_text), Some("Intro".to_string()));
        assert_eq!(dict.get_reference("Parent"), Some(ObjectId::new(2, 0)));
        assert_eq!(dict.get_name("Rotate"), None);
    }

    #[test]
    fn test_set_replaces_and_returns_previous() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.set("Count", 1), None);
        assert_eq!(dict.set("Count", 2), Some(Value::from(1)));
        assert_eq!(dict.remove("Count"), Some(Value::from(2)));
        assert!(dict.is_empty());
    }

    #[test]
    fn test_raw_and_direct_views() {
        let resolver = FixedResolver(Value::from(42));
        let mut dict = Dictionary::new();
        dict.set("Inline", 7);
        dict.set("Indirect", ObjectId::new(4, 0));
        dict.set("Dangling", ObjectId::new(9, 0));

        assert!(dict.get("Indirect").map_or(false, Value::is_reference));
        assert_eq!(dict.direct_get("Indirect", &resolver), Some(&Value::from(42)));

        let direct: Vec<_> = dict.direct_iter(&resolver).map(|(k, v)| (k.as_str(), v.clone())).collect();
        assert_eq!(direct, vec![
            ("Dangling", Value::Null),
            ("Indirect", Value::from(42)),
            ("Inline", Value::from(7)),
        ]);
    }
}
