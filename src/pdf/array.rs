//! PDF array implementation

use std::ops::{Deref, DerefMut};
use super::{Resolve, Value};

/// Ordered sequence of values. Duplicates and nulls are allowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array(Vec<Value>);

impl Array {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Array of real numbers, e.g. a rectangle
    pub fn from_numbers(numbers: &[f64]) -> Self {
        numbers.iter().map(|&n| Value::from(n)).collect()
    }

    /// Append a value
    pub fn push(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    /// Element `index` with one level of indirection resolved
    pub fn direct_get<'a, R: Resolve + ?Sized>(&'a self, index: usize, resolver: &'a R) -> Option<&'a Value> {
        self.0.get(index).map(|value| resolver.direct(value))
    }

    /// Direct view over the elements
    pub fn direct_iter<'a, R: Resolve + ?Sized>(&'a self, resolver: &'a R) -> impl Iterator<Item = &'a Value> + 'a {
        self.0.iter().map(move |value| resolver.direct(value))
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl Deref for Array {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Array {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::ObjectId;
    use test_log::test;

    struct OneObject;

    impl Resolve for OneObject {
        fn lookup(&self, id: ObjectId) -> Option<&Value> {
            static TARGET: Value = Value::Boolean(true);
            (id.number == 1).then_some(&TARGET)
        }
    }

    #[test]
    fn test_duplicates_and_nulls_allowed() {
        let mut array = Array::new();
        array.push(1);
        array.push(1);
        array.push(Value::Null);
        assert_eq!(array.len(), 3);
        assert!(array[2].is_null());
    }

    #[test]
    fn test_direct_view_resolves_one_level() {
        let array: Array = vec![Value::from(ObjectId::new(1, 0)), Value::from(5)].into();
        assert_eq!(array.direct_get(0, &OneObject), Some(&Value::Boolean(true)));
        let direct: Vec<_> = array.direct_iter(&OneObject).cloned().collect();
        assert_eq!(direct, vec![Value::Boolean(true), Value::from(5)]);
        assert!(array[0].is_reference());
    }

    #[test]
    fn test_from_numbers() {
        let rect = Array::from_numbers(&[0.0, 0.0, 612.0, 792.0]);
        assert_eq!(rect.len(), 4);
        assert_eq!(rect[2].as_f64(), Some(612.0));
    }
}
