//! Content keys for smart-mode deduplication
//!
//! Dictionaries and streams are serialised into a canonical byte form
//! (sorted keys, back links to parents skipped, stream payloads reduced to
//! an MD5 digest) whose SHA-256 digest identifies equal content.

use std::collections::{HashMap, HashSet};
use sha2::{Digest, Sha256};
use crate::error::PdfResult;
use crate::pdf::{names, Dictionary, ObjectId, ObjectReader, Resolve, Serializer, Value};

/// Nesting levels taken into account
const MAX_DEPTH: usize = 100;

/// Digest of the canonical form of a dictionary or stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerializedContent([u8; 32]);

impl SerializedContent {
    /// Key for `value`, the content of object `id`. `None` for values other
    /// than dictionaries and streams, and for content that cannot be read
    /// without consuming it.
    pub fn of(
        id: Option<ObjectId>,
        value: &Value,
        resolver: &dyn Resolve,
        reader: Option<&dyn ObjectReader>,
    ) -> PdfResult<Option<Self>> {
        if !matches!(value, Value::Dictionary(_) | Value::Stream(_)) {
            return Ok(None);
        }
        let mut serializer = ContentSerializer {
            resolver,
            reader,
            cache: HashMap::new(),
            in_progress: id.into_iter().collect(),
            readable: true,
        };
        let mut out = Vec::new();
        serializer.value(value, &mut out, MAX_DEPTH)?;
        if !serializer.readable {
            return Ok(None);
        }
        Ok(Some(Self(Sha256::digest(&out).into())))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

struct ContentSerializer<'a> {
    resolver: &'a dyn Resolve,
    reader: Option<&'a dyn ObjectReader>,
    /// Canonical form of every indirect object seen so far
    cache: HashMap<ObjectId, Vec<u8>>,
    in_progress: HashSet<ObjectId>,
    readable: bool,
}

impl ContentSerializer<'_> {
    fn value(&mut self, value: &Value, out: &mut Vec<u8>, level: usize) -> PdfResult<()> {
        if level == 0 {
            return Ok(());
        }
        match value {
            Value::Reference(id) => {
                if let Some(cached) = self.cache.get(id) {
                    out.extend_from_slice(cached);
                    return Ok(());
                }
                if !self.in_progress.insert(*id) {
                    out.extend_from_slice(b"$C");
                    return Ok(());
                }
                let mut own = Vec::new();
                let resolver = self.resolver;
                let target = resolver.direct(value);
                if target.is_reference() {
                    out.extend_from_slice(b"$C");
                } else {
                    self.value(target, &mut own, level)?;
                }
                self.in_progress.remove(id);
                out.extend_from_slice(&own);
                self.cache.insert(*id, own);
            }
            Value::Stream(stream) => {
                self.dictionary(stream.dict(), out, level - 1)?;
                out.extend_from_slice(b"$B");
                match stream.bytes_with(false, self.reader)? {
                    Some(bytes) => out.extend_from_slice(&md5::compute(&bytes).0),
                    None => self.readable = false,
                }
            }
            Value::Dictionary(dict) => self.dictionary(dict, out, level - 1)?,
            Value::Array(array) => {
                out.extend_from_slice(b"$A");
                if level > 1 {
                    for item in array.iter() {
                        self.value(item, out, level - 1)?;
                    }
                    out.extend_from_slice(b"/A");
                }
            }
            Value::String(_) => {
                out.extend_from_slice(b"$S");
                Serializer::plain().write_value(value, out)?;
            }
            Value::Name(_) => {
                out.extend_from_slice(b"$N");
                Serializer::plain().write_value(value, out)?;
            }
            _ => {
                out.extend_from_slice(b"$L");
                Serializer::plain().write_value(value, out)?;
            }
        }
        Ok(())
    }

    fn dictionary(&mut self, dict: &Dictionary, out: &mut Vec<u8>, level: usize) -> PdfResult<()> {
        out.extend_from_slice(b"$D");
        if level == 0 {
            return Ok(());
        }
        for (key, value) in dict.iter() {
            if refers_back(key.as_str(), value) {
                continue;
            }
            self.value(&Value::Name(key.clone()), out, level)?;
            self.value(value, out, level)?;
        }
        out.extend_from_slice(b"/D");
        Ok(())
    }
}

/// `/Parent`, and `/P` when it links to another object
fn refers_back(key: &str, value: &Value) -> bool {
    key == names::PARENT || (key == names::P && matches!(value, Value::Dictionary(_) | Value::Reference(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{ObjectRegistry, PdfString, Stream};
    use pretty_assertions::{assert_eq, assert_ne};
    use test_log::test;

    fn key(registry: &ObjectRegistry, value: &Value) -> PdfResult<Option<SerializedContent>> {
        SerializedContent::of(None, value, registry, None)
    }

    fn annotation(parent: ObjectId) -> Dictionary {
        let mut dict = Dictionary::with_type("Annot");
        dict.set(names::SUBTYPE, "Square");
        dict.set(names::PARENT, parent);
        dict.set(names::P, parent);
        dict.set(names::CONTENTS, PdfString::from("note"));
        dict
    }

    #[test]
    fn test_back_links_are_ignored() -> PdfResult<()> {
        let registry = ObjectRegistry::new();
        let a = key(&registry, &Value::from(annotation(ObjectId::new(3, 0))))?;
        let b = key(&registry, &Value::from(annotation(ObjectId::new(9, 0))))?;
        assert!(a.is_some());
        assert_eq!(a, b);

        let mut direct_p = annotation(ObjectId::new(3, 0));
        direct_p.set(names::P, 5);
        assert_ne!(key(&registry, &Value::from(direct_p))?, a);
        Ok(())
    }

    #[test]
    fn test_references_compare_by_content() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let first = registry.insert(Value::from(vec![Value::from(1), Value::from(2)]));
        let second = registry.insert(Value::from(vec![Value::from(1), Value::from(2)]));
        let mut a = Dictionary::new();
        a.set("Data", first);
        let mut b = Dictionary::new();
        b.set("Data", second);
        assert_eq!(key(&registry, &Value::from(a))?, key(&registry, &Value::from(b))?);
        Ok(())
    }

    #[test]
    fn test_stream_payload_matters() -> PdfResult<()> {
        let registry = ObjectRegistry::new();
        let one = key(&registry, &Value::from(Stream::from_bytes(b"q Q".to_vec())))?;
        let same = key(&registry, &Value::from(Stream::from_bytes(b"q Q".to_vec())))?;
        let other = key(&registry, &Value::from(Stream::from_bytes(b"q 1 Q".to_vec())))?;
        assert_eq!(one, same);
        assert_ne!(one, other);

        let unread = Value::from(Stream::from_reader(std::io::Cursor::new(b"x".to_vec())));
        assert_eq!(key(&registry, &unread)?, None);
        Ok(())
    }

    #[test]
    fn test_cycles_terminate() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let a = registry.create_next();
        let b = registry.create_next();
        let mut first = Dictionary::new();
        first.set("Next", b);
        let mut second = Dictionary::new();
        second.set("Next", a);
        registry.attach(a, Value::from(first.clone()))?;
        registry.attach(b, Value::from(second))?;

        assert!(SerializedContent::of(Some(a), &Value::from(first), &registry, None)?.is_some());
        assert_eq!(key(&registry, &Value::from(5))?, None);
        Ok(())
    }
}
