//! Indirect object identity and storage
//!
//! The registry is an arena of reference slots indexed by object number.
//! Each slot owns the value it refers to (loaded lazily from the backing
//! reader on first access) and a small set of state flags. Freed slots keep
//! their record with a bumped generation and go on a free list for reuse.

use std::cell::Cell;
use std::fmt;
use log::{trace, warn};
use once_cell::unsync::OnceCell;
use crate::config::MAX_REFERENCE_CHAIN;
use crate::error::{PdfError, PdfResult};
use super::{ObjectId, ObjectReader, Value, XrefEntry, NULL};

/// Highest generation a slot can reach; such slots are never reused
pub const MAX_GENERATION: u16 = 65535;

/// Anything that can look up indirect objects by id
pub trait Resolve {
    /// The object `id` refers to, if it exists and is not free
    fn lookup(&self, id: ObjectId) -> Option<&Value>;

    /// `value` with one level of indirection resolved. Unresolvable
    /// references read as null.
    fn direct<'a>(&'a self, value: &'a Value) -> &'a Value {
        match value {
            Value::Reference(id) => self.lookup(*id).unwrap_or(&NULL),
            other => other,
        }
    }
}

/// State flags of an indirect reference
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RefState(u8);

impl RefState {
    pub const FREE: u8 = 1;
    pub const MODIFIED: u8 = 1 << 1;
    pub const MUST_BE_FLUSHED: u8 = 1 << 2;
    pub const READING: u8 = 1 << 3;
    pub const FLUSHED: u8 = 1 << 4;
    pub const ORIGINAL_OBJECT_STREAM: u8 = 1 << 5;

    const NAMES: [(u8, &'static str); 6] = [
        (Self::FREE, "Free"),
        (Self::MODIFIED, "Modified"),
        (Self::MUST_BE_FLUSHED, "MustBeFlushed"),
        (Self::READING, "Reading"),
        (Self::FLUSHED, "Flushed"),
        (Self::ORIGINAL_OBJECT_STREAM, "OriginalObjectStream"),
    ];

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    pub fn without(self, flag: u8) -> Self {
        Self(self.0 & !flag)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for RefState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join(" "))
    }
}

/// Where an object is stored in a file. An object stream number of zero
/// selects a plain byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    #[default]
    Unplaced,
    Offset(u64),
    InObjectStream { stream: u32, index: u32 },
}

impl Placement {
    pub fn from_parts(object_stream: u32, offset_or_index: u64) -> Self {
        if object_stream == 0 {
            Placement::Offset(offset_or_index)
        } else {
            Placement::InObjectStream { stream: object_stream, index: offset_or_index as u32 }
        }
    }
}

/// One slot of the registry
pub struct IndirectReference {
    id: ObjectId,
    refers_to: OnceCell<Value>,
    state: Cell<RefState>,
    placement: Cell<Placement>,
}

impl IndirectReference {
    fn new(id: ObjectId) -> Self {
        Self {
            id,
            refers_to: OnceCell::new(),
            state: Cell::new(RefState::default()),
            placement: Cell::new(Placement::Unplaced),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn state(&self) -> RefState {
        self.state.get()
    }

    pub fn placement(&self) -> Placement {
        self.placement.get()
    }

    pub fn is_free(&self) -> bool {
        self.state().contains(RefState::FREE)
    }

    pub fn is_flushed(&self) -> bool {
        self.state().contains(RefState::FLUSHED)
    }

    /// Whether the referred value is held in memory
    pub fn is_loaded(&self) -> bool {
        self.refers_to.get().is_some()
    }

    fn set_flag(&self, flag: u8) {
        self.state.set(self.state().with(flag));
    }

    fn clear_flag(&self, flag: u8) {
        self.state.set(self.state().without(flag));
    }
}

impl fmt::Display for IndirectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if self.state().bits() != 0 {
            write!(f, " {:?}", self.state())?;
        }
        Ok(())
    }
}

impl fmt::Debug for IndirectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Arena of indirect references for one document
#[derive(Default)]
pub struct ObjectRegistry {
    slots: Vec<Option<IndirectReference>>,
    free_list: Vec<u32>,
    reader: Option<Box<dyn ObjectReader>>,
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("size", &self.size())
            .field("free", &self.free_list.len())
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from the cross-reference entries of `reader`.
    /// Values stay on disk until first accessed.
    pub fn with_reader(reader: Box<dyn ObjectReader>) -> Self {
        let mut registry = Self::new();
        let limit = reader.max_object_number();
        for (id, entry) in reader.entries() {
            if id.number == 0 {
                continue;
            }
            if id.number > limit {
                warn!("Ignoring cross-reference entry for {} beyond object number {}", id, limit);
                continue;
            }
            let reference = IndirectReference::new(id);
            match entry {
                XrefEntry::Free { .. } => {
                    reference.set_flag(RefState::FREE);
                    if id.generation < MAX_GENERATION {
                        registry.free_list.push(id.number);
                    }
                }
                XrefEntry::InUse { offset, .. } => reference.placement.set(Placement::Offset(offset)),
                XrefEntry::Compressed { stream, index } => {
                    reference.placement.set(Placement::from_parts(stream, index as u64));
                }
            }
            *registry.slot_entry(id.number) = Some(reference);
        }
        // Lowest numbers are handed out first
        registry.free_list.sort_unstable_by(|a, b| b.cmp(a));
        registry.reader = Some(reader);
        registry
    }

    fn slot_entry(&mut self, number: u32) -> &mut Option<IndirectReference> {
        let index = number as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        &mut self.slots[index]
    }

    pub fn reader(&self) -> Option<&dyn ObjectReader> {
        self.reader.as_deref()
    }

    /// One past the highest object number in use (the trailer `/Size`)
    pub fn size(&self) -> u32 {
        self.slots.len().max(1) as u32
    }

    /// Slot for `number`, whatever its generation
    pub fn slot(&self, number: u32) -> Option<&IndirectReference> {
        self.slots.get(number as usize).and_then(Option::as_ref)
    }

    /// Slot whose id matches `id` exactly
    pub fn reference(&self, id: ObjectId) -> Option<&IndirectReference> {
        self.slot(id.number).filter(|r| r.id == id)
    }

    /// Iterate over all slots in object number order
    pub fn iter(&self) -> impl Iterator<Item = &IndirectReference> {
        self.slots.iter().flatten()
    }

    /// Allocate a fresh reference, reusing a free slot when one is eligible
    pub fn create_next(&mut self) -> ObjectId {
        while let Some(number) = self.free_list.pop() {
            let reusable = self.slot(number).map_or(false, |r| {
                r.is_free()
                    && !r.state().contains(RefState::ORIGINAL_OBJECT_STREAM)
                    && r.id.generation < MAX_GENERATION
            });
            if reusable {
                if let Some(reference) = self.slots[number as usize].as_mut() {
                    reference.state.set(RefState::default());
                    reference.placement.set(Placement::Unplaced);
                    reference.refers_to = OnceCell::new();
                    trace!("Reusing free slot {}", reference.id);
                    return reference.id;
                }
            }
        }

        let number = self.slots.len().max(1) as u32;
        let id = ObjectId::new(number, 0);
        *self.slot_entry(number) = Some(IndirectReference::new(id));
        trace!("Allocated reference {}", id);
        id
    }

    /// Attach `value` to a newly allocated reference
    pub fn insert(&mut self, value: Value) -> ObjectId {
        let id = self.create_next();
        if let Some(reference) = self.slots[id.number as usize].as_mut() {
            reference.refers_to = OnceCell::from(value);
            reference.set_flag(RefState::MODIFIED);
        }
        id
    }

    /// Attach `value` to an explicit reference obtained from [`create_next`].
    ///
    /// [`create_next`]: ObjectRegistry::create_next
    pub fn attach(&mut self, id: ObjectId, value: Value) -> PdfResult<()> {
        let reference = self.live_mut(id)?;
        if reference.is_flushed() {
            return Err(PdfError::FlushedObject(id));
        }
        reference.refers_to = OnceCell::from(value);
        reference.set_flag(RefState::MODIFIED);
        Ok(())
    }

    fn live_mut(&mut self, id: ObjectId) -> PdfResult<&mut IndirectReference> {
        match self.slots.get_mut(id.number as usize).and_then(Option::as_mut) {
            Some(reference) if reference.id == id && !reference.is_free() => Ok(reference),
            Some(reference) if reference.id.number == id.number => Err(PdfError::FreedReference(id)),
            _ => Err(PdfError::ForeignReference(id)),
        }
    }

    /// Load the object behind `id`, reading it from the backing reader on
    /// first access. Free, flushed and unknown ids yield `None`.
    pub fn load(&self, id: ObjectId) -> PdfResult<Option<&Value>> {
        let Some(reference) = self.reference(id) else {
            return Ok(None);
        };
        if reference.is_free() {
            return Ok(None);
        }
        if let Some(value) = reference.refers_to.get() {
            return Ok(Some(value));
        }
        let state = reference.state();
        if state.contains(RefState::FLUSHED) || state.contains(RefState::READING) {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_deref() else {
            return Ok(None);
        };

        reference.set_flag(RefState::READING);
        let loaded = reference.refers_to.get_or_try_init(|| {
            trace!("Reading object {}", id);
            reader.read_object(id)?.ok_or(PdfError::ObjectNotFound(id))
        });
        reference.clear_flag(RefState::READING);

        match loaded {
            Ok(value) => Ok(Some(value)),
            Err(PdfError::ObjectNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Mutable access; marks the object modified. Flushed objects are
    /// immutable.
    pub fn get_mut(&mut self, id: ObjectId) -> PdfResult<&mut Value> {
        if self.reference(id).map_or(false, IndirectReference::is_flushed) {
            return Err(PdfError::FlushedObject(id));
        }
        self.load(id)?.ok_or(PdfError::ObjectNotFound(id))?;
        let reference = self.live_mut(id)?;
        reference.set_flag(RefState::MODIFIED);
        reference.refers_to.get_mut().ok_or(PdfError::ObjectNotFound(id))
    }

    /// Replace the object behind `id`
    pub fn set(&mut self, id: ObjectId, value: Value) -> PdfResult<()> {
        self.attach(id, value)
    }

    /// Mark `id` free: its value is released, its generation bumped and the
    /// slot queued for reuse. Original object stream slots stay unused.
    pub fn free(&mut self, id: ObjectId) -> PdfResult<()> {
        let reference = self.live_mut(id)?;
        reference.refers_to = OnceCell::new();
        reference.state.set(reference.state().with(RefState::FREE).without(RefState::MODIFIED));
        if reference.id.generation < MAX_GENERATION {
            reference.id.generation += 1;
            if !reference.state().contains(RefState::ORIGINAL_OBJECT_STREAM) {
                self.free_list.push(id.number);
            }
        }
        trace!("Freed {}", id);
        Ok(())
    }

    /// Mark a slot as an object stream taken over from the source file
    pub(crate) fn mark_original_object_stream(&mut self, id: ObjectId) -> PdfResult<()> {
        self.free(id)?;
        if let Some(reference) = self.slots[id.number as usize].as_mut() {
            reference.set_flag(RefState::ORIGINAL_OBJECT_STREAM);
        }
        self.free_list.retain(|&n| n != id.number);
        Ok(())
    }

    /// Take the value out for writing; loads it first if needed
    pub(crate) fn take_for_flush(&mut self, id: ObjectId) -> PdfResult<Option<Value>> {
        if self.reference(id).map_or(true, |r| r.is_free() || r.is_flushed()) {
            return Ok(None);
        }
        self.load(id)?;
        let reference = self.live_mut(id)?;
        Ok(reference.refers_to.take())
    }

    /// Record that `id` has been written at `placement`
    pub(crate) fn mark_flushed(&mut self, id: ObjectId, placement: Placement) {
        if let Some(reference) = self.slots.get(id.number as usize).and_then(Option::as_ref) {
            reference.placement.set(placement);
            reference.state.set(reference.state().with(RefState::FLUSHED).without(RefState::MODIFIED));
        }
    }

    /// Flag an object for flushing at the next opportunity
    pub(crate) fn mark_must_be_flushed(&self, id: ObjectId) {
        if let Some(reference) = self.reference(id) {
            reference.set_flag(RefState::MUST_BE_FLUSHED);
        }
    }

    /// Follow `id`. Without `recursive` one hop is taken; with it the chain
    /// of references is followed until a direct value, at most
    /// `MAX_REFERENCE_CHAIN` hops. Past the bound the last reference seen is
    /// returned.
    pub fn resolve(&self, id: ObjectId, recursive: bool) -> PdfResult<Value> {
        let mut current = id;
        let mut hops = 0;
        loop {
            let value = self.load(current)?.cloned().unwrap_or(Value::Null);
            match value {
                Value::Reference(next) if recursive => {
                    hops += 1;
                    if hops > MAX_REFERENCE_CHAIN {
                        warn!("Reference chain starting at {} exceeds {} hops, stopping at {}",
                              id, MAX_REFERENCE_CHAIN, next);
                        return Ok(Value::Reference(next));
                    }
                    current = next;
                }
                other => return Ok(other),
            }
        }
    }
}

impl Resolve for ObjectRegistry {
    fn lookup(&self, id: ObjectId) -> Option<&Value> {
        match self.load(id) {
            Ok(value) => value,
            Err(err) => {
                warn!("Could not read object {}: {}", id, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_allocation_and_lookup() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let a = registry.insert(Value::from(1));
        let b = registry.insert(Value::from(2));
        assert_eq!(a, ObjectId::new(1, 0));
        assert_eq!(b, ObjectId::new(2, 0));
        assert_eq!(registry.lookup(b), Some(&Value::from(2)));
        assert_eq!(registry.size(), 3);
        Ok(())
    }

    #[test]
    fn test_free_bumps_generation_and_reuses_slot() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let a = registry.insert(Value::from("A"));
        registry.free(a)?;
        assert_eq!(registry.lookup(a), None);
        assert!(registry.slot(1).map_or(false, IndirectReference::is_free));

        let reused = registry.create_next();
        assert_eq!(reused, ObjectId::new(1, 1));
        assert!(matches!(registry.attach(a, Value::Null), Err(PdfError::FreedReference(_))));
        Ok(())
    }

    #[test]
    fn test_max_generation_is_not_reused() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let a = registry.insert(Value::Null);
        registry.slots[1].as_mut().unwrap().id.generation = MAX_GENERATION;
        registry.free(ObjectId::new(a.number, MAX_GENERATION))?;
        assert_eq!(registry.create_next(), ObjectId::new(2, 0));
        Ok(())
    }

    #[test]
    fn test_flushed_objects_are_immutable() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let id = registry.insert(Value::from(5));
        let taken = registry.take_for_flush(id)?;
        assert_eq!(taken, Some(Value::from(5)));
        registry.mark_flushed(id, Placement::Offset(15));

        assert!(matches!(registry.get_mut(id), Err(PdfError::FlushedObject(_))));
        assert!(matches!(registry.set(id, Value::Null), Err(PdfError::FlushedObject(_))));
        assert_eq!(registry.reference(id).map(|r| r.placement()), Some(Placement::Offset(15)));
        Ok(())
    }

    #[test]
    fn test_chain_resolution_stops_at_direct_value() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let mut previous = registry.insert(Value::from("end"));
        for _ in 0..MAX_REFERENCE_CHAIN {
            previous = registry.insert(Value::Reference(previous));
        }
        assert_eq!(registry.resolve(previous, true)?, Value::from("end"));
        assert!(registry.resolve(previous, false)?.is_reference());
        Ok(())
    }

    #[test]
    fn test_cyclic_chain_terminates() -> PdfResult<()> {
        let mut registry = ObjectRegistry::new();
        let a = registry.create_next();
        let b = registry.create_next();
        registry.attach(a, Value::Reference(b))?;
        registry.attach(b, Value::Reference(a))?;
        assert!(registry.resolve(a, true)?.is_reference());
        Ok(())
    }

    #[test]
    fn test_reference_display() {
        let mut registry = ObjectRegistry::new();
        let id = registry.insert(Value::Null);
        let shown = registry.reference(id).map(ToString::to_string);
        assert_eq!(shown.as_deref(), Some("1 0 R [Modified]"));
        assert_eq!(Placement::from_parts(0, 17), Placement::Offset(17));
        assert_eq!(Placement::from_parts(9, 2), Placement::InObjectStream { stream: 9, index: 2 });
    }
}
