//! Fixed-capacity slot table
//!
//! Every GPU resource kind lives in one of these: a fixed array of slots,
//! each holding a value, an optional name for deduplication and a reference
//! count. Handles are `(index, generation)` pairs; the generation is bumped
//! whenever a free slot is populated, so a handle that outlived its slot is
//! detected instead of silently aliasing the next occupant.
//!
//! ```text
//! acquire_named("ship.tx") ──hit──▶ ref_count += 1, same handle
//!                          └─miss─▶ first free slot, create(), ref_count = 1
//! release(handle)          ───────▶ ref_count -= 1, at 0 hand the value back
//! ```
//!
//! Both lookups are linear scans. Callers are expected to cache handles
//! rather than re-acquiring by name every frame.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{RenderError, RenderResult};
use crate::foundation::hash::{name_hash, names_match};

/// Typed handle into a [`SlotTable`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the handle was issued with
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}:{})", self.index, self.generation)
    }
}

/// What happens to a slot's value when its count reaches zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Hand the value back to the owner and free the slot
    Free,
    /// Keep the value (and the slot) so a later lookup by name can
    /// reactivate it
    Retain,
}

/// Outcome of a release
#[derive(Debug)]
pub enum Released<T> {
    /// Other owners remain
    Retained {
        /// Remaining reference count
        remaining: u32,
    },
    /// The count reached zero and the slot is free; the owner must destroy
    /// the native object
    Freed(T),
    /// The count reached zero under [`ReleasePolicy::Retain`]; the value
    /// stays in its slot
    Dormant,
}

/// Outcome of a named acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// A new slot was populated
    Created,
    /// A live slot with the same name was shared
    Shared,
    /// A dormant slot with the same name was woken up
    Reactivated,
}

struct SlotName {
    text: String,
    hash: u32,
}

struct Slot<T> {
    value: Option<T>,
    name: Option<SlotName>,
    ref_count: u32,
    generation: u32,
}

impl<T> Slot<T> {
    fn is_free(&self) -> bool {
        self.ref_count == 0 && self.value.is_none()
    }
}

/// Fixed-capacity, reference-counted resource table
pub struct SlotTable<T> {
    label: &'static str,
    slots: Vec<Slot<T>>,
    policy: ReleasePolicy,
    live: usize,
}

impl<T> SlotTable<T> {
    /// Create a table with `capacity` slots
    ///
    /// `label` names the table in logs and errors.
    pub fn new(label: &'static str, capacity: usize, policy: ReleasePolicy) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                value: None,
                name: None,
                ref_count: 0,
                generation: 0,
            })
            .collect();
        Self {
            label,
            slots,
            policy,
            live: 0,
        }
    }

    /// Table label
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a value
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether no slot holds a value
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Look up a named slot without touching its count
    pub fn find(&self, name: &str) -> Option<Handle<T>> {
        let hash = name_hash(name);
        self.find_hashed(name, hash).map(|index| self.handle_at(index))
    }

    /// Share a named slot, or populate a free one with `create`
    ///
    /// A live match gets its count bumped; a dormant match (retain policy)
    /// is woken with a count of one and `reactivate` is run on its value.
    /// On a miss `create` runs only after a free slot was found, so a full
    /// table never allocates.
    pub fn acquire_named<C, R>(
        &mut self,
        name: &str,
        create: C,
        reactivate: R,
    ) -> RenderResult<(Handle<T>, Acquired)>
    where
        C: FnOnce() -> RenderResult<T>,
        R: FnOnce(&mut T) -> RenderResult<()>,
    {
        let hash = name_hash(name);
        if let Some(index) = self.find_hashed(name, hash) {
            let slot = &mut self.slots[index];
            if slot.ref_count > 0 {
                slot.ref_count += 1;
                log::debug!("{} '{}' shared, refs={}", self.label, name, slot.ref_count);
                return Ok((self.handle_at(index), Acquired::Shared));
            }
            if let Some(value) = slot.value.as_mut() {
                reactivate(value)?;
            }
            slot.ref_count = 1;
            log::debug!("{} '{}' reactivated", self.label, name);
            return Ok((self.handle_at(index), Acquired::Reactivated));
        }

        let index = self.free_slot()?;
        let value = create()?;
        let handle = self.populate(index, value, Some(SlotName { text: name.to_string(), hash }));
        log::debug!("{} '{}' created in slot {}", self.label, name, index);
        Ok((handle, Acquired::Created))
    }

    /// Populate a free slot with an unnamed value
    pub fn insert(&mut self, value: T) -> RenderResult<Handle<T>> {
        let index = self.free_slot()?;
        Ok(self.populate(index, value, None))
    }

    /// Populate a free slot with an unnamed value produced by `create`
    ///
    /// `create` only runs once a free slot is known to exist.
    pub fn insert_with<C>(&mut self, create: C) -> RenderResult<Handle<T>>
    where
        C: FnOnce() -> RenderResult<T>,
    {
        let index = self.free_slot()?;
        let value = create()?;
        Ok(self.populate(index, value, None))
    }

    /// Drop one reference
    pub fn release(&mut self, handle: Handle<T>) -> RenderResult<Released<T>> {
        let index = self.check(handle)?;
        let (label, policy) = (self.label, self.policy);
        let slot = &mut self.slots[index];
        if slot.ref_count == 0 {
            log::error!("{} slot {} released more times than acquired", label, index);
            return Err(RenderError::OverRelease {
                table: label,
                index: handle.index,
            });
        }

        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            return Ok(Released::Retained {
                remaining: slot.ref_count,
            });
        }

        match policy {
            ReleasePolicy::Retain => Ok(Released::Dormant),
            ReleasePolicy::Free => {
                slot.name = None;
                let value = slot.value.take();
                self.live -= 1;
                Ok(value.map_or(Released::Dormant, Released::Freed))
            }
        }
    }

    /// Add a reference to a live slot, returning the new count
    pub fn inc_reference(&mut self, handle: Handle<T>) -> RenderResult<u32> {
        let index = self.check(handle)?;
        if self.slots[index].is_free() {
            return Err(self.stale(handle));
        }
        let slot = &mut self.slots[index];
        slot.ref_count += 1;
        Ok(slot.ref_count)
    }

    /// Reference count of a slot
    pub fn ref_count(&self, handle: Handle<T>) -> RenderResult<u32> {
        let index = self.check(handle)?;
        Ok(self.slots[index].ref_count)
    }

    /// Name of a slot, if it was created by name
    pub fn name(&self, handle: Handle<T>) -> RenderResult<Option<&str>> {
        let index = self.check(handle)?;
        Ok(self.slots[index].name.as_ref().map(|n| n.text.as_str()))
    }

    /// Borrow a slot's value
    pub fn get(&self, handle: Handle<T>) -> RenderResult<&T> {
        let index = self.check(handle)?;
        self.slots[index].value.as_ref().ok_or_else(|| self.stale(handle))
    }

    /// Mutably borrow a slot's value
    pub fn get_mut(&mut self, handle: Handle<T>) -> RenderResult<&mut T> {
        let index = self.check(handle)?;
        let stale = self.stale(handle);
        self.slots[index].value.as_mut().ok_or(stale)
    }

    /// Live slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Live slots in index order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(index as u32, generation), value))
        })
    }

    fn find_hashed(&self, name: &str, hash: u32) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.value.is_some()
                && slot
                    .name
                    .as_ref()
                    .is_some_and(|n| names_match(n.hash, &n.text, hash, name))
        })
    }

    fn free_slot(&self) -> RenderResult<usize> {
        self.slots.iter().position(Slot::is_free).ok_or_else(|| {
            log::error!("{} table exhausted ({} slots)", self.label, self.slots.len());
            RenderError::TableExhausted {
                table: self.label,
                capacity: self.slots.len(),
            }
        })
    }

    fn populate(&mut self, index: usize, value: T, name: Option<SlotName>) -> Handle<T> {
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        slot.name = name;
        slot.ref_count = 1;
        self.live += 1;
        Handle::new(index as u32, slot.generation)
    }

    fn handle_at(&self, index: usize) -> Handle<T> {
        Handle::new(index as u32, self.slots[index].generation)
    }

    fn check(&self, handle: Handle<T>) -> RenderResult<usize> {
        let index = handle.index as usize;
        let Some(slot) = self.slots.get(index) else {
            return Err(RenderError::InvalidHandle {
                table: self.label,
                index: handle.index,
            });
        };
        if slot.generation != handle.generation {
            log::warn!(
                "{} handle {:?} is stale (slot at generation {})",
                self.label,
                handle,
                slot.generation
            );
            return Err(self.stale(handle));
        }
        Ok(index)
    }

    fn stale(&self, handle: Handle<T>) -> RenderError {
        RenderError::StaleHandle {
            table: self.label,
            index: handle.index,
            generation: handle.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(
        table: &mut SlotTable<String>,
        name: &str,
    ) -> RenderResult<(Handle<String>, Acquired)> {
        table.acquire_named(name, || Ok(name.to_uppercase()), |_| Ok(()))
    }

    #[test]
    fn test_same_name_shares_slot() {
        let mut table = SlotTable::new("test", 4, ReleasePolicy::Free);
        let (a, first) = named(&mut table, "ship.tx").expect("Should create");
        let (b, second) = named(&mut table, "SHIP.TX").expect("Should share");
        assert_eq!(a, b);
        assert_eq!(first, Acquired::Created);
        assert_eq!(second, Acquired::Shared);
        assert_eq!(table.ref_count(a).expect("Should be live"), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_different_names_get_different_slots() {
        let mut table = SlotTable::new("test", 4, ReleasePolicy::Free);
        let (a, _) = named(&mut table, "ship.tx").expect("Should create");
        let (b, _) = named(&mut table, "sail.tx").expect("Should create");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_release_then_over_release() {
        let mut table = SlotTable::new("test", 4, ReleasePolicy::Free);
        let (h, _) = named(&mut table, "ship.tx").expect("Should create");
        named(&mut table, "ship.tx").expect("Should share");

        assert!(matches!(table.release(h), Ok(Released::Retained { remaining: 1 })));
        match table.release(h) {
            Ok(Released::Freed(value)) => assert_eq!(value, "SHIP.TX"),
            other => panic!("Should free the slot, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(table.release(h), Err(RenderError::OverRelease { .. })));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reuse_makes_old_handle_stale() {
        let mut table = SlotTable::new("test", 1, ReleasePolicy::Free);
        let old = table.insert("a".to_string()).expect("Should insert");
        table.release(old).expect("Should release");
        let new = table.insert("b".to_string()).expect("Should reuse slot");

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(matches!(table.get(old), Err(RenderError::StaleHandle { .. })));
        assert!(matches!(table.release(old), Err(RenderError::StaleHandle { .. })));
        assert_eq!(table.get(new).expect("Should be live"), "b");
    }

    #[test]
    fn test_full_release_frees_every_slot() {
        let mut table = SlotTable::new("test", 3, ReleasePolicy::Free);
        let handles: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| named(&mut table, n).expect("Should create").0)
            .collect();
        assert!(matches!(
            named(&mut table, "d"),
            Err(RenderError::TableExhausted { capacity: 3, .. })
        ));

        for h in &handles {
            table.release(*h).expect("Should release");
        }
        assert!(table.is_empty());
        for n in ["d", "e", "f"] {
            named(&mut table, n).expect("Should reuse a free slot");
        }
    }

    #[test]
    fn test_exhausted_table_does_not_run_create() {
        let mut table = SlotTable::new("test", 0, ReleasePolicy::Free);
        let mut ran = false;
        let result = table.insert_with(|| {
            ran = true;
            Ok(1)
        });
        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn test_failed_create_leaves_slot_free() {
        let mut table: SlotTable<u32> = SlotTable::new("test", 1, ReleasePolicy::Free);
        let failed =
            table.acquire_named("x", || Err(RenderError::not_found("x", "missing")), |_| Ok(()));
        assert!(matches!(failed, Err(RenderError::ResourceNotFound { .. })));
        assert!(table.is_empty());
        assert!(table.insert(7).is_ok());
    }

    #[test]
    fn test_retain_policy_reactivates() {
        let mut table = SlotTable::new("font", 2, ReleasePolicy::Retain);
        let (h, _) = named(&mut table, "normal").expect("Should create");
        assert!(matches!(table.release(h), Ok(Released::Dormant)));
        assert_eq!(table.len(), 1);

        let mut woke = false;
        let (again, how) = table
            .acquire_named("NORMAL", || Ok(String::new()), |_| {
                woke = true;
                Ok(())
            })
            .expect("Should reactivate");
        assert_eq!(again, h);
        assert_eq!(how, Acquired::Reactivated);
        assert!(woke);
        assert_eq!(table.ref_count(h).expect("Should be live"), 1);
    }

    #[test]
    fn test_inc_reference_and_iteration_order() {
        let mut table = SlotTable::new("test", 4, ReleasePolicy::Free);
        let a = table.insert(1).expect("Should insert");
        let b = table.insert(2).expect("Should insert");
        assert_eq!(table.inc_reference(a).expect("Should bump"), 2);
        let values: Vec<_> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 2]);
        table.release(b).expect("Should release");
        assert!(matches!(table.inc_reference(b), Err(RenderError::StaleHandle { .. })));
    }

    #[test]
    fn test_out_of_range_handle() {
        let mut big = SlotTable::new("big", 8, ReleasePolicy::Free);
        let mut h = big.insert(0).expect("Should insert");
        for v in 1..8 {
            h = big.insert(v).expect("Should insert");
        }
        let small: SlotTable<i32> = SlotTable::new("small", 2, ReleasePolicy::Free);
        assert!(matches!(small.get(h), Err(RenderError::InvalidHandle { .. })));
    }
}
