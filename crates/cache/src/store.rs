//! Slot store — the capacity-bounded index of resident slots.
//!
//! A plain container: it enforces `len() <= capacity` but never evicts on its
//! own. Eviction decisions belong to the cache. Not synchronized; the cache
//! wraps it in its index lock.

use emoterelay_core::error::SlotError;
use emoterelay_core::slot::Slot;
use std::collections::HashMap;

#[derive(Debug)]
struct Entry {
    slot: Slot,
    /// Insertion sequence, used for deterministic snapshots.
    seq: u64,
}

#[derive(Debug)]
pub struct SlotStore {
    capacity: usize,
    slots: HashMap<String, Entry>,
    next_seq: u64,
}

impl SlotStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name).map(|e| &e.slot)
    }

    /// Insert a slot.
    ///
    /// Replacing a slot under an existing name never grows the store; a new
    /// name on a full store fails with [`SlotError::CapacityExceeded`].
    pub fn put(&mut self, slot: Slot) -> Result<(), SlotError> {
        if !self.slots.contains_key(&slot.name) && self.is_full() {
            return Err(SlotError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(slot.name.clone(), Entry { slot, seq });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Slot> {
        self.slots.remove(name).map(|e| e.slot)
    }

    /// Increment a slot's use count. Missing names are a no-op.
    pub fn increment_use(&mut self, name: &str) -> Option<&Slot> {
        let entry = self.slots.get_mut(name)?;
        entry.slot.use_count = entry.slot.use_count.saturating_add(1);
        Some(&entry.slot)
    }

    /// Snapshot of every resident slot in insertion order.
    pub fn all(&self) -> Vec<Slot> {
        let mut entries: Vec<&Entry> = self.slots.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.slot.clone()).collect()
    }

    /// Warm-start from platform-reported slots.
    ///
    /// Loads slots until the store is full and hands back the ones that did
    /// not fit.
    pub fn populate(&mut self, slots: impl IntoIterator<Item = Slot>) -> Vec<Slot> {
        let mut overflow = Vec::new();
        for slot in slots {
            if let Err(SlotError::CapacityExceeded { .. }) = self.put(slot.clone()) {
                overflow.push(slot);
            }
        }
        overflow
    }

    /// Remove every slot, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<Slot> {
        let slots = self.all();
        self.slots.clear();
        slots
    }
}
