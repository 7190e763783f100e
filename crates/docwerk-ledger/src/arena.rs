// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Arena plus index: values live in a slot vector, a hash map points from key
// to slot, and freed slots are reused. Each slot remembers when it was last
// touched so callers can evict by age.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Utc};

struct Slot<K, V> {
    key: K,
    value: V,
    touched: DateTime<Utc>,
}

pub struct ExpiringArena<K, V> {
    slots: Vec<Option<Slot<K, V>>>,
    index: HashMap<K, usize>,
    free: Vec<usize>,
}

impl<K: Hash + Eq + Clone, V> Default for ExpiringArena<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> ExpiringArena<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.slots.get(slot)?.as_ref().map(|s| &s.value)
    }

    /// Mutable access that also marks the entry as touched at `now`.
    pub fn get_mut(&mut self, key: &K, now: DateTime<Utc>) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        let entry = self.slots.get_mut(slot)?.as_mut()?;
        entry.touched = now;
        Some(&mut entry.value)
    }

    pub fn touched_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let slot = *self.index.get(key)?;
        self.slots.get(slot)?.as_ref().map(|s| s.touched)
    }

    /// Insert or replace. Returns the previous value for `key`, if any.
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) -> Option<V> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.slots[slot].as_mut() {
                entry.touched = now;
                return Some(std::mem::replace(&mut entry.value, value));
            }
        }

        let slot = self.vacant_slot(&key);
        self.slots[slot] = Some(Slot {
            key,
            value,
            touched: now,
        });
        None
    }

    /// The value for `key`, created with `make` when absent. Touches either way.
    pub fn get_or_insert_with(&mut self, key: K, now: DateTime<Utc>, make: impl FnOnce() -> V) -> &mut V {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => self.vacant_slot(&key),
        };
        let entry = self.slots[slot].get_or_insert_with(|| Slot {
            key,
            value: make(),
            touched: now,
        });
        entry.touched = now;
        &mut entry.value
    }

    /// Reserve a slot for `key`, reusing a freed one when possible.
    fn vacant_slot(&mut self, key: &K) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.index.insert(key.clone(), slot);
        slot
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        let entry = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(entry.value)
    }

    /// Remove every entry for which `expired(key, value, touched)` holds and
    /// return how many went.
    pub fn evict_where(&mut self, mut expired: impl FnMut(&K, &V, DateTime<Utc>) -> bool) -> usize {
        let mut evicted = 0;
        for slot in 0..self.slots.len() {
            let gone = match &self.slots[slot] {
                Some(entry) => expired(&entry.key, &entry.value, entry.touched),
                None => false,
            };
            if gone {
                if let Some(entry) = self.slots[slot].take() {
                    self.index.remove(&entry.key);
                    self.free.push(slot);
                    evicted += 1;
                }
            }
        }
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|s| (&s.key, &s.value)))
    }

    /// Entries with the time each was last touched.
    pub fn iter_touched(&self) -> impl Iterator<Item = (&K, &V, DateTime<Utc>)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|s| (&s.key, &s.value, s.touched)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}
