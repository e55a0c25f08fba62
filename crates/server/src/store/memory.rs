// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
struct Tables {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, Vec<String>>,
}

/// In-process store. Visible to this process only.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::Acquire) {
            anyhow::bail!("memory store unavailable");
        }
        Ok(())
    }

    pub fn hash_set(&self, key: &str, field: &str, value: &str) -> anyhow::Result<()> {
        self.check()?;
        let mut t = self.tables.lock();
        t.hashes.entry(key.to_owned()).or_default().insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    pub fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> anyhow::Result<bool> {
        self.check()?;
        let mut t = self.tables.lock();
        let hash = t.hashes.entry(key.to_owned()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_owned(), value.to_owned());
        Ok(true)
    }

    pub fn hash_get(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    pub fn hash_del(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        self.check()?;
        let mut t = self.tables.lock();
        let Some(hash) = t.hashes.get_mut(key) else {
            return Ok(false);
        };
        let removed = hash.remove(field).is_some();
        if hash.is_empty() {
            t.hashes.remove(key);
        }
        Ok(removed)
    }

    pub fn hash_exists(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.hashes.get(key).is_some_and(|h| h.contains_key(field)))
    }

    pub fn hash_len(&self, key: &str) -> anyhow::Result<u64> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.hashes.get(key).map_or(0, |h| h.len() as u64))
    }

    pub fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.check()?;
        let mut t = self.tables.lock();
        Ok(t.sets.entry(key.to_owned()).or_default().insert(member.to_owned()))
    }

    pub fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.check()?;
        let mut t = self.tables.lock();
        let Some(set) = t.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            t.sets.remove(key);
        }
        Ok(removed)
    }

    pub fn set_card(&self, key: &str) -> anyhow::Result<u64> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.sets.get(key).map_or(0, |s| s.len() as u64))
    }

    pub fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    pub fn nested_set_add(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        self.check()?;
        let mut t = self.tables.lock();
        t.sets.entry(child_key.to_owned()).or_default().insert(child_member.to_owned());
        let parent = t.sets.entry(parent_key.to_owned()).or_default();
        parent.insert(parent_member.to_owned());
        Ok(parent.len() as u64)
    }

    pub fn nested_set_remove(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        self.check()?;
        let mut t = self.tables.lock();
        let child_empty = match t.sets.get_mut(child_key) {
            Some(set) => {
                set.remove(child_member);
                set.is_empty()
            }
            None => true,
        };
        if child_empty {
            t.sets.remove(child_key);
            if let Some(parent) = t.sets.get_mut(parent_key) {
                parent.remove(parent_member);
                if parent.is_empty() {
                    t.sets.remove(parent_key);
                }
            }
        }
        Ok(t.sets.get(parent_key).map_or(0, |s| s.len() as u64))
    }

    pub fn list_push(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.check()?;
        let mut t = self.tables.lock();
        t.lists.entry(key.to_owned()).or_default().push(value.to_owned());
        Ok(())
    }

    pub fn list_range(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.check()?;
        let t = self.tables.lock();
        Ok(t.lists.get(key).cloned().unwrap_or_default())
    }
}
