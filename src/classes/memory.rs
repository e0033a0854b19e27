// src/classes/memory.rs

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::EquivalenceClassStore;
use crate::error::{DedupeError, Result};

#[derive(Serialize, Deserialize)]
struct ClassEntry {
    id: String,
    clid: u32,
}

/// Snapshot format mirrors the durable backing: one row per membership.
#[derive(Serialize, Deserialize)]
struct ClassSnapshot {
    saved_at: DateTime<Utc>,
    classes: Vec<ClassEntry>,
}

/// In-memory equivalence-class store: a path-compressed, rank-united
/// union-find over interned identifiers. Member lists are grafted smaller
/// onto larger at each merge, so `class_of` is proportional to the class
/// size rather than the store size.
///
/// Class ids are dense and allocated from a counter; a merge keeps the class
/// id of the first identifier of the link, the same rule the durable store
/// applies with its bulk rewrite.
///
/// With a snapshot path configured, `commit` persists every membership as a
/// `(id, clid)` pair and `open` restores it.
#[derive(Default)]
pub struct MemoryClassStore {
    slots: HashMap<String, usize>,
    ids: Vec<String>,
    parent: Vec<usize>,
    rank: Vec<u8>,
    /// root slot -> class id
    class_ids: HashMap<usize, u32>,
    /// root slot -> member slots, including the root
    members: HashMap<usize, Vec<usize>>,
    next_class_id: u32,
    path: Option<PathBuf>,
    dirty: bool,
}

impl MemoryClassStore {
    pub fn new() -> Self {
        MemoryClassStore::default()
    }

    /// Durable variant backed by a JSON snapshot file. The snapshot is
    /// loaded if present and rewritten on every `commit`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = MemoryClassStore {
            path: Some(path.clone()),
            ..MemoryClassStore::default()
        };
        if path.exists() {
            let data = fs::read(&path)?;
            let snapshot: ClassSnapshot = serde_json::from_slice(&data)
                .map_err(|e| DedupeError::backing("equivalence-class snapshot decode failed", e))?;
            store.load(snapshot.classes);
            debug!(
                "loaded {} identifiers in {} classes from {}",
                store.slots.len(),
                store.class_ids.len(),
                path.display()
            );
        }
        Ok(store)
    }

    pub fn add_link(&mut self, id1: &str, id2: &str) {
        let s1 = self.intern(id1);
        let s2 = self.intern(id2);
        let r1 = self.find(s1);
        let r2 = self.find(s2);

        if r1 == r2 {
            // a self-link on a fresh identifier still allocates its class
            if !self.class_ids.contains_key(&r1) {
                let class_id = self.next_class_id;
                self.next_class_id += 1;
                self.class_ids.insert(r1, class_id);
                self.members.insert(r1, vec![r1]);
                self.dirty = true;
            }
            return;
        }

        let class_id = match (self.class_ids.get(&r1), self.class_ids.get(&r2)) {
            (Some(&c1), _) => c1, // id1's class survives a merge
            (None, Some(&c2)) => c2,
            (None, None) => {
                let fresh = self.next_class_id;
                self.next_class_id += 1;
                fresh
            }
        };

        let m1 = self.members.remove(&r1).unwrap_or_else(|| vec![r1]);
        let m2 = self.members.remove(&r2).unwrap_or_else(|| vec![r2]);
        self.class_ids.remove(&r1);
        self.class_ids.remove(&r2);

        // union by rank
        let root = if self.rank[r1] >= self.rank[r2] {
            self.parent[r2] = r1;
            if self.rank[r1] == self.rank[r2] {
                self.rank[r1] += 1;
            }
            r1
        } else {
            self.parent[r1] = r2;
            r2
        };

        // graft the smaller member list onto the larger
        let (mut merged, grafted) = if m1.len() >= m2.len() { (m1, m2) } else { (m2, m1) };
        merged.extend(grafted);
        self.members.insert(root, merged);
        self.class_ids.insert(root, class_id);
        self.dirty = true;
    }

    pub fn class_id(&self, id: &str) -> Option<u32> {
        let &slot = self.slots.get(id)?;
        self.class_ids.get(&self.find_readonly(slot)).copied()
    }

    pub fn class_of(&self, id: &str) -> Vec<String> {
        let Some(&slot) = self.slots.get(id) else {
            return Vec::new();
        };
        let root = self.find_readonly(slot);
        self.members
            .get(&root)
            .map(|members| members.iter().map(|&s| self.ids[s].clone()).collect())
            .unwrap_or_default()
    }

    pub fn class_count(&self) -> usize {
        self.class_ids.len()
    }

    pub fn commit(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let mut classes = Vec::with_capacity(self.slots.len());
        for (id, &slot) in &self.slots {
            let root = self.find_readonly(slot);
            if let Some(&clid) = self.class_ids.get(&root) {
                classes.push(ClassEntry {
                    id: id.clone(),
                    clid,
                });
            }
        }
        let snapshot = ClassSnapshot {
            saved_at: Utc::now(),
            classes,
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| DedupeError::backing("equivalence-class snapshot encode failed", e))?;
        fs::write(&path, json)?;
        self.dirty = false;
        Ok(())
    }

    fn intern(&mut self, id: &str) -> usize {
        if let Some(&slot) = self.slots.get(id) {
            return slot;
        }
        let slot = self.parent.len();
        self.slots.insert(id.to_string(), slot);
        self.ids.push(id.to_string());
        self.parent.push(slot);
        self.rank.push(0);
        slot
    }

    fn find(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut current = slot;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn find_readonly(&self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        root
    }

    fn load(&mut self, entries: Vec<ClassEntry>) {
        let mut by_class: HashMap<u32, Vec<String>> = HashMap::new();
        for entry in entries {
            by_class.entry(entry.clid).or_default().push(entry.id);
        }
        for (clid, ids) in by_class {
            let slots: Vec<usize> = ids.iter().map(|id| self.intern(id)).collect();
            let root = slots[0];
            for &slot in &slots[1..] {
                self.parent[slot] = root;
            }
            if slots.len() > 1 {
                self.rank[root] = 1;
            }
            self.class_ids.insert(root, clid);
            self.members.insert(root, slots);
            self.next_class_id = self.next_class_id.max(clid + 1);
        }
    }
}

#[async_trait]
impl EquivalenceClassStore for MemoryClassStore {
    async fn add_link(&mut self, id1: &str, id2: &str) -> Result<()> {
        MemoryClassStore::add_link(self, id1, id2);
        Ok(())
    }

    async fn class_id(&self, id: &str) -> Result<Option<u32>> {
        Ok(MemoryClassStore::class_id(self, id))
    }

    async fn class_of(&self, id: &str) -> Result<Vec<String>> {
        Ok(MemoryClassStore::class_of(self, id))
    }

    async fn class_count(&self) -> Result<usize> {
        Ok(MemoryClassStore::class_count(self))
    }

    async fn commit(&mut self) -> Result<()> {
        MemoryClassStore::commit(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut members: Vec<String>) -> Vec<String> {
        members.sort();
        members
    }

    #[test]
    fn linked_chains_collapse_into_one_class() {
        let mut store = MemoryClassStore::new();
        store.add_link("A", "B");
        store.add_link("C", "D");
        store.add_link("B", "C");

        assert_eq!(sorted(store.class_of("A")), ["A", "B", "C", "D"]);
        assert_eq!(store.class_count(), 1);
        let clid = store.class_id("A");
        for id in ["B", "C", "D"] {
            assert_eq!(store.class_id(id), clid);
        }
    }

    #[test]
    fn fresh_pair_allocates_a_dense_class_id() {
        let mut store = MemoryClassStore::new();
        store.add_link("a", "b");
        store.add_link("c", "d");
        assert_eq!(store.class_id("a"), Some(0));
        assert_eq!(store.class_id("c"), Some(1));
        assert_eq!(store.class_count(), 2);
    }

    #[test]
    fn unseen_id_adopts_the_existing_class() {
        let mut store = MemoryClassStore::new();
        store.add_link("a", "b");
        store.add_link("b", "c");
        assert_eq!(store.class_id("c"), store.class_id("a"));
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn relinking_within_a_class_is_a_noop() {
        let mut store = MemoryClassStore::new();
        store.add_link("a", "b");
        store.add_link("b", "c");
        let before = sorted(store.class_of("a"));
        store.add_link("a", "c");
        assert_eq!(sorted(store.class_of("a")), before);
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn merge_keeps_the_first_identifiers_class_id() {
        let mut store = MemoryClassStore::new();
        store.add_link("a", "b"); // class 0
        store.add_link("c", "d"); // class 1
        store.add_link("a", "c");
        for id in ["a", "b", "c", "d"] {
            assert_eq!(store.class_id(id), Some(0));
        }
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn unseen_identifier_has_no_class() {
        let store = MemoryClassStore::new();
        assert_eq!(store.class_id("ghost"), None);
        assert!(store.class_of("ghost").is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.json");

        let mut store = MemoryClassStore::open(&path).unwrap();
        store.add_link("a", "b");
        store.add_link("c", "d");
        store.add_link("b", "c");
        store.add_link("x", "y");
        store.commit().unwrap();
        drop(store);

        let reopened = MemoryClassStore::open(&path).unwrap();
        assert_eq!(sorted(reopened.class_of("a")), ["a", "b", "c", "d"]);
        assert_eq!(reopened.class_of("x").len(), 2);
        assert_eq!(reopened.class_count(), 2);
        assert_eq!(reopened.class_id("a"), Some(0));
    }

    #[test]
    fn class_ids_continue_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.json");

        let mut store = MemoryClassStore::open(&path).unwrap();
        store.add_link("a", "b");
        store.commit().unwrap();
        drop(store);

        let mut reopened = MemoryClassStore::open(&path).unwrap();
        reopened.add_link("p", "q");
        assert_eq!(reopened.class_id("p"), Some(1));
    }
}
