//! External id ⇄ dense index mapping.
//!
//! [`IdIndexer`] is the build-phase form: a hash map plus the key list in
//! insertion order. [`LfIndexer`] is the frozen form used after bulk load:
//! an open-addressing slot table over a dense key array, both held in
//! mapped buffers.
//!
//! # LfIndexer file layout
//! ```text
//! [0..32)  header { magic:u64, num:u64, key_capacity:u64, slot_capacity:u64 }
//! [32..)   keys:  num × i64
//!          slots: slot_capacity × u32   (u32::MAX = empty)
//! ```

use crate::arena::{AnonArray, ArrayView};
use crate::error::{GraphError, Result};
use crate::types::{Oid, Vid};
use ahash::AHashMap;
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::Path;

const LFI_MAGIC: u64 = 0x4C46_4944_5830_0001;
const HEADER_SIZE: usize = 32;
const EMPTY_SLOT: u32 = u32::MAX;

// ── build phase ──────────────────────────────────────────────────────────────

/// Insertion-ordered key → index map. Indices are dense from 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<K>", into = "Vec<K>")]
#[serde(bound(serialize = "K: Serialize + Clone", deserialize = "K: DeserializeOwned + Hash + Eq + Clone"))]
pub struct IdIndexer<K> {
    keys: Vec<K>,
    indices: AHashMap<K, usize>,
}

impl<K: Hash + Eq + Clone> IdIndexer<K> {
    pub fn new() -> Self {
        Self { keys: Vec::new(), indices: AHashMap::new() }
    }

    /// Index of `key`, assigning the next one if it is new.
    pub fn add(&mut self, key: K) -> usize {
        self.insert(key).0
    }

    /// Returns `(index, true)` when `key` was newly added.
    pub fn insert(&mut self, key: K) -> (usize, bool) {
        if let Some(&idx) = self.indices.get(&key) {
            return (idx, false);
        }
        let idx = self.keys.len();
        self.indices.insert(key.clone(), idx);
        self.keys.push(key);
        (idx, true)
    }

    pub fn get_index<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.indices.get(key).copied()
    }

    pub fn get_key(&self, idx: usize) -> Option<&K> {
        self.keys.get(idx)
    }

    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Pre-size for `expected` keys so bulk insertion does not rehash.
    pub fn rehash(&mut self, expected: usize) {
        let extra = expected.saturating_sub(self.keys.len());
        self.keys.reserve(extra);
        self.indices.reserve(extra);
    }
}

impl<K: Hash + Eq + Clone> Default for IdIndexer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> From<Vec<K>> for IdIndexer<K> {
    fn from(keys: Vec<K>) -> Self {
        let mut indexer = IdIndexer::new();
        indexer.rehash(keys.len());
        for key in keys {
            indexer.add(key);
        }
        indexer
    }
}

impl<K> From<IdIndexer<K>> for Vec<K> {
    fn from(indexer: IdIndexer<K>) -> Self {
        indexer.keys
    }
}

impl IdIndexer<Oid> {
    /// Freeze into the lookup-optimised form.
    pub fn build_lf_indexer(&self) -> Result<LfIndexer> {
        LfIndexer::from_keys(&self.keys)
    }
}

// ── frozen ───────────────────────────────────────────────────────────────────

#[inline]
fn hash_oid(oid: Oid) -> u64 {
    seahash::hash(&oid.to_le_bytes())
}

/// Slot count for `n` keys at ≤ 65% load, rounded to a power of two.
fn slot_capacity_for(n: usize) -> usize {
    (((n as f64) / 0.65).ceil() as usize).max(16).next_power_of_two()
}

pub struct LfIndexer {
    keys: AnonArray<Oid>,
    slots: AnonArray<u32>,
    num: usize,
}

impl LfIndexer {
    pub fn new() -> Self {
        Self { keys: AnonArray::new(), slots: AnonArray::new(), num: 0 }
    }

    pub fn from_keys(keys: &[Oid]) -> Result<Self> {
        let mut indexer = Self {
            keys: AnonArray::from_slice(keys)?,
            slots: AnonArray::new(),
            num: keys.len(),
        };
        indexer.rebuild_slots(slot_capacity_for(keys.len()))?;
        Ok(indexer)
    }

    fn rebuild_slots(&mut self, capacity: usize) -> Result<()> {
        let slots = AnonArray::<u32>::with_len(capacity)?;
        for i in 0..capacity {
            slots.set(i, EMPTY_SLOT);
        }
        let mask = capacity - 1;
        for vid in 0..self.num {
            let mut pos = hash_oid(self.keys.get(vid)) as usize & mask;
            while slots.get(pos) != EMPTY_SLOT {
                pos = (pos + 1) & mask;
            }
            slots.set(pos, vid as u32);
        }
        self.slots = slots;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.num
    }

    pub fn get_index(&self, oid: Oid) -> Option<Vid> {
        let capacity = self.slots.len();
        if capacity == 0 {
            return None;
        }
        let mask = capacity - 1;
        let mut pos = hash_oid(oid) as usize & mask;
        for _ in 0..capacity {
            let vid = self.slots.get(pos);
            if vid == EMPTY_SLOT {
                return None;
            }
            if self.keys.get(vid as usize) == oid {
                return Some(vid);
            }
            pos = (pos + 1) & mask;
        }
        None
    }

    pub fn get_key(&self, vid: Vid) -> Option<Oid> {
        ((vid as usize) < self.num).then(|| self.keys.get(vid as usize))
    }

    /// Append a new external id after freezing. Existing ids return their index.
    pub fn insert(&mut self, oid: Oid) -> Result<Vid> {
        if let Some(vid) = self.get_index(oid) {
            return Ok(vid);
        }
        if self.num >= EMPTY_SLOT as usize {
            return Err(GraphError::CapacityExceeded { what: "vertex id", capacity: EMPTY_SLOT as usize });
        }
        if self.num == self.keys.len() {
            let grown = (self.num + self.num / 5).max(self.num + 1).max(1024);
            self.keys.resize(grown)?;
        }
        self.keys.set(self.num, oid);
        self.num += 1;
        if slot_capacity_for(self.num) > self.slots.len() {
            self.rebuild_slots(slot_capacity_for(self.num))?;
        } else {
            let mask = self.slots.len() - 1;
            let mut pos = hash_oid(oid) as usize & mask;
            while self.slots.get(pos) != EMPTY_SLOT {
                pos = (pos + 1) & mask;
            }
            self.slots.set(pos, (self.num - 1) as u32);
        }
        Ok((self.num - 1) as Vid)
    }

    pub fn keys(&self) -> &[Oid] {
        &self.keys.as_slice()[..self.num]
    }

    pub fn serialize(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        for word in [LFI_MAGIC, self.num as u64, self.num as u64, self.slots.len() as u64] {
            w.write_all(&word.to_le_bytes())?;
        }
        w.write_all(bytemuck::cast_slice(self.keys()))?;
        w.write_all(bytemuck::cast_slice(self.slots.as_slice()))?;
        w.flush()?;
        Ok(())
    }

    pub fn deserialize(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(GraphError::corrupt(path, "truncated indexer header"));
        }
        let map = unsafe { Mmap::map(&file)? };
        let word = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&map[i * 8..i * 8 + 8]);
            u64::from_le_bytes(b) as usize
        };
        if word(0) as u64 != LFI_MAGIC {
            return Err(GraphError::corrupt(path, "bad indexer magic"));
        }
        let (num, key_cap, slot_cap) = (word(1), word(2), word(3));
        let keys_end = key_cap.checked_mul(8).and_then(|k| k.checked_add(HEADER_SIZE));
        let slots_end = keys_end.and_then(|k| slot_cap.checked_mul(4)?.checked_add(k));
        let (keys_end, slots_end) = match (keys_end, slots_end) {
            (Some(k), Some(s)) => (k, s),
            _ => return Err(GraphError::corrupt(path, "indexer sizes overflow")),
        };
        if num > key_cap || slots_end != len || (slot_cap != 0 && !slot_cap.is_power_of_two()) {
            return Err(GraphError::corrupt(path, "indexer sizes do not match file length"));
        }
        let keys: &[Oid] = bytemuck::cast_slice(&map[HEADER_SIZE..keys_end]);
        let slots: &[u32] = bytemuck::cast_slice(&map[keys_end..slots_end]);
        // Every vid below `num` owns exactly one slot; nothing else may appear.
        let mut seen = vec![false; num];
        for &slot in slots {
            if slot == EMPTY_SLOT {
                continue;
            }
            let fresh = seen.get_mut(slot as usize).map(|s| !std::mem::replace(s, true));
            if fresh != Some(true) {
                return Err(GraphError::corrupt(path, format!("bad indexer slot {}", slot)));
            }
        }
        if num > 0 && seen.iter().any(|s| !s) {
            return Err(GraphError::corrupt(path, "indexer slots do not cover every vertex"));
        }
        Ok(Self {
            keys: AnonArray::from_slice(keys)?,
            slots: AnonArray::from_slice(slots)?,
            num,
        })
    }
}

impl Default for LfIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_build_phase_dense() {
        let mut idx = IdIndexer::<Oid>::new();
        idx.rehash(3);
        assert_eq!(idx.add(1), 0);
        assert_eq!(idx.add(2), 1);
        assert_eq!(idx.add(3), 2);
        assert_eq!(idx.insert(2), (1, false));
        assert_eq!(idx.size(), 3);
        assert_eq!(idx.get_key(2), Some(&3));
    }

    #[test]
    fn test_label_names() {
        let mut labels = IdIndexer::<String>::new();
        labels.add("person".to_string());
        labels.add("software".to_string());
        assert_eq!(labels.get_index("software"), Some(1));
        assert_eq!(labels.get_index("nope"), None);
        let bytes = bincode::serialize(&labels).unwrap();
        let back: IdIndexer<String> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.get_index("person"), Some(0));
    }

    #[test]
    fn test_frozen_bijection() {
        let mut idx = IdIndexer::<Oid>::new();
        let oids: Vec<Oid> = (0..5000).map(|i| i * 7919 - 100_000).collect();
        for &o in &oids {
            idx.add(o);
        }
        let lf = idx.build_lf_indexer().unwrap();
        assert_eq!(lf.size(), oids.len());
        for (expected_vid, &o) in oids.iter().enumerate() {
            let vid = lf.get_index(o).unwrap();
            assert_eq!(vid as usize, expected_vid);
            assert_eq!(lf.get_key(vid), Some(o));
        }
        assert_eq!(lf.get_index(1), None);
        assert_eq!(lf.get_key(5000), None);
    }

    #[test]
    fn test_insert_after_freeze() {
        let mut lf = LfIndexer::from_keys(&[10, 20]).unwrap();
        assert_eq!(lf.insert(30).unwrap(), 2);
        assert_eq!(lf.insert(10).unwrap(), 0);
        for o in 100..2000 {
            lf.insert(o).unwrap();
        }
        assert_eq!(lf.get_index(1999), Some(1902));
        assert_eq!(lf.get_index(30), Some(2));
    }

    #[test]
    fn test_lf_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vertex_map_0.lfi");
        let lf = LfIndexer::from_keys(&[5, -3, 99, 1 << 40]).unwrap();
        lf.serialize(&path).unwrap();
        let back = LfIndexer::deserialize(&path).unwrap();
        assert_eq!(back.size(), 4);
        assert_eq!(back.get_index(1 << 40), Some(3));
        assert_eq!(back.keys(), &[5, -3, 99, 1 << 40]);

        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(LfIndexer::deserialize(&path), Err(GraphError::Corrupt { .. })));
    }

    #[test]
    fn test_out_of_range_slot_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vertex_map_1.lfi");
        LfIndexer::from_keys(&[5, 6]).unwrap().serialize(&path).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let slots_at = HEADER_SIZE + 2 * 8;
        for b in &mut bytes[slots_at..] {
            *b = 0x7F;
        }
        std::fs::write(&path, &bytes).unwrap();
        let err = match LfIndexer::deserialize(&path) {
            Ok(_) => panic!("corrupt slots must not load"),
            Err(e) => e,
        };
        println!("load error: {}", err);
        assert!(matches!(err, GraphError::Corrupt { .. }));

        let mut header = std::fs::read(&path).unwrap();
        header[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &header).unwrap();
        assert!(matches!(LfIndexer::deserialize(&path), Err(GraphError::Corrupt { .. })));
    }
}
