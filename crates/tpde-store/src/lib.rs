//! Vector store (C4): an arena of [`StoreEntry`] values addressed by dense
//! `u32` slots, per the §9 "arena + integer indices" redesign — this is what
//! lets the HNSW index (C5) hold plain integer references instead of
//! back-pointers that would dangle on eviction.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tpde_quantize::{dequantize4, dequantize8, quantize4, quantize8};
use tpde_types::{Embedding, PatternId, SequenceMetadata, StoreEntry, StoredVector};

/// Dense arena index. Stable for the lifetime of the slot (never reused
/// while the slot is live); tombstoned slots are skipped by iteration.
pub type Slot = u32;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("pattern id not found")]
    NotFound,
    #[error("vector has dimension {actual}, store is fixed at {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Desired storage precision for an inserted vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Eight,
    Four,
}

/// Observability snapshot (§4.4 `stats()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub count: usize,
    pub bytes_full: usize,
    pub bytes_q8: usize,
    pub bytes_q4: usize,
    pub dropped_inserts: u64,
}

struct Inner {
    arena: Vec<Option<StoreEntry>>,
    index: HashMap<PatternId, Slot>,
    /// Insertion order, oldest first, for LRU-by-insertion eviction
    /// (`evict_tail`). Tombstoned ids are skipped when popped.
    insertion_order: std::collections::VecDeque<PatternId>,
    dropped_inserts: u64,
}

/// Arena-backed vector store (C4). One writer at a time (insert/remove take
/// the exclusive lock); search-adjacent reads (`get`, `stats`) take the
/// shared lock — matching the coarse-grained locking discipline of §5.
pub struct VectorStore {
    dim: usize,
    max_entries: Option<usize>,
    ttl_ns: Option<i64>,
    inner: RwLock<Inner>,
}

impl VectorStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            max_entries: None,
            ttl_ns: None,
            inner: RwLock::new(Inner {
                arena: Vec::new(),
                index: HashMap::new(),
                insertion_order: std::collections::VecDeque::new(),
                dropped_inserts: 0,
            }),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_ttl_ns(mut self, ttl_ns: i64) -> Self {
        self.ttl_ns = Some(ttl_ns);
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Insert `vector` under `id` (generated if `None`). Returns `Ok(None)`
    /// rather than erroring once `max_entries` is reached — backpressure
    /// drops inserts while preserving search, per §4.6/§8 Scenario 6.
    pub fn insert(
        &self,
        id: Option<PatternId>,
        embedding: Embedding,
        precision: Precision,
        now_ns: i64,
    ) -> Result<Option<(PatternId, Slot)>, StoreError> {
        if embedding.dim() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.dim(),
            });
        }

        let mut inner = self.inner.write();
        if let Some(max) = self.max_entries {
            if inner.index.len() >= max {
                inner.dropped_inserts += 1;
                tracing::warn!(dropped_inserts = inner.dropped_inserts, "store at capacity, dropping insert");
                return Ok(None);
            }
        }

        let id = id.unwrap_or_else(|| PatternId::generate(now_ns, embedding.vector.as_slice()));
        let metadata = embedding.metadata.clone();
        let stored = to_stored_vector(embedding, precision);
        let entry = StoreEntry::new(id.clone(), stored, metadata, now_ns);

        let slot = inner.arena.len() as Slot;
        inner.arena.push(Some(entry));
        inner.index.insert(id.clone(), slot);
        inner.insertion_order.push_back(id.clone());

        Ok(Some((id, slot)))
    }

    /// Fetch an entry by id, updating `last_access_time` (§4.4).
    pub fn get(&self, id: &PatternId, now_ns: i64) -> Result<StoreEntry, StoreError> {
        let mut inner = self.inner.write();
        let slot = *inner.index.get(id).ok_or(StoreError::NotFound)?;
        let entry = inner.arena[slot as usize]
            .as_mut()
            .ok_or(StoreError::NotFound)?;
        entry.touch(now_ns);
        Ok(entry.clone())
    }

    /// Fetch an entry's full-precision vector, dequantizing if necessary.
    pub fn get_dequantized(&self, slot: Slot) -> Option<Vec<f32>> {
        let inner = self.inner.read();
        let entry = inner.arena.get(slot as usize)?.as_ref()?;
        Some(dequantize(&entry.vector))
    }

    pub fn slot_of(&self, id: &PatternId) -> Option<Slot> {
        self.inner.read().index.get(id).copied()
    }

    pub fn remove(&self, id: &PatternId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let slot = inner.index.remove(id).ok_or(StoreError::NotFound)?;
        inner.arena[slot as usize] = None;
        Ok(())
    }

    /// Evict the `n` oldest (by insertion order) live entries. Returns the
    /// slots freed so callers (the orchestrator) can remove the matching
    /// HNSW nodes and keep the §3 "index contains exactly the live entries"
    /// invariant.
    pub fn evict_tail(&self, n: usize) -> Vec<Slot> {
        let mut inner = self.inner.write();
        let mut evicted = Vec::new();
        while evicted.len() < n {
            let Some(id) = inner.insertion_order.pop_front() else {
                break;
            };
            if let Some(&slot) = inner.index.get(&id) {
                inner.index.remove(&id);
                inner.arena[slot as usize] = None;
                evicted.push(slot);
            }
        }
        evicted
    }

    /// Evict all entries whose `last_access_time + ttl <= now_ns`. Returns
    /// the freed slots for the same reason as [`VectorStore::evict_tail`].
    pub fn evict_expired(&self, now_ns: i64) -> Vec<Slot> {
        let Some(ttl) = self.ttl_ns else { return Vec::new() };
        let mut inner = self.inner.write();
        let expired_ids: Vec<PatternId> = inner
            .arena
            .iter()
            .filter_map(|e| e.as_ref())
            .filter(|e| now_ns.saturating_sub(e.last_access_time_ns) >= ttl)
            .map(|e| e.id.clone())
            .collect();
        let mut slots = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(slot) = inner.index.remove(&id) {
                inner.arena[slot as usize] = None;
                slots.push(slot);
            }
        }
        slots
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let mut stats = StoreStats {
            count: inner.index.len(),
            dropped_inserts: inner.dropped_inserts,
            ..Default::default()
        };
        for entry in inner.arena.iter().filter_map(|e| e.as_ref()) {
            match &entry.vector {
                StoredVector::Full(e) => stats.bytes_full += e.vector.len() * std::mem::size_of::<f32>(),
                StoredVector::Quantized(q) => match q.bits {
                    tpde_types::QuantBits::Eight => stats.bytes_q8 += q.codes.len(),
                    tpde_types::QuantBits::Four => stats.bytes_q4 += q.codes.len(),
                },
            }
        }
        stats
    }
}

fn to_stored_vector(embedding: Embedding, precision: Precision) -> StoredVector {
    match precision {
        Precision::Full => StoredVector::Full(embedding),
        Precision::Eight => {
            let q = quantize8(&embedding.vector).expect("embeddings are always finite");
            StoredVector::Quantized(tpde_types::QuantizedVector {
                bits: tpde_types::QuantBits::Eight,
                codes: q.codes,
                scale: q.scale,
                offset: q.offset,
                dim: embedding.vector.len(),
            })
        }
        Precision::Four => {
            let q = quantize4(&embedding.vector).expect("embeddings are always finite");
            StoredVector::Quantized(tpde_types::QuantizedVector {
                bits: tpde_types::QuantBits::Four,
                codes: q.codes,
                scale: q.scale,
                offset: q.offset,
                dim: embedding.vector.len(),
            })
        }
    }
}

fn dequantize(stored: &StoredVector) -> Vec<f32> {
    match stored {
        StoredVector::Full(e) => e.vector.clone(),
        StoredVector::Quantized(q) => match q.bits {
            tpde_types::QuantBits::Eight => dequantize8(&tpde_quantize::Quantized8 {
                codes: q.codes.clone(),
                scale: q.scale,
                offset: q.offset,
            }),
            tpde_types::QuantBits::Four => dequantize4(&tpde_quantize::Quantized4 {
                codes: q.codes.clone(),
                scale: q.scale,
                offset: q.offset,
                dim: q.dim,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpde_types::EmbeddingMethod;

    fn embedding(vector: Vec<f32>) -> Embedding {
        Embedding {
            vector,
            method: EmbeddingMethod::Hybrid,
            window_size: 10,
            generation_time_ns: 0,
            metadata: SequenceMetadata::default(),
        }
    }

    #[test]
    fn insert_then_get_full_precision_is_byte_identical() {
        let store = VectorStore::new(4);
        let v = vec![0.5, 0.5, 0.5, 0.5];
        let (id, _slot) = store
            .insert(None, embedding(v.clone()), Precision::Full, 0)
            .unwrap()
            .unwrap();
        let entry = store.get(&id, 1).unwrap();
        match entry.vector {
            tpde_types::StoredVector::Full(e) => assert_eq!(e.vector, v),
            _ => panic!("expected full precision"),
        }
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let store = VectorStore::new(4);
        let result = store.insert(None, embedding(vec![1.0, 2.0]), Precision::Full, 0);
        assert_eq!(
            result,
            Err(StoreError::DimensionMismatch { expected: 4, actual: 2 })
        );
    }

    #[test]
    fn quantized_roundtrip_is_within_rmse_bound() {
        let store = VectorStore::new(4);
        let v = vec![0.1, 0.4, -0.3, 0.2];
        let (_id, slot) = store
            .insert(None, embedding(v.clone()), Precision::Eight, 0)
            .unwrap()
            .unwrap();
        let restored = store.get_dequantized(slot).unwrap();
        let rmse = tpde_quantize::rmse(&v, &restored).unwrap();
        assert!(rmse <= 0.02);
    }

    #[test]
    fn stats_attribute_bytes_to_the_correct_precision_tier() {
        let store = VectorStore::new(4);
        store.insert(None, embedding(vec![0.1, 0.4, -0.3, 0.2]), Precision::Full, 0).unwrap();
        store.insert(None, embedding(vec![0.1, 0.4, -0.3, 0.2]), Precision::Eight, 1).unwrap();
        store.insert(None, embedding(vec![0.1, 0.4, -0.3, 0.2]), Precision::Four, 2).unwrap();

        let stats = store.stats();
        assert_eq!(stats.bytes_full, 4 * std::mem::size_of::<f32>());
        assert_eq!(stats.bytes_q8, 4);
        assert_eq!(stats.bytes_q4, 2);
    }

    #[test]
    fn backpressure_drops_inserts_past_capacity() {
        let store = VectorStore::new(2).with_max_entries(1);
        let first = store
            .insert(None, embedding(vec![1.0, 0.0]), Precision::Full, 0)
            .unwrap();
        assert!(first.is_some());
        let second = store
            .insert(None, embedding(vec![0.0, 1.0]), Precision::Full, 1)
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.stats().dropped_inserts, 1);
    }

    #[test]
    fn evict_tail_removes_oldest_first() {
        let store = VectorStore::new(1);
        let (id_a, _) = store.insert(None, embedding(vec![1.0]), Precision::Full, 0).unwrap().unwrap();
        let (_id_b, _) = store.insert(None, embedding(vec![2.0]), Precision::Full, 1).unwrap().unwrap();
        let evicted = store.evict_tail(1);
        assert_eq!(evicted, vec![0]);
        assert_eq!(store.stats().count, 1);
        assert!(store.get(&id_a, 2).is_err());
    }

    #[test]
    fn ttl_eviction_removes_stale_entries() {
        let store = VectorStore::new(1).with_ttl_ns(100);
        let (id, _) = store.insert(None, embedding(vec![1.0]), Precision::Full, 0).unwrap().unwrap();
        assert!(store.evict_expired(50).is_empty());
        assert_eq!(store.evict_expired(200).len(), 1);
        assert!(store.get(&id, 201).is_err());
    }
}
