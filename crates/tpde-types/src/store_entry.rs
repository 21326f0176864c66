use crate::{Embedding, PatternId, QuantizedVector, SequenceMetadata};
use serde::{Deserialize, Serialize};

/// Either a full-precision or quantized payload for a stored pattern.
/// Search operations transparently dequantize (§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredVector {
    Full(Embedding),
    Quantized(QuantizedVector),
}

impl StoredVector {
    pub fn dim(&self) -> usize {
        match self {
            StoredVector::Full(e) => e.dim(),
            StoredVector::Quantized(q) => q.dim,
        }
    }
}

/// `(PatternId, Embedding | QuantizedVector, metadata, insertion_time,
/// last_access_time)` per §3. `last_access_time` is updated on every
/// successful [`get`](crate) call; metadata is immutable after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: PatternId,
    pub vector: StoredVector,
    pub metadata: SequenceMetadata,
    pub insertion_time_ns: i64,
    pub last_access_time_ns: i64,
}

impl StoreEntry {
    pub fn new(
        id: PatternId,
        vector: StoredVector,
        metadata: SequenceMetadata,
        insertion_time_ns: i64,
    ) -> Self {
        Self {
            id,
            vector,
            metadata,
            insertion_time_ns,
            last_access_time_ns: insertion_time_ns,
        }
    }

    pub fn touch(&mut self, now_ns: i64) {
        self.last_access_time_ns = now_ns;
    }
}
