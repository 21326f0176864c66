use crate::{EmbeddingMethod, SequenceMetadata};
use serde::{Deserialize, Serialize};

/// L2-normalized, fixed-dimensional vector representation of a sequence
/// (§3). `generation_time_ns` is measured by the embedding bridge, including
/// on a cache hit (freshly re-measured, not the original generation cost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub method: EmbeddingMethod,
    pub window_size: usize,
    pub generation_time_ns: u64,
    pub metadata: SequenceMetadata,
}

/// Tolerance on `|‖v‖₂ - 1| < ε` used throughout the engine (§3 invariant).
pub const NORM_EPSILON: f32 = 1e-4;

impl Embedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// L2 norm of the underlying vector; used by callers validating the
    /// unit-norm invariant (§8, invariant 1).
    pub fn norm(&self) -> f32 {
        self.vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn is_unit_norm(&self) -> bool {
        (self.norm() - 1.0).abs() < NORM_EPSILON
    }
}

/// Bit width used for a [`QuantizedVector`]'s codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantBits {
    Four,
    Eight,
}

/// A compact quantized vector: `value_i ≈ code_i * scale + offset` (§3).
/// For 4-bit, `codes` holds two nibble-packed codes per byte with `dim`
/// tracking the logical (unpacked) length; for 8-bit, one code per byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedVector {
    pub bits: QuantBits,
    pub codes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
    pub dim: usize,
}
