use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optional side-channel information carried alongside a [`Sequence`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    pub source: Option<String>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub sample_rate_hz: Option<f32>,
    pub extra: HashMap<String, String>,
}

/// An ordered sequence of real-valued samples with a timestamp, immutable
/// after construction. Length is validated to lie in `[10, 100_000]` at
/// construction time (§3); callers that need to bypass this for unit tests
/// on boundary behavior use [`Sequence::from_raw`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    samples: Vec<f32>,
    pub timestamp_ns: i64,
    pub metadata: SequenceMetadata,
}

/// Minimum accepted sequence length per §3.
pub const MIN_SEQUENCE_LEN: usize = 10;
/// Maximum accepted sequence length per §3.
pub const MAX_SEQUENCE_LEN: usize = 100_000;

impl Sequence {
    /// Construct a sequence, enforcing the `[10, 10^5]` length invariant.
    /// Returns `None` if the length is out of range; boundary-behavior tests
    /// that exercise shorter sequences use [`Sequence::from_raw`] directly.
    pub fn new(samples: Vec<f32>, timestamp_ns: i64, metadata: SequenceMetadata) -> Option<Self> {
        if samples.len() < MIN_SEQUENCE_LEN || samples.len() > MAX_SEQUENCE_LEN {
            return None;
        }
        Some(Self {
            samples,
            timestamp_ns,
            metadata,
        })
    }

    /// Construct without the length check, for feature-extractor boundary
    /// tests (empty/1-element inputs per §8).
    pub fn from_raw(samples: Vec<f32>, timestamp_ns: i64, metadata: SequenceMetadata) -> Self {
        Self {
            samples,
            timestamp_ns,
            metadata,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
