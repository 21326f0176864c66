use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter mixed into every generated [`PatternId`] so that two
/// patterns generated in the same nanosecond with identical leading samples
/// still never collide (§3: "must not collide within one process lifetime").
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque string uniquely identifying a stored pattern, generated from
/// `(timestamp, short hash of first samples)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(String);

impl PatternId {
    /// Generate a fresh id from a timestamp and the leading samples of the
    /// sequence it identifies.
    pub fn generate(timestamp_ns: i64, first_samples: &[f32]) -> Self {
        let hash = short_hash(first_samples);
        let counter = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("pat_{timestamp_ns:x}_{hash:016x}_{counter:x}"))
    }

    /// Wrap an externally supplied id verbatim (e.g. one the caller already
    /// minted and wants to reuse on insert).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// FNV-1a over the first few samples' bit patterns. Deliberately not
/// cryptographic: this only needs to disambiguate within one process.
fn short_hash(samples: &[f32]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &s in samples.iter().take(16) {
        for byte in s.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_generated_in_the_same_instant_never_collide() {
        let samples = vec![1.0, 2.0, 3.0];
        let a = PatternId::generate(42, &samples);
        let b = PatternId::generate(42, &samples);
        assert_ne!(a, b);
    }
}
