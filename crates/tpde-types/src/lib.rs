//! Shared data model for the temporal pattern detection engine.
//!
//! Every other crate in the workspace depends on this one for the wire types
//! that cross component boundaries (`Sequence`, `Embedding`, `StoreEntry`, ...)
//! so that no two crates invent slightly different shapes for the same thing.

mod error_kind;
mod features;
mod metrics;
mod pattern_id;
mod rl;
mod sequence;
mod store_entry;
mod vector;

pub use error_kind::ErrorKindTag;
pub use features::{
    FeatureBundle, EmbeddingMethod, DTW_FEATURES_PER_TEMPLATE, SPECTRAL_DIM, STATISTICAL_DIM,
    WAVELET_DIM,
};
pub use metrics::StreamingMetrics;
pub use pattern_id::PatternId;
pub use rl::{Action, ActionRanges, State, Transition, ACTION_DIM, STATE_DIM};
pub use sequence::{Sequence, SequenceMetadata, MAX_SEQUENCE_LEN, MIN_SEQUENCE_LEN};
pub use store_entry::StoreEntry;
pub use vector::{Embedding, QuantizedVector};

/// Tunable pipeline parameters, the thing the adaptive learning engine mutates.
///
/// Ranges are enforced by [`Parameters::clamp`], matching §4.9 of the engine
/// specification: window ∈ [10,1000], slide ∈ [1,500], threshold ∈ [0.1,10.0],
/// sensitivity ∈ [0.5,2.0].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Parameters {
    pub window: f32,
    pub slide: f32,
    pub threshold: f32,
    pub sensitivity: f32,
    pub adaptive: bool,
    pub method: EmbeddingMethod,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            window: 100.0,
            slide: 50.0,
            threshold: 1.0,
            sensitivity: 1.0,
            adaptive: true,
            method: EmbeddingMethod::Hybrid,
        }
    }
}

impl Parameters {
    pub const WINDOW_RANGE: (f32, f32) = (10.0, 1000.0);
    pub const SLIDE_RANGE: (f32, f32) = (1.0, 500.0);
    pub const THRESHOLD_RANGE: (f32, f32) = (0.1, 10.0);
    pub const SENSITIVITY_RANGE: (f32, f32) = (0.5, 2.0);

    /// Clamp every field into its declared absolute range (§3, §4.9).
    pub fn clamp(&mut self) {
        self.window = self.window.clamp(Self::WINDOW_RANGE.0, Self::WINDOW_RANGE.1);
        self.slide = self.slide.clamp(Self::SLIDE_RANGE.0, Self::SLIDE_RANGE.1);
        self.threshold = self
            .threshold
            .clamp(Self::THRESHOLD_RANGE.0, Self::THRESHOLD_RANGE.1);
        self.sensitivity = self
            .sensitivity
            .clamp(Self::SENSITIVITY_RANGE.0, Self::SENSITIVITY_RANGE.1);
    }

    fn in_range(value: f32, range: (f32, f32)) -> bool {
        value >= range.0 && value <= range.1
    }

    /// True when every field already satisfies its declared range (used by
    /// the testable-property suite in §8, invariant 5).
    pub fn in_declared_ranges(&self) -> bool {
        Self::in_range(self.window, Self::WINDOW_RANGE)
            && Self::in_range(self.slide, Self::SLIDE_RANGE)
            && Self::in_range(self.threshold, Self::THRESHOLD_RANGE)
            && Self::in_range(self.sensitivity, Self::SENSITIVITY_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pulls_out_of_range_values_back_in() {
        let mut p = Parameters {
            window: 5000.0,
            slide: -10.0,
            threshold: 50.0,
            sensitivity: 0.0,
            adaptive: true,
            method: EmbeddingMethod::Hybrid,
        };
        p.clamp();
        assert!(p.in_declared_ranges());
    }
}
