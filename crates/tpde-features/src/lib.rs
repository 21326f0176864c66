//! Feature extractors (C2): pure, deterministic transforms from a raw sample
//! slice to a fixed-length feature array. Each extractor is `Send + Sync`
//! and safe to run from multiple threads on independent inputs (§4.2).

mod dtw;
mod spectral;
mod statistical;
mod wavelet;

pub use dtw::{dtw_features, dtw_distance};
pub use spectral::spectral_features;
pub use statistical::statistical_features;
pub use wavelet::wavelet_features;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("input sequence is empty")]
    InvalidInput,
}

fn require_non_empty(samples: &[f32]) -> Result<(), FeatureError> {
    if samples.is_empty() {
        Err(FeatureError::InvalidInput)
    } else {
        Ok(())
    }
}
