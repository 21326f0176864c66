use serde::{Deserialize, Serialize};

/// The five embedding methods named in §3/§4.3. `Learned` is reserved and
/// always rejected by the embedding bridge with `UnsupportedMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMethod {
    Statistical,
    Frequency,
    Dtw,
    Wavelet,
    Hybrid,
    Learned,
}

impl EmbeddingMethod {
    /// Linear code in `[0,1]` used by the RL state encoding's `method_code`
    /// dimension (§3 StateSpace) and decoded back by §4.9's action decoding.
    pub fn to_code(self) -> f32 {
        match self {
            EmbeddingMethod::Statistical => 0.0,
            EmbeddingMethod::Frequency => 0.2,
            EmbeddingMethod::Dtw => 0.4,
            EmbeddingMethod::Wavelet => 0.6,
            EmbeddingMethod::Hybrid => 0.8,
            EmbeddingMethod::Learned => 1.0,
        }
    }

    /// Inverse of [`EmbeddingMethod::to_code`], using the 0.25/0.5/0.75
    /// quantization thresholds named in §4.9 for the fifth action component
    /// (extended here to cover all five methods at even spacing).
    pub fn from_code(code: f32) -> Self {
        match code {
            c if c < 0.2 => EmbeddingMethod::Statistical,
            c if c < 0.4 => EmbeddingMethod::Frequency,
            c if c < 0.6 => EmbeddingMethod::Dtw,
            c if c < 0.8 => EmbeddingMethod::Wavelet,
            _ => EmbeddingMethod::Hybrid,
        }
    }
}

/// Number of statistical features (§3).
pub const STATISTICAL_DIM: usize = 12;
/// Number of spectral features (§3): 32 normalized magnitudes + entropy + centroid + rolloff.
pub const SPECTRAL_DIM: usize = 35;
/// Number of wavelet features (§3): 6 scales × 10 subsampled coefficients + 4 padding slots.
pub const WAVELET_DIM: usize = 64;
/// Number of scalar features produced per DTW template (distance, path ratio, alignment score).
pub const DTW_FEATURES_PER_TEMPLATE: usize = 3;

/// A tagged union of feature groups produced by the C2 extractors (§3).
/// Any subset may be empty depending on which extractors a given
/// [`EmbeddingMethod`] requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    /// 12 floats: mean, std, variance, skewness, kurtosis, min, max, range,
    /// median, q25, q75, iqr.
    pub statistical: Vec<f32>,
    /// 35 floats: 32 normalized FFT magnitudes + entropy, centroid, rolloff.
    pub spectral: Vec<f32>,
    /// 3 floats per template: normalized distance, warp-ratio, alignment score.
    pub dtw: Vec<f32>,
    /// 64 floats: Haar coefficients + per-scale energy, padded/truncated.
    pub wavelet: Vec<f32>,
}

impl FeatureBundle {
    /// Concatenate the populated groups in the fixed, documented order used
    /// throughout the spec: statistical, spectral, dtw, wavelet.
    pub fn concat(&self) -> Vec<f32> {
        let mut out =
            Vec::with_capacity(self.statistical.len() + self.spectral.len() + self.dtw.len() + self.wavelet.len());
        out.extend_from_slice(&self.statistical);
        out.extend_from_slice(&self.spectral);
        out.extend_from_slice(&self.dtw);
        out.extend_from_slice(&self.wavelet);
        out
    }
}
