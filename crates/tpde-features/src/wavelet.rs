use crate::{require_non_empty, FeatureError};

/// Haar scales used for the wavelet feature group (§3/§4.2).
const SCALES: [usize; 6] = [1, 2, 4, 8, 16, 32];
/// Coefficients kept per scale after uniform-stride subsampling.
const PER_SCALE_SAMPLES: usize = 10;
pub const DIM: usize = tpde_types::WAVELET_DIM;

/// Mean absolute deviation of a window, used as the Haar "coefficient" at a
/// given scale (§4.2: "coefficient = mean absolute deviation within window").
fn mad(window: &[f32]) -> f32 {
    let mean = window.iter().sum::<f32>() / window.len() as f32;
    window.iter().map(|x| (x - mean).abs()).sum::<f32>() / window.len() as f32
}

/// Uniform-stride subsample of `values` down to exactly `count` entries.
fn subsample(values: &[f32], count: usize) -> Vec<f32> {
    if values.is_empty() {
        return vec![0.0; count];
    }
    if values.len() <= count {
        let mut out = values.to_vec();
        out.resize(count, *values.last().unwrap());
        return out;
    }
    (0..count)
        .map(|i| {
            let idx = (i * (values.len() - 1)) / (count - 1).max(1);
            values[idx]
        })
        .collect()
}

/// Haar coefficients at scales `{1,2,4,8,16,32}`, each subsampled to exactly
/// 10 values, concatenated and truncated/padded to 64, followed by no
/// separate return for energies (callers needing energies use
/// [`wavelet_energy_per_scale`]) — matching the single 64-float feature
/// vector described in §3.
pub fn wavelet_features(samples: &[f32]) -> Result<Vec<f32>, FeatureError> {
    require_non_empty(samples)?;

    let mut out = Vec::with_capacity(DIM);
    for &scale in &SCALES {
        let coeffs = scale_coefficients(samples, scale);
        let sub = subsample(&coeffs, PER_SCALE_SAMPLES);
        out.extend(sub);
    }
    out.resize(DIM, 0.0);
    out.truncate(DIM);
    Ok(out)
}

fn scale_coefficients(samples: &[f32], scale: usize) -> Vec<f32> {
    if samples.len() < scale {
        return vec![mad(samples)];
    }
    samples.chunks(scale).map(mad).collect()
}

/// Sum of squared coefficients per scale (§4.2 "Energy per scale"), exposed
/// separately from [`wavelet_features`] for callers that want it directly
/// rather than re-deriving it from the packed feature vector.
pub fn wavelet_energy_per_scale(samples: &[f32]) -> Result<Vec<f32>, FeatureError> {
    require_non_empty(samples)?;
    Ok(SCALES
        .iter()
        .map(|&scale| {
            scale_coefficients(samples, scale)
                .iter()
                .map(|c| c * c)
                .sum()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_invalid() {
        assert_eq!(wavelet_features(&[]), Err(FeatureError::InvalidInput));
    }

    #[test]
    fn output_has_fixed_length() {
        let samples: Vec<f32> = (0..200).map(|i| (i as f32).sin()).collect();
        let f = wavelet_features(&samples).unwrap();
        assert_eq!(f.len(), DIM);
    }

    #[test]
    fn single_sample_does_not_panic() {
        let f = wavelet_features(&[1.0]).unwrap();
        assert_eq!(f.len(), DIM);
    }

    #[test]
    fn constant_signal_has_zero_energy() {
        let samples = vec![2.0; 64];
        let energy = wavelet_energy_per_scale(&samples).unwrap();
        assert!(energy.iter().all(|&e| e.abs() < 1e-6));
    }
}
