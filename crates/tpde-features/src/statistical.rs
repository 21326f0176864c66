use crate::{require_non_empty, FeatureError};
use tpde_types::FeatureBundle;

/// Single-pass mean, two-pass variance, standardized 3rd/4th moments, and
/// sorted-copy quantiles (§4.2). Returns the 12 floats in the documented
/// order: mean, std, variance, skewness, kurtosis, min, max, range, median,
/// q25, q75, iqr.
pub fn statistical_features(samples: &[f32]) -> Result<Vec<f32>, FeatureError> {
    require_non_empty(samples)?;

    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;

    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt();

    let (skewness, kurtosis) = if std == 0.0 {
        (0.0, 0.0)
    } else {
        let m3 = samples.iter().map(|x| (x - mean).powi(3)).sum::<f32>() / n;
        let m4 = samples.iter().map(|x| (x - mean).powi(4)).sum::<f32>() / n;
        (m3 / std.powi(3), m4 / std.powi(4))
    };

    let min = samples.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = samples.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = quantile(&sorted, 0.5);
    let q25 = quantile(&sorted, 0.25);
    let q75 = quantile(&sorted, 0.75);
    let iqr = q75 - q25;

    Ok(vec![
        mean, std, variance, skewness, kurtosis, min, max, range, median, q25, q75, iqr,
    ])
}

/// Linear-interpolated quantile over an already-sorted slice.
fn quantile(sorted: &[f32], q: f32) -> f32 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f32;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Feature count matching `FeatureBundle::statistical`'s documented length.
pub const DIM: usize = tpde_types::STATISTICAL_DIM;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_invalid() {
        assert_eq!(statistical_features(&[]), Err(FeatureError::InvalidInput));
    }

    #[test]
    fn single_element_sequence_has_zero_variance() {
        let f = statistical_features(&[5.0]).unwrap();
        assert_eq!(f.len(), DIM);
        assert_eq!(f[2], 0.0); // variance
        assert_eq!(f[3], 0.0); // skewness
        assert_eq!(f[4], 0.0); // kurtosis
    }

    #[test]
    fn constant_sequence_has_zero_skew_and_kurtosis() {
        let f = statistical_features(&[3.0; 20]).unwrap();
        assert_eq!(f[1], 0.0); // std
        assert_eq!(f[3], 0.0);
        assert_eq!(f[4], 0.0);
    }

    #[test]
    fn mean_and_range_are_correct() {
        let f = statistical_features(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((f[0] - 3.0).abs() < 1e-6); // mean
        assert!((f[7] - 4.0).abs() < 1e-6); // range = max - min
    }
}
