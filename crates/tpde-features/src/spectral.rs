use crate::{require_non_empty, FeatureError};

/// Number of leading FFT-magnitude coefficients carried into the feature
/// vector (§3: 32 magnitudes + entropy + centroid + rolloff = 35).
const MAGNITUDE_COUNT: usize = 32;
pub const DIM: usize = tpde_types::SPECTRAL_DIM;

#[derive(Clone, Copy)]
struct Complex {
    re: f32,
    im: f32,
}

impl Complex {
    const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    fn add(self, o: Complex) -> Complex {
        Complex { re: self.re + o.re, im: self.im + o.im }
    }
    fn sub(self, o: Complex) -> Complex {
        Complex { re: self.re - o.re, im: self.im - o.im }
    }
    fn mul(self, o: Complex) -> Complex {
        Complex {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }
    fn magnitude(self) -> f32 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// In-place iterative radix-2 Cooley-Tukey FFT. `data.len()` must be a power
/// of two (callers zero-pad first, per §4.2).
fn fft_radix2(data: &mut [Complex]) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let ang = -2.0 * std::f32::consts::PI / len as f32;
        let wlen = Complex { re: ang.cos(), im: ang.sin() };
        let mut start = 0;
        while start < n {
            let mut w = Complex { re: 1.0, im: 0.0 };
            for k in 0..len / 2 {
                let u = data[start + k];
                let v = data[start + k + len / 2].mul(w);
                data[start + k] = u.add(v);
                data[start + k + len / 2] = u.sub(v);
                w = w.mul(wlen);
            }
            start += len;
        }
        len <<= 1;
    }
}

fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// 32 normalized FFT-magnitude coefficients + spectral entropy, centroid,
/// rolloff (§4.2). Zero-pads the input to the next power of two before
/// running the radix-2 FFT.
pub fn spectral_features(samples: &[f32]) -> Result<Vec<f32>, FeatureError> {
    require_non_empty(samples)?;

    if samples.len() == 1 {
        // A single-sample window carries no frequency content; §8 requires
        // this not to panic and to report all-zero spectral features.
        return Ok(vec![0.0; DIM]);
    }

    let padded_len = next_power_of_two(samples.len());
    let mut buf: Vec<Complex> = samples
        .iter()
        .map(|&s| Complex { re: s, im: 0.0 })
        .chain(std::iter::repeat(Complex::ZERO))
        .take(padded_len)
        .collect();

    fft_radix2(&mut buf);

    let n = samples.len() as f32;
    let half = padded_len / 2;
    let magnitudes: Vec<f32> = buf[..half.max(1)].iter().map(|c| c.magnitude()).collect();

    let max_mag = magnitudes.iter().cloned().fold(0.0f32, f32::max).max(1e-10);
    let mut normalized: Vec<f32> = magnitudes.iter().map(|m| m / max_mag).collect();
    normalized.resize(MAGNITUDE_COUNT, 0.0);
    normalized.truncate(MAGNITUDE_COUNT);

    let total_energy: f32 = magnitudes.iter().map(|m| m * m).sum::<f32>().max(1e-20);
    let probs: Vec<f32> = magnitudes.iter().map(|m| (m * m) / total_energy).collect();
    let raw_entropy: f32 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum();
    let entropy = raw_entropy / n.log2().max(1.0);

    let weighted_sum: f32 = magnitudes
        .iter()
        .enumerate()
        .map(|(i, &m)| i as f32 * m)
        .sum();
    let mag_sum: f32 = magnitudes.iter().sum::<f32>().max(1e-20);
    let centroid = (weighted_sum / mag_sum) / n;

    let target = 0.95 * total_energy;
    let mut cumulative = 0.0f32;
    let mut rolloff_idx = magnitudes.len().saturating_sub(1);
    for (i, &m) in magnitudes.iter().enumerate() {
        cumulative += m * m;
        if cumulative >= target {
            rolloff_idx = i;
            break;
        }
    }
    let rolloff = rolloff_idx as f32 / n;

    let mut out = normalized;
    out.push(entropy);
    out.push(centroid);
    out.push(rolloff);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_invalid() {
        assert_eq!(spectral_features(&[]), Err(FeatureError::InvalidInput));
    }

    #[test]
    fn single_sample_yields_all_zero_features_without_panicking() {
        let f = spectral_features(&[1.0]).unwrap();
        assert_eq!(f.len(), DIM);
        assert!(f.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn output_has_fixed_length() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 * 0.1).sin()).collect();
        let f = spectral_features(&samples).unwrap();
        assert_eq!(f.len(), DIM);
    }

    #[test]
    fn pure_tone_has_a_dominant_peaked_magnitude() {
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 256.0).sin())
            .collect();
        let f = spectral_features(&samples).unwrap();
        let peak = f[..32].iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-4);
    }
}
