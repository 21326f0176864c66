//! Vector quantization (C1): lossy compression of L2-normalized float
//! vectors to 4-bit or 8-bit integer codes, and their inverses.
//!
//! Algorithm (§4.1): `scale = (max - min) / levels`, `offset = min`,
//! `code_i = round((v_i - offset) / scale)`. A constant input (`max == min`)
//! is a legal edge case: `scale = 1`, all codes zero.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QuantizeError {
    #[error("input vector is empty")]
    InvalidInput,
    #[error("input contains a non-finite sample")]
    NonFinite,
    #[error("expected {expected} codes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// 8-bit quantized form: one code byte per input element.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized8 {
    pub codes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
}

/// 4-bit quantized form: two nibble codes packed per byte, `dim` tracks the
/// logical (unpacked) length since the last byte may have an unused nibble.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized4 {
    pub codes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
    pub dim: usize,
}

fn validate(v: &[f32]) -> Result<(), QuantizeError> {
    if v.is_empty() {
        return Err(QuantizeError::InvalidInput);
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(QuantizeError::NonFinite);
    }
    Ok(())
}

fn min_max(v: &[f32]) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &x in v {
        lo = lo.min(x);
        hi = hi.max(x);
    }
    (lo, hi)
}

/// Quantize `v` to 8-bit codes (§4.1).
pub fn quantize8(v: &[f32]) -> Result<Quantized8, QuantizeError> {
    validate(v)?;
    let (lo, hi) = min_max(v);
    let (scale, offset) = if hi == lo {
        (1.0, lo)
    } else {
        ((hi - lo) / 255.0, lo)
    };
    let codes = v
        .iter()
        .map(|&x| (((x - offset) / scale).round().clamp(0.0, 255.0)) as u8)
        .collect();
    Ok(Quantized8 { codes, scale, offset })
}

/// Reconstruct an approximation of the original vector from 8-bit codes.
pub fn dequantize8(q: &Quantized8) -> Vec<f32> {
    q.codes
        .iter()
        .map(|&c| c as f32 * q.scale + q.offset)
        .collect()
}

/// Quantize `v` to 4-bit codes, packed two per byte (§4.1).
pub fn quantize4(v: &[f32]) -> Result<Quantized4, QuantizeError> {
    validate(v)?;
    let (lo, hi) = min_max(v);
    let (scale, offset) = if hi == lo {
        (1.0, lo)
    } else {
        ((hi - lo) / 15.0, lo)
    };
    let nibbles: Vec<u8> = v
        .iter()
        .map(|&x| (((x - offset) / scale).round().clamp(0.0, 15.0)) as u8)
        .collect();

    let mut codes = Vec::with_capacity(nibbles.len().div_ceil(2));
    let mut chunks = nibbles.chunks(2);
    for pair in &mut chunks {
        let c1 = pair[0];
        let c2 = *pair.get(1).unwrap_or(&0);
        codes.push((c1 << 4) | c2);
    }

    Ok(Quantized4 {
        codes,
        scale,
        offset,
        dim: v.len(),
    })
}

/// Reconstruct an approximation of the original vector from 4-bit codes.
pub fn dequantize4(q: &Quantized4) -> Vec<f32> {
    let mut out = Vec::with_capacity(q.dim);
    for &byte in &q.codes {
        let c1 = byte >> 4;
        let c2 = byte & 0x0f;
        out.push(c1 as f32 * q.scale + q.offset);
        if out.len() < q.dim {
            out.push(c2 as f32 * q.scale + q.offset);
        }
    }
    out.truncate(q.dim);
    out
}

/// Re-quantize an already-dequantized 8-bit vector and check it reproduces
/// the same codes bit-exact (§3 invariant: `quantize(dequantize(q)) = q`).
pub fn requantize8_matches(q: &Quantized8) -> bool {
    let restored = dequantize8(q);
    match quantize8(&restored) {
        Ok(q2) => q2.codes == q.codes,
        Err(_) => false,
    }
}

/// Root-mean-square error between two equal-length vectors.
pub fn rmse(a: &[f32], b: &[f32]) -> Result<f32, QuantizeError> {
    if a.len() != b.len() {
        return Err(QuantizeError::LengthMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let sum_sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Ok((sum_sq / a.len().max(1) as f32).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_is_invalid() {
        assert_eq!(quantize8(&[]), Err(QuantizeError::InvalidInput));
        assert_eq!(quantize4(&[]), Err(QuantizeError::InvalidInput));
    }

    #[test]
    fn non_finite_sample_is_rejected() {
        assert_eq!(quantize8(&[1.0, f32::NAN]), Err(QuantizeError::NonFinite));
        assert_eq!(
            quantize4(&[1.0, f32::INFINITY]),
            Err(QuantizeError::NonFinite)
        );
    }

    #[test]
    fn constant_vector_is_a_legal_edge_case() {
        let v = vec![0.5; 8];
        let q8 = quantize8(&v).unwrap();
        assert_eq!(q8.scale, 1.0);
        assert!(q8.codes.iter().all(|&c| c == 0));

        let q4 = quantize4(&v).unwrap();
        assert_eq!(q4.scale, 1.0);
        assert!(q4.codes.iter().all(|&c| c == 0));
    }

    #[test]
    fn dequantize4_respects_odd_length_tail() {
        let v = vec![0.0, 1.0, 2.0];
        let q = quantize4(&v).unwrap();
        assert_eq!(q.dim, 3);
        let restored = dequantize4(&q);
        assert_eq!(restored.len(), 3);
    }

    #[test]
    fn scenario_2_quantization_accuracy() {
        let v: Vec<f32> = (0..64)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 64.0).sin())
            .collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let v: Vec<f32> = v.iter().map(|x| x / norm).collect();

        let q8 = quantize8(&v).unwrap();
        let r8 = dequantize8(&q8);
        assert!(rmse(&v, &r8).unwrap() < 0.01);

        let q4 = quantize4(&v).unwrap();
        let r4 = dequantize4(&q4);
        assert!(rmse(&v, &r4).unwrap() < 0.05);
    }

    proptest! {
        #[test]
        fn quantize_dequantize_roundtrip_bounded(
            v in proptest::collection::vec(-1000.0f32..1000.0, 1..64)
        ) {
            let q8 = quantize8(&v).unwrap();
            let restored = dequantize8(&q8);
            let (lo, hi) = min_max(&v);
            let bound = if hi > lo { (hi - lo) / 255.0 } else { 1e-6 };
            for (orig, back) in v.iter().zip(restored.iter()) {
                prop_assert!((orig - back).abs() <= bound + 1e-4);
            }
        }

        #[test]
        fn quantize8_is_idempotent_after_one_roundtrip(
            v in proptest::collection::vec(-10.0f32..10.0, 1..32)
        ) {
            let q = quantize8(&v).unwrap();
            prop_assert!(requantize8_matches(&q));
        }
    }
}
