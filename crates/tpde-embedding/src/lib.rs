//! Embedding bridge (C3): combines the C2 feature extractors into a single
//! fixed-dimensional, L2-normalized [`Embedding`], with an LRU cache keyed by
//! `(method, include_wavelet, short_hash(samples))` (§4.3).

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tpde_types::{Embedding, EmbeddingMethod, FeatureBundle, Sequence};

#[derive(Debug, Error, PartialEq)]
pub enum EmbedError {
    #[error("method `learned` is reserved and not yet supported")]
    UnsupportedMethod,
    #[error("sequence has fewer than 2 samples")]
    EmptySequence,
    #[error("feature extraction failed: {0}")]
    Feature(String),
}

impl From<tpde_features::FeatureError> for EmbedError {
    fn from(e: tpde_features::FeatureError) -> Self {
        EmbedError::Feature(e.to_string())
    }
}

/// Per-call options for [`EmbeddingBridge::embed`] (§4.3).
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub method: EmbeddingMethod,
    pub target_dim: usize,
    pub include_wavelet: bool,
    pub normalize: bool,
    pub use_cache: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            method: EmbeddingMethod::Hybrid,
            target_dim: 256,
            include_wavelet: true,
            normalize: true,
            use_cache: true,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone)]
struct CacheKey {
    method: u8,
    include_wavelet: bool,
    target_dim: usize,
    sample_hash: u64,
}

fn short_hash(samples: &[f32]) -> u64 {
    // FNV-1a over the raw IEEE-754 bit patterns; not cryptographic, only
    // needs to disambiguate within the process's cache.
    let mut hash: u64 = 0xcbf29ce484222325;
    for &s in samples {
        for byte in s.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}

fn method_tag(m: EmbeddingMethod) -> u8 {
    match m {
        EmbeddingMethod::Statistical => 0,
        EmbeddingMethod::Frequency => 1,
        EmbeddingMethod::Dtw => 2,
        EmbeddingMethod::Wavelet => 3,
        EmbeddingMethod::Hybrid => 4,
        EmbeddingMethod::Learned => 5,
    }
}

/// Reference sequences used by the DTW extractor, held behind a swapped
/// `Arc` so concurrent embed calls see a consistent template set and
/// `set_templates` takes effect starting with the next call (§6 "Templates
/// interface").
#[derive(Default)]
pub struct TemplateSet {
    templates: RwLock<Arc<Vec<Vec<f32>>>>,
}

impl TemplateSet {
    pub fn new(templates: Vec<Vec<f32>>) -> Self {
        Self {
            templates: RwLock::new(Arc::new(templates)),
        }
    }

    pub fn set(&self, templates: Vec<Vec<f32>>) {
        *self.templates.write() = Arc::new(templates);
    }

    pub fn get(&self) -> Arc<Vec<Vec<f32>>> {self.templates.read().clone()}
}

/// Embedding bridge (C3): the single entry point that turns a [`Sequence`]
/// into an [`Embedding`].
pub struct EmbeddingBridge {
    templates: TemplateSet,
    cache: Mutex<LruCache<CacheKey, Arc<[f32]>>>,
}

const DEFAULT_CACHE_CAPACITY: usize = 1_000;

impl EmbeddingBridge {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            templates: TemplateSet::default(),
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn set_templates(&self, templates: Vec<Vec<f32>>) {
        self.templates.set(templates);
    }

    /// Produce an [`Embedding`] for `sequence` under `opts` (§4.3 algorithm).
    pub fn embed(&self, sequence: &Sequence, opts: &EmbedOptions) -> Result<Embedding, EmbedError> {
        if opts.method == EmbeddingMethod::Learned {
            return Err(EmbedError::UnsupportedMethod);
        }
        if sequence.len() < 2 {
            return Err(EmbedError::EmptySequence);
        }

        let key = CacheKey {
            method: method_tag(opts.method),
            include_wavelet: opts.include_wavelet,
            target_dim: opts.target_dim,
            sample_hash: short_hash(sequence.samples()),
        };

        if opts.use_cache {
            let start = Instant::now();
            let hit = self.cache.lock().get(&key).cloned();
            if let Some(vector) = hit {
                return Ok(Embedding {
                    vector: vector.to_vec(),
                    method: opts.method,
                    window_size: sequence.len(),
                    generation_time_ns: start.elapsed().as_nanos() as u64,
                    metadata: sequence.metadata.clone(),
                });
            }
        }

        let start = Instant::now();
        let bundle = self.extract_bundle(sequence.samples(), opts)?;
        let mut vector = bundle.concat();

        if opts.normalize {
            normalize_l2(&mut vector);
        }
        resize(&mut vector, opts.target_dim);

        if opts.use_cache {
            self.cache.lock().put(key, Arc::from(vector.clone().into_boxed_slice()));
        }

        Ok(Embedding {
            vector,
            method: opts.method,
            window_size: sequence.len(),
            generation_time_ns: start.elapsed().as_nanos() as u64,
            metadata: sequence.metadata.clone(),
        })
    }

    fn extract_bundle(&self, samples: &[f32], opts: &EmbedOptions) -> Result<FeatureBundle, EmbedError> {
        let mut bundle = FeatureBundle::default();
        let needs_statistical = matches!(
            opts.method,
            EmbeddingMethod::Statistical | EmbeddingMethod::Hybrid
        );
        let needs_spectral = matches!(
            opts.method,
            EmbeddingMethod::Frequency | EmbeddingMethod::Hybrid
        );
        let templates = self.templates.get();
        let needs_dtw = matches!(opts.method, EmbeddingMethod::Dtw)
            || (opts.method == EmbeddingMethod::Hybrid && !templates.is_empty());
        let needs_wavelet = matches!(opts.method, EmbeddingMethod::Wavelet)
            || (opts.method == EmbeddingMethod::Hybrid && opts.include_wavelet);

        if needs_statistical {
            bundle.statistical = tpde_features::statistical_features(samples)?;
        }
        if needs_spectral {
            bundle.spectral = tpde_features::spectral_features(samples)?;
        }
        if needs_dtw {
            bundle.dtw = tpde_features::dtw_features(samples, &templates);
        }
        if needs_wavelet {
            bundle.wavelet = tpde_features::wavelet_features(samples)?;
        }

        Ok(bundle)
    }
}

impl Default for EmbeddingBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// L2-normalize in place; a zero vector passes through unchanged (§4.3 step 4).
fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Truncate or zero-pad to exactly `target_dim` (§4.3 step 5).
fn resize(v: &mut Vec<f32>, target_dim: usize) {
    v.resize(target_dim, 0.0);
    v.truncate(target_dim);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpde_types::SequenceMetadata;

    fn seq(samples: Vec<f32>) -> Sequence {
        Sequence::from_raw(samples, 0, SequenceMetadata::default())
    }

    #[test]
    fn learned_method_is_unsupported() {
        let bridge = EmbeddingBridge::new();
        let opts = EmbedOptions {
            method: EmbeddingMethod::Learned,
            ..Default::default()
        };
        assert_eq!(
            bridge.embed(&seq(vec![1.0, 2.0, 3.0]), &opts),
            Err(EmbedError::UnsupportedMethod)
        );
    }

    #[test]
    fn too_short_sequence_is_rejected() {
        let bridge = EmbeddingBridge::new();
        let opts = EmbedOptions::default();
        assert_eq!(
            bridge.embed(&seq(vec![1.0]), &opts),
            Err(EmbedError::EmptySequence)
        );
    }

    #[test]
    fn normalized_embedding_has_unit_norm() {
        let bridge = EmbeddingBridge::new();
        let samples: Vec<f32> = (0..64).map(|i| (i as f32).sin()).collect();
        let opts = EmbedOptions {
            target_dim: 128,
            ..Default::default()
        };
        let e = bridge.embed(&seq(samples), &opts).unwrap();
        assert_eq!(e.dim(), 128);
        assert!(e.is_unit_norm());
    }

    #[test]
    fn caching_yields_bit_identical_vectors() {
        let bridge = EmbeddingBridge::new();
        let samples: Vec<f32> = (0..64).map(|i| (i as f32).cos()).collect();
        let opts = EmbedOptions::default();
        let a = bridge.embed(&seq(samples.clone()), &opts).unwrap();
        let b = bridge.embed(&seq(samples), &opts).unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[test]
    fn uncached_repeated_embeds_agree_within_tolerance() {
        let bridge = EmbeddingBridge::new();
        let samples: Vec<f32> = (0..64).map(|i| (i as f32).cos()).collect();
        let opts = EmbedOptions {
            use_cache: false,
            ..Default::default()
        };
        let a = bridge.embed(&seq(samples.clone()), &opts).unwrap();
        let b = bridge.embed(&seq(samples), &opts).unwrap();
        for (x, y) in a.vector.iter().zip(b.vector.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn target_dim_shorter_than_features_truncates() {
        let bridge = EmbeddingBridge::new();
        let samples: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let opts = EmbedOptions {
            method: EmbeddingMethod::Statistical,
            target_dim: 4,
            normalize: false,
            ..Default::default()
        };
        let e = bridge.embed(&seq(samples), &opts).unwrap();
        assert_eq!(e.dim(), 4);
    }
}
