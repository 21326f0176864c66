//! Pipeline orchestrator (C6): per-event embed -> store -> search -> score,
//! with per-stage budgets, backpressure (drop inserts before search), and a
//! per-event hard deadline enforced with `tokio::time::timeout`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tpde_embedding::{EmbedError, EmbedOptions, EmbeddingBridge};
use tpde_hnsw::{HnswConfig, HnswIndex, IndexError};
use tpde_store::{Precision, StoreError, VectorStore};
use tpde_types::{
    ErrorKindTag, Parameters, Sequence, SequenceMetadata, MAX_SEQUENCE_LEN, MIN_SEQUENCE_LEN,
};

/// Backoff schedule for the Transient storage-write retry policy (§7): up to
/// three attempts at 1/5/25 ms before degrading to search-only for the event.
const STORAGE_RETRY_BACKOFF_MS: [u64; 3] = [1, 5, 25];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("event exceeded its {deadline_ms} ms deadline")]
    DeadlineExceeded { deadline_ms: u64 },
    #[error("sequence has {len} samples, outside the allowed [{MIN_SEQUENCE_LEN}, {MAX_SEQUENCE_LEN}] range")]
    InvalidLength { len: usize },
}

/// One ingress record (§6 "a stream of events"): `(id, timestamp, samples,
/// metadata)`. `metadata` is accepted but not yet consumed by the core; it is
/// carried through so a host can thread it into an audit sink.
#[derive(Debug, Clone)]
pub struct IngressEvent {
    pub id: String,
    pub timestamp_ns: i64,
    pub samples: Vec<f32>,
    pub metadata: std::collections::HashMap<String, String>,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKindTag {
        match self {
            PipelineError::Embed(_) => ErrorKindTag::InvalidInput,
            PipelineError::Store(_) => ErrorKindTag::Transient,
            PipelineError::Index(_) => ErrorKindTag::InvalidInput,
            PipelineError::DeadlineExceeded { .. } => ErrorKindTag::DeadlineExceeded,
            PipelineError::InvalidLength { .. } => ErrorKindTag::InvalidInput,
        }
    }
}

/// Tunables for the orchestrator and the store/index it owns (§4.4, §4.5,
/// §4.6, §5).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    pub dim: usize,
    pub precision: PrecisionTag,
    pub min_neighbors: usize,
    pub top_k: usize,
    pub hard_deadline_ms: u64,
    pub embedding_budget_ms: u64,
    pub storage_budget_ms: u64,
    pub search_budget_ms: u64,
    pub total_budget_ms: u64,
    pub hnsw: HnswConfig,
    pub store_max_entries: Option<usize>,
    pub store_ttl_ns: Option<i64>,
    /// Ingress admission control (§4.6 second backpressure tier): once the
    /// event channel backs up to this many queued events, `run_ingress`
    /// sheds the event outright instead of running it through embed/store/
    /// search. `None` disables shedding (the store's `max_entries` drop is
    /// the only tier active).
    pub ingress_shed_queue_depth: Option<usize>,
    pub include_wavelet: bool,
    pub normalize: bool,
    pub use_cache: bool,
}

/// Serde-friendly mirror of [`tpde_store::Precision`] (which carries no
/// derive for `Serialize`/`Deserialize` since it is a plain per-call enum,
/// not a persisted one) so [`PipelineConfig`] can still round-trip through
/// the `config` crate's layered sources per §1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrecisionTag {
    Full,
    Eight,
    Four,
}

impl From<PrecisionTag> for Precision {
    fn from(tag: PrecisionTag) -> Self {
        match tag {
            PrecisionTag::Full => Precision::Full,
            PrecisionTag::Eight => Precision::Eight,
            PrecisionTag::Four => Precision::Four,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let dim = 256;
        Self {
            dim,
            precision: PrecisionTag::Full,
            min_neighbors: 1,
            top_k: 10,
            hard_deadline_ms: 500,
            embedding_budget_ms: 10,
            storage_budget_ms: 10,
            search_budget_ms: 15,
            total_budget_ms: 100,
            hnsw: HnswConfig {
                dim,
                ..HnswConfig::default()
            },
            store_max_entries: None,
            store_ttl_ns: None,
            ingress_shed_queue_depth: None,
            include_wavelet: true,
            normalize: true,
            use_cache: true,
        }
    }
}

/// `(id, timestamp, embedding_ns, storage_ns, search_ns, total_ns, anomaly,
/// score)` (§4.6) plus the `inserted` backpressure flag and the
/// `error_kind` an incompletable event was tagged with (§7).
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub id: String,
    pub timestamp: i64,
    pub embedding_ns: u64,
    pub storage_ns: u64,
    pub search_ns: u64,
    pub total_ns: u64,
    pub anomaly: bool,
    pub score: f32,
    pub inserted: bool,
    pub error_kind: Option<ErrorKindTag>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ErrorKindCounts {
    pub invalid_input: u64,
    pub resource_exhaustion: u64,
    pub deadline_exceeded: u64,
    pub transient: u64,
    pub corruption: u64,
}

impl ErrorKindCounts {
    fn increment(&mut self, kind: ErrorKindTag) {
        match kind {
            ErrorKindTag::InvalidInput => self.invalid_input += 1,
            ErrorKindTag::ResourceExhaustion => self.resource_exhaustion += 1,
            ErrorKindTag::DeadlineExceeded => self.deadline_exceeded += 1,
            ErrorKindTag::Transient => self.transient += 1,
            ErrorKindTag::Corruption => self.corruption += 1,
        }
    }
}

/// Stats snapshot (§6 egress): the subset owned by the orchestrator itself.
/// `rl_episode_count`/`best_reward`/`exploration_rate`/`overhead_pct` live on
/// the adaptive learning engine and are merged in by the host via
/// [`PipelineStats::with_rl`] when assembling the full snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub processed_count: u64,
    pub anomaly_count: u64,
    pub embedding_p50_ns: u64,
    pub embedding_p95_ns: u64,
    pub embedding_p99_ns: u64,
    pub storage_p50_ns: u64,
    pub storage_p95_ns: u64,
    pub storage_p99_ns: u64,
    pub search_p50_ns: u64,
    pub search_p95_ns: u64,
    pub search_p99_ns: u64,
    pub store_size: usize,
    pub index_edges: usize,
    pub dropped_inserts: u64,
    pub error_counts: ErrorKindCounts,
    pub rl_episode_count: u64,
    pub best_reward: f32,
    pub exploration_rate: f32,
    pub overhead_pct: f32,
}

impl PipelineStats {
    pub fn with_rl(mut self, episode_count: u64, best_reward: f32, exploration_rate: f32, overhead_pct: f32) -> Self {
        self.rl_episode_count = episode_count;
        self.best_reward = best_reward;
        self.exploration_rate = exploration_rate;
        self.overhead_pct = overhead_pct;
        self
    }
}

const LATENCY_RESERVOIR_CAP: usize = 4_096;

#[derive(Default)]
struct StatsInner {
    processed_count: u64,
    anomaly_count: u64,
    error_counts: ErrorKindCounts,
    embedding_latencies: VecDeque<u64>,
    storage_latencies: VecDeque<u64>,
    search_latencies: VecDeque<u64>,
}

fn push_bounded(reservoir: &mut VecDeque<u64>, value: u64) {
    if reservoir.len() >= LATENCY_RESERVOIR_CAP {
        reservoir.pop_front();
    }
    reservoir.push_back(value);
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p * (sorted.len() - 1) as f64).round() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Per-event orchestrator (C6): owns the embedding bridge, vector store, and
/// HNSW index, and ties embed -> store -> search -> score together under
/// budgets and a hard deadline.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    bridge: EmbeddingBridge,
    store: VectorStore,
    index: HnswIndex,
    stats: Mutex<StatsInner>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        let mut store = VectorStore::new(config.dim);
        if let Some(max) = config.store_max_entries {
            store = store.with_max_entries(max);
        }
        if let Some(ttl) = config.store_ttl_ns {
            store = store.with_ttl_ns(ttl);
        }
        Self {
            bridge: EmbeddingBridge::new(),
            store,
            index: HnswIndex::new(config.hnsw),
            stats: Mutex::new(StatsInner::default()),
            config,
        }
    }

    pub fn set_templates(&self, templates: Vec<Vec<f32>>) {
        self.bridge.set_templates(templates);
    }

    /// Drain `events` in arrival order and forward each [`ProcessedEvent`] to
    /// `results` as it completes (§5 "events produce ProcessedEvent in
    /// arrival order within a single orchestrator instance"). A single
    /// channel feeding a single sequential consumer is what gives that
    /// guarantee without a reorder buffer; `params` is read fresh for every
    /// event so an in-flight parameter update from C9 takes effect on the
    /// next event rather than requiring a restart.
    ///
    /// Admission control (§4.6 second backpressure tier) runs before any of
    /// embed/store/search: once the channel's queued length reaches
    /// `config.ingress_shed_queue_depth`, the event is shed on the spot
    /// rather than processed, on top of (not instead of) the store's own
    /// `max_entries` insert-dropping.
    pub async fn run_ingress(
        self: Arc<Self>,
        mut events: mpsc::Receiver<IngressEvent>,
        params: Arc<parking_lot::RwLock<Parameters>>,
        results: mpsc::Sender<ProcessedEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if let Some(threshold) = self.config.ingress_shed_queue_depth {
                let queue_depth = events.len();
                if queue_depth >= threshold {
                    self.stats.lock().error_counts.increment(ErrorKindTag::ResourceExhaustion);
                    tracing::warn!(
                        event_id = %event.id,
                        queue_depth,
                        threshold,
                        "admission control: shedding event under ingress pressure"
                    );
                    continue;
                }
            }

            let current_params = *params.read();
            match self
                .process_event(event.id, event.timestamp_ns, &event.samples, &current_params)
                .await
            {
                Ok(processed) => {
                    if results.send(processed).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "event dropped: embedding failure"),
            }
        }
    }

    /// Remove stale entries from both the store and the index, preserving
    /// the §3 invariant that the HNSW graph holds exactly the live entries.
    pub fn evict_expired(&self, now_ns: i64) -> usize {
        let slots = self.store.evict_expired(now_ns);
        for slot in &slots {
            self.index.delete(*slot);
        }
        slots.len()
    }

    /// Process one event end-to-end (§4.6). Only an embedding failure is
    /// fatal and returned as `Err`; storage failures and low-confidence
    /// searches are folded into the returned [`ProcessedEvent`] instead. A
    /// deadline overrun yields `Ok` with a `DeadlineExceeded` verdict rather
    /// than an error, per §7.
    pub async fn process_event(
        &self,
        id: impl Into<String>,
        timestamp_ns: i64,
        samples: &[f32],
        params: &Parameters,
    ) -> Result<ProcessedEvent, PipelineError> {
        let id = id.into();
        let deadline = Duration::from_millis(self.config.hard_deadline_ms);

        match tokio::time::timeout(
            deadline,
            self.process_event_inner(id.clone(), timestamp_ns, samples, params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.stats.lock().error_counts.increment(ErrorKindTag::DeadlineExceeded);
                tracing::warn!(event_id = %id, deadline_ms = self.config.hard_deadline_ms, "event exceeded hard deadline");
                Ok(ProcessedEvent {
                    id,
                    timestamp: timestamp_ns,
                    embedding_ns: 0,
                    storage_ns: 0,
                    search_ns: 0,
                    total_ns: deadline.as_nanos() as u64,
                    anomaly: true,
                    score: 1.0,
                    inserted: false,
                    error_kind: Some(ErrorKindTag::DeadlineExceeded),
                })
            }
        }
    }

    async fn process_event_inner(
        &self,
        id: String,
        timestamp_ns: i64,
        samples: &[f32],
        params: &Parameters,
    ) -> Result<ProcessedEvent, PipelineError> {
        let total_start = Instant::now();

        let embed_start = Instant::now();
        let sequence = Sequence::new(samples.to_vec(), timestamp_ns, SequenceMetadata::default())
            .ok_or(PipelineError::InvalidLength { len: samples.len() })?;
        let opts = EmbedOptions {
            method: params.method,
            target_dim: self.config.dim,
            include_wavelet: self.config.include_wavelet,
            normalize: self.config.normalize,
            use_cache: self.config.use_cache,
        };
        let embedding = self.bridge.embed(&sequence, &opts)?;
        let embedding_ns = embed_start.elapsed().as_nanos() as u64;
        self.check_budget("embedding", embedding_ns, self.config.embedding_budget_ms);

        let vector = embedding.vector.clone();
        let precision: Precision = self.config.precision.into();

        let store_fut = async {
            let start = Instant::now();
            let mut result = self.store.insert(None, embedding.clone(), precision, timestamp_ns);
            for &backoff_ms in &STORAGE_RETRY_BACKOFF_MS {
                if result.is_ok() {
                    break;
                }
                tracing::warn!(event_id = %id, backoff_ms, "storage insert failed, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                result = self.store.insert(None, embedding.clone(), precision, timestamp_ns);
            }
            (result, start.elapsed().as_nanos() as u64)
        };
        let search_fut = async {
            let start = Instant::now();
            let result = self.index.search(&vector, self.config.top_k);
            (result, start.elapsed().as_nanos() as u64)
        };
        let ((store_result, storage_ns), (search_result, search_ns)) = tokio::join!(store_fut, search_fut);

        self.check_budget("storage", storage_ns, self.config.storage_budget_ms);
        self.check_budget("search", search_ns, self.config.search_budget_ms);

        let mut inserted = false;
        match store_result {
            Ok(Some((_pattern_id, slot))) => {
                inserted = true;
                if let Err(e) = self.index.insert(slot, vector) {
                    tracing::warn!(event_id = %id, error = %e, "index insert failed after store insert");
                }
            }
            Ok(None) => {
                tracing::debug!(event_id = %id, "backpressure: insert dropped");
            }
            Err(e) => {
                tracing::warn!(event_id = %id, error = %e, "storage insert failed, continuing with search only");
                self.stats.lock().error_counts.increment(ErrorKindTag::Transient);
            }
        }

        let (anomaly, score, search_error_kind) = match search_result {
            Ok(results) if results.is_empty() => (true, 1.0, None),
            Ok(results) => {
                let mean_sim = results.iter().map(|&(_, s)| s).sum::<f32>() / results.len() as f32;
                let score = 1.0 - mean_sim;
                let top_sim = results[0].1;
                let anomaly = results.len() < self.config.min_neighbors || top_sim < 1.0 - params.threshold;
                (anomaly, score, None)
            }
            Err(e) => {
                tracing::warn!(event_id = %id, error = %e, "search failed, emitting conservative anomaly verdict");
                self.stats.lock().error_counts.increment(ErrorKindTag::Transient);
                (true, 1.0, Some(ErrorKindTag::Transient))
            }
        };

        let total_ns = total_start.elapsed().as_nanos() as u64;
        self.check_budget("total", total_ns, self.config.total_budget_ms);

        {
            let mut stats = self.stats.lock();
            stats.processed_count += 1;
            if anomaly {
                stats.anomaly_count += 1;
            }
            push_bounded(&mut stats.embedding_latencies, embedding_ns);
            push_bounded(&mut stats.storage_latencies, storage_ns);
            push_bounded(&mut stats.search_latencies, search_ns);
        }

        Ok(ProcessedEvent {
            id,
            timestamp: timestamp_ns,
            embedding_ns,
            storage_ns,
            search_ns,
            total_ns,
            anomaly,
            score,
            inserted,
            error_kind: search_error_kind,
        })
    }

    fn check_budget(&self, stage: &str, elapsed_ns: u64, budget_ms: u64) {
        let budget_ns = budget_ms * 1_000_000;
        if elapsed_ns > budget_ns {
            tracing::warn!(stage, elapsed_ns, budget_ns, "pipeline stage exceeded its budget");
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let inner = self.stats.lock();
        let mut embedding_sorted: Vec<u64> = inner.embedding_latencies.iter().copied().collect();
        let mut storage_sorted: Vec<u64> = inner.storage_latencies.iter().copied().collect();
        let mut search_sorted: Vec<u64> = inner.search_latencies.iter().copied().collect();
        embedding_sorted.sort_unstable();
        storage_sorted.sort_unstable();
        search_sorted.sort_unstable();

        let store_stats = self.store.stats();

        PipelineStats {
            processed_count: inner.processed_count,
            anomaly_count: inner.anomaly_count,
            embedding_p50_ns: percentile(&embedding_sorted, 0.50),
            embedding_p95_ns: percentile(&embedding_sorted, 0.95),
            embedding_p99_ns: percentile(&embedding_sorted, 0.99),
            storage_p50_ns: percentile(&storage_sorted, 0.50),
            storage_p95_ns: percentile(&storage_sorted, 0.95),
            storage_p99_ns: percentile(&storage_sorted, 0.99),
            search_p50_ns: percentile(&search_sorted, 0.50),
            search_p95_ns: percentile(&search_sorted, 0.95),
            search_p99_ns: percentile(&search_sorted, 0.99),
            store_size: store_stats.count,
            index_edges: self.index.edge_count(),
            dropped_inserts: store_stats.dropped_inserts,
            error_counts: inner.error_counts,
            rl_episode_count: 0,
            best_reward: 0.0,
            exploration_rate: 0.0,
            overhead_pct: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(len: usize, seed: f32) -> Vec<f32> {
        (0..len).map(|i| (i as f32 + seed).sin()).collect()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            dim: 32,
            hnsw: HnswConfig {
                dim: 32,
                seed: Some(1),
                ..HnswConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn process_event_produces_plausible_verdict() {
        let orchestrator = PipelineOrchestrator::new(small_config());
        let params = Parameters::default();
        let event = orchestrator
            .process_event("evt-1", 0, &samples(64, 0.0), &params)
            .await
            .unwrap();
        assert!(event.inserted);
        assert!((0.0..=2.0).contains(&event.score) || event.score == 1.0);
        assert!(event.total_ns > 0);
    }

    #[tokio::test]
    async fn repeated_similar_events_are_not_flagged_anomalous() {
        let orchestrator = PipelineOrchestrator::new(small_config());
        let params = Parameters::default();
        for i in 0..10 {
            orchestrator
                .process_event(format!("evt-{i}"), i as i64, &samples(64, 0.0), &params)
                .await
                .unwrap();
        }
        let event = orchestrator
            .process_event("evt-probe", 10, &samples(64, 0.0), &params)
            .await
            .unwrap();
        assert!(!event.anomaly);
    }

    #[tokio::test]
    async fn backpressure_marks_later_inserts_as_dropped_but_keeps_processing() {
        let mut config = small_config();
        config.store_max_entries = Some(5);
        let orchestrator = PipelineOrchestrator::new(config);
        let params = Parameters::default();

        let mut inserted_count = 0;
        for i in 0..10 {
            let event = orchestrator
                .process_event(format!("evt-{i}"), i as i64, &samples(64, i as f32), &params)
                .await
                .unwrap();
            if event.inserted {
                inserted_count += 1;
            }
        }
        assert_eq!(inserted_count, 5);
        assert_eq!(orchestrator.stats().processed_count, 10);
        assert_eq!(orchestrator.stats().dropped_inserts, 5);
    }

    #[tokio::test]
    async fn stats_track_processed_and_anomaly_counts() {
        let orchestrator = PipelineOrchestrator::new(small_config());
        let params = Parameters::default();
        orchestrator.process_event("evt-1", 0, &samples(64, 0.0), &params).await.unwrap();
        let stats = orchestrator.stats();
        assert_eq!(stats.processed_count, 1);
        assert_eq!(stats.store_size, 1);
    }

    #[tokio::test]
    async fn deadline_exceeded_yields_conservative_verdict_not_an_error() {
        let mut config = small_config();
        config.hard_deadline_ms = 0;
        let orchestrator = PipelineOrchestrator::new(config);
        let params = Parameters::default();
        let event = orchestrator
            .process_event("evt-1", 0, &samples(64, 0.0), &params)
            .await
            .unwrap();
        assert!(event.anomaly);
        assert_eq!(event.error_kind, Some(ErrorKindTag::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_ingress_emits_results_in_arrival_order() {
        let orchestrator = Arc::new(PipelineOrchestrator::new(small_config()));
        let params = Arc::new(parking_lot::RwLock::new(Parameters::default()));
        let (event_tx, event_rx) = mpsc::channel(16);
        let (result_tx, mut result_rx) = mpsc::channel(16);

        let handle = tokio::spawn(orchestrator.run_ingress(event_rx, params, result_tx));

        for i in 0..5 {
            event_tx
                .send(IngressEvent {
                    id: format!("evt-{i}"),
                    timestamp_ns: i as i64,
                    samples: samples(64, i as f32),
                    metadata: std::collections::HashMap::new(),
                })
                .await
                .unwrap();
        }
        drop(event_tx);

        let mut ids = Vec::new();
        while let Some(event) = result_rx.recv().await {
            ids.push(event.id);
        }
        handle.await.unwrap();

        assert_eq!(ids, vec!["evt-0", "evt-1", "evt-2", "evt-3", "evt-4"]);
    }

    #[tokio::test]
    async fn ingress_admission_control_sheds_events_past_queue_depth() {
        let mut config = small_config();
        config.ingress_shed_queue_depth = Some(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(config));
        let params = Arc::new(parking_lot::RwLock::new(Parameters::default()));
        let (event_tx, event_rx) = mpsc::channel(16);
        let (result_tx, mut result_rx) = mpsc::channel(16);

        let handle = tokio::spawn(orchestrator.clone().run_ingress(event_rx, params, result_tx));

        for i in 0..5 {
            event_tx
                .send(IngressEvent {
                    id: format!("evt-{i}"),
                    timestamp_ns: i as i64,
                    samples: samples(64, i as f32),
                    metadata: std::collections::HashMap::new(),
                })
                .await
                .unwrap();
        }
        drop(event_tx);

        let mut results = Vec::new();
        while let Some(event) = result_rx.recv().await {
            results.push(event);
        }
        handle.await.unwrap();

        assert!(results.is_empty());
        assert_eq!(orchestrator.stats().processed_count, 0);
        assert_eq!(
            orchestrator.stats().error_counts.resource_exhaustion,
            5
        );
    }
}
