use serde::{Deserialize, Serialize};

/// Concrete replacement for the "duck-typed metrics map" flagged in §9: a
/// named record the host's metrics source produces and the adaptive learning
/// engine's state encoder (§4.9) consumes directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingMetrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub false_positive_rate: f32,
    pub latency_ms: f32,
    pub throughput_eps: f32,
    pub memory_mb: f32,
    pub cpu_pct: f32,
    pub variance: f32,
    pub trend_code: f32,
    pub seasonality_flag: f32,
    pub outlier_rate: f32,
    pub missing_rate: f32,
}
