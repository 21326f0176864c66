//! Demo entry point: wires tracing-subscriber and layered configuration
//! around the core pipeline, the single place in this workspace allowed to
//! install a global subscriber or reach for `anyhow`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tpde_adaptive::{AdaptiveConfig, AdaptiveEngine};
use tpde_pipeline::{PipelineConfig, PipelineOrchestrator};
use tpde_types::{Parameters, StreamingMetrics};

fn load_config() -> Result<PipelineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("tpde").required(false))
        .add_source(config::Environment::with_prefix("TPDE").separator("__"))
        .build()
        .context("failed to assemble layered configuration")?;

    match settings.try_deserialize::<PipelineConfig>() {
        Ok(cfg) => Ok(cfg),
        Err(_) => Ok(PipelineConfig::default()),
    }
}

fn synthetic_samples(len: usize, phase: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.1 + phase).sin()).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config()?;
    let orchestrator = Arc::new(PipelineOrchestrator::new(config));
    let engine = AdaptiveEngine::new(AdaptiveConfig::default(), Parameters::default());

    tracing::info!("starting demo run: 200 synthetic events");

    let mut params = Parameters::default();
    for i in 0..200 {
        let event = orchestrator
            .process_event(format!("evt-{i}"), i as i64, &synthetic_samples(128, i as f32 * 0.01), &params)
            .await
            .context("event processing failed")?;

        if i % 50 == 49 {
            let metrics = metrics_from_stats(&orchestrator.stats());
            let outcome = engine.step(&metrics);
            params = outcome.parameters;
            tracing::info!(reward = outcome.reward, window = params.window, "adaptive tick");
        }

        if event.anomaly {
            tracing::debug!(event_id = %event.id, score = event.score, "anomaly flagged");
        }
    }

    let stats = orchestrator.stats();
    tracing::info!(
        processed = stats.processed_count,
        anomalies = stats.anomaly_count,
        store_size = stats.store_size,
        index_edges = stats.index_edges,
        "demo run complete"
    );

    Ok(())
}

fn metrics_from_stats(stats: &tpde_pipeline::PipelineStats) -> StreamingMetrics {
    StreamingMetrics {
        accuracy: 1.0 - (stats.anomaly_count as f32 / stats.processed_count.max(1) as f32),
        latency_ms: stats.search_p95_ns as f32 / 1_000_000.0,
        memory_mb: (stats.store_size * 256 * 4) as f32 / (1024.0 * 1024.0),
        throughput_eps: stats.processed_count as f32,
        ..StreamingMetrics::default()
    }
}
