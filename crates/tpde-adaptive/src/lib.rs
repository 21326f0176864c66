//! Adaptive learning engine (C9): encodes streaming state, decodes RL
//! actions into pipeline parameters, shapes reward, and drives the
//! auto-tune control loop around a [`tpde_rl::AgentKind`].

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tpde_rl::{Agent, AgentConfig, AgentKind, AgentKindTag};
use tpde_types::{Action, ActionRanges, EmbeddingMethod, Parameters, State, StreamingMetrics, Transition};

#[derive(Debug, Error)]
pub enum AdaptiveError {
    #[error("snapshot version `{found}` does not match expected `{expected}`")]
    VersionMismatch { expected: String, found: String },
    #[error("snapshot failed to deserialize: {0}")]
    Corruption(String),
}

/// Reward shaping weights (§4.9). Defaults match the accuracy-favoring,
/// false-positive-averse weighting named in the spec.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RewardWeights {
    pub accuracy: f32,
    pub latency: f32,
    pub memory: f32,
    pub false_positive: f32,
    pub throughput: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            accuracy: 1.0,
            latency: -0.3,
            memory: -0.2,
            false_positive: -0.8,
            throughput: 0.5,
        }
    }
}

const LATENCY_NORM_MS: f32 = 1_000.0;
const MEMORY_NORM_MB: f32 = 1_000.0;
const THROUGHPUT_NORM_EPS: f32 = 10_000.0;

/// `r = wa·acc + wL·latency_norm + wM·memory_norm + wFP·fpr + wT·throughput_norm` (§4.9).
pub fn compute_reward(metrics: &StreamingMetrics, weights: &RewardWeights) -> f32 {
    let latency_norm = metrics.latency_ms / LATENCY_NORM_MS;
    let memory_norm = metrics.memory_mb / MEMORY_NORM_MB;
    let throughput_norm = metrics.throughput_eps / THROUGHPUT_NORM_EPS;
    weights.accuracy * metrics.accuracy
        + weights.latency * latency_norm
        + weights.memory * memory_norm
        + weights.false_positive * metrics.false_positive_rate
        + weights.throughput * throughput_norm
}

/// Build the 20-dim state vector from current parameters, the latest
/// streaming metrics, and the running reward EMA (§3 StateSpace), clamping
/// every component to `[0,1]`.
pub fn encode_state(params: &Parameters, metrics: &StreamingMetrics, reward_ema: f32) -> State {
    let mut v = [0.0f32; tpde_types::STATE_DIM];
    v[0] = normalize(params.window, Parameters::WINDOW_RANGE);
    v[1] = normalize(params.slide, Parameters::SLIDE_RANGE);
    v[2] = normalize(params.threshold, Parameters::THRESHOLD_RANGE);
    v[3] = normalize(params.sensitivity, Parameters::SENSITIVITY_RANGE);
    v[4] = if params.adaptive { 1.0 } else { 0.0 };
    v[5] = params.method.to_code();
    v[6] = metrics.accuracy;
    v[7] = metrics.precision;
    v[8] = metrics.recall;
    v[9] = metrics.false_positive_rate;
    v[10] = metrics.latency_ms / LATENCY_NORM_MS;
    v[11] = metrics.throughput_eps / THROUGHPUT_NORM_EPS;
    v[12] = metrics.memory_mb / MEMORY_NORM_MB;
    v[13] = metrics.cpu_pct / 100.0;
    v[14] = metrics.variance;
    v[15] = metrics.trend_code;
    v[16] = metrics.seasonality_flag;
    v[17] = metrics.outlier_rate;
    v[18] = metrics.missing_rate;
    v[19] = reward_ema;
    State::clamped(v)
}

fn normalize(value: f32, range: (f32, f32)) -> f32 {
    ((value - range.0) / (range.1 - range.0)).clamp(0.0, 1.0)
}

/// Decode a 5-dim action into new parameters (§4.9): the first four
/// components are linear deltas against `current`, the fifth jointly
/// selects embedding method and the adaptive-tuning toggle by quantizing
/// at the 0.25/0.5/0.75 thresholds named in the spec. Result is clamped to
/// the declared absolute ranges.
pub fn decode_action(action: &Action, current: &Parameters) -> Parameters {
    let a = action.as_slice();
    let mut next = Parameters {
        window: current.window + ActionRanges::decode(a[0], ActionRanges::WINDOW_DELTA),
        slide: current.slide + ActionRanges::decode(a[1], ActionRanges::SLIDE_DELTA),
        threshold: current.threshold + ActionRanges::decode(a[2], ActionRanges::THRESHOLD_DELTA),
        sensitivity: current.sensitivity + ActionRanges::decode(a[3], ActionRanges::SENSITIVITY_DELTA),
        adaptive: current.adaptive,
        method: current.method,
    };

    let toggle = a[4];
    next.adaptive = toggle >= 0.5;
    next.method = if toggle < 0.25 {
        EmbeddingMethod::Statistical
    } else if toggle < 0.5 {
        EmbeddingMethod::Dtw
    } else if toggle < 0.75 {
        EmbeddingMethod::Wavelet
    } else {
        EmbeddingMethod::Hybrid
    };

    next.clamp();
    next
}

/// Smoothing factor for the running reward EMA folded into state dim 19.
/// Not pinned down numerically by the spec; 0.1 gives a ~10-episode memory,
/// matching the "historical-reward EMA" phrasing without overreacting to a
/// single noisy tick.
const REWARD_EMA_ALPHA: f32 = 0.1;

/// Engine-level configuration: the auto-tune interval plus everything the
/// agent and reward shaper need.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct AdaptiveConfig {
    pub interval_ms: u64,
    pub agent_kind: AgentKindTag,
    pub agent_config: AgentConfig,
    pub reward_weights: RewardWeights,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            agent_kind: AgentKindTag::ActorCritic,
            agent_config: AgentConfig::default(),
            reward_weights: RewardWeights::default(),
        }
    }
}

/// One control-loop tick's result, returned by [`AdaptiveEngine::step`] for
/// both the production async loop and direct testing.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub action: Action,
    pub parameters: Parameters,
    pub reward: f32,
}

/// Running statistics tracked across the control loop (§4.9 step 6).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct AdaptiveStats {
    pub episode_count: u64,
    pub best_reward: f32,
    pub best_params: Parameters,
}

fn new_agent(config: &AdaptiveConfig) -> AgentKind {
    match config.agent_kind {
        AgentKindTag::ActorCritic => AgentKind::actor_critic(config.agent_config),
        AgentKindTag::QLearning => AgentKind::q_learning(config.agent_config),
        AgentKindTag::Sarsa => AgentKind::sarsa(config.agent_config),
        AgentKindTag::Dqn => AgentKind::dqn(config.agent_config),
    }
}

/// Drives RL-based auto-tuning of pipeline parameters (C9). One control-loop
/// tick (see [`AdaptiveEngine::step`]) reads the current metrics, asks the
/// agent for an action, applies the decoded parameters, and records the
/// resulting transition; [`AdaptiveEngine::run`] wraps this in a
/// `tokio::time::interval`-driven loop that composes with the orchestrator's
/// own runtime.
pub struct AdaptiveEngine {
    agent: Mutex<AgentKind>,
    current_params: RwLock<Parameters>,
    reward_ema: RwLock<f32>,
    best_reward: RwLock<f32>,
    best_params: RwLock<Parameters>,
    episode_count: AtomicU64,
    config: AdaptiveConfig,
}

impl AdaptiveEngine {
    pub fn new(config: AdaptiveConfig, initial_params: Parameters) -> Self {
        Self {
            agent: Mutex::new(new_agent(&config)),
            current_params: RwLock::new(initial_params),
            reward_ema: RwLock::new(0.0),
            best_reward: RwLock::new(f32::NEG_INFINITY),
            best_params: RwLock::new(initial_params),
            episode_count: AtomicU64::new(0),
            config,
        }
    }

    pub fn current_parameters(&self) -> Parameters {
        *self.current_params.read()
    }

    pub fn stats(&self) -> AdaptiveStats {
        AdaptiveStats {
            episode_count: self.episode_count.load(Ordering::Relaxed),
            best_reward: *self.best_reward.read(),
            best_params: *self.best_params.read(),
        }
    }

    /// `0.5·(1−ε) + 0.5·min(1, episodes/500)` (§4.9 step 6).
    pub fn convergence_progress(&self) -> f32 {
        let epsilon = self.agent.lock().epsilon();
        let episodes = self.episode_count.load(Ordering::Relaxed) as f32;
        0.5 * (1.0 - epsilon) + 0.5 * (episodes / 500.0).min(1.0)
    }

    /// Run one control-loop tick against `metrics` measured under the
    /// currently-applied parameters (§4.9 steps 1-6): encode state, select
    /// and decode an action, observe the transition, train every
    /// `batch_size` episodes, and update the best-reward bookkeeping.
    /// Returns the new parameters the caller should apply before the next
    /// interval elapses.
    pub fn step(&self, metrics: &StreamingMetrics) -> StepOutcome {
        let current = *self.current_params.read();

        let reward = compute_reward(metrics, &self.config.reward_weights);
        let reward_ema = {
            let mut ema = self.reward_ema.write();
            *ema = REWARD_EMA_ALPHA * reward + (1.0 - REWARD_EMA_ALPHA) * *ema;
            *ema
        };

        let state = encode_state(&current, metrics, reward_ema);

        let mut agent = self.agent.lock();
        let action = agent.select_action(&state);
        let new_params = decode_action(&action, &current);
        let next_state = encode_state(&new_params, metrics, reward_ema);

        agent.observe(Transition {
            state,
            action,
            reward,
            next_state,
            done: false,
        });

        let episode = self.episode_count.fetch_add(1, Ordering::Relaxed) + 1;
        if episode % self.config.agent_config.batch_size as u64 == 0 {
            agent.train();
        }
        drop(agent);

        {
            let mut best_reward = self.best_reward.write();
            if reward > *best_reward {
                *best_reward = reward;
                *self.best_params.write() = new_params;
            }
        }
        *self.current_params.write() = new_params;

        tracing::debug!(episode, reward, window = new_params.window, "adaptive engine tick");

        StepOutcome {
            action,
            parameters: new_params,
            reward,
        }
    }

    /// Async auto-tune loop (§4.9 Expansion): a `tokio::time::interval`
    /// drives one [`AdaptiveEngine::step`] per tick. `apply_parameters` is
    /// the host's parameter sink, called as a total function that never
    /// propagates an error — failures are the host's responsibility to log.
    /// `read_metrics` is a host-provided async closure expected to resolve
    /// within one interval. The loop runs until `running` is cleared.
    pub async fn run<A, R, Fut>(&self, apply_parameters: A, read_metrics: R, running: &AtomicBool)
    where
        A: Fn(Parameters) + Send + Sync,
        R: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = StreamingMetrics> + Send,
    {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(self.config.interval_ms));
        while running.load(Ordering::Relaxed) {
            interval.tick().await;
            let metrics = read_metrics().await;
            let outcome = self.step(&metrics);
            apply_parameters(outcome.parameters);
        }
    }

    /// Export engine state for persistence (§4.9 `export_state`): config,
    /// statistics, current parameters, the agent's experience buffer, and
    /// its weights, under a single version tag.
    pub fn export_state(&self) -> Result<String, AdaptiveError> {
        let agent = self.agent.lock();
        let snapshot = EngineSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            config: self.config,
            stats: self.stats(),
            current_params: self.current_parameters(),
            reward_ema: *self.reward_ema.read(),
            buffer: agent.buffer().snapshot(),
            agent: agent.export(),
        };
        serde_json::to_string(&snapshot).map_err(|e| AdaptiveError::Corruption(e.to_string()))
    }

    /// Reconstruct an engine from a document produced by `export_state`.
    /// Rejects mismatched versions rather than guessing at compatibility.
    pub fn import_state(document: &str) -> Result<Self, AdaptiveError> {
        let snapshot: EngineSnapshot =
            serde_json::from_str(document).map_err(|e| AdaptiveError::Corruption(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AdaptiveError::VersionMismatch {
                expected: SNAPSHOT_VERSION.to_string(),
                found: snapshot.version,
            });
        }

        let agent = AgentKind::import(snapshot.agent);
        agent.buffer().load(snapshot.buffer);

        Ok(Self {
            agent: Mutex::new(agent),
            current_params: RwLock::new(snapshot.current_params),
            reward_ema: RwLock::new(snapshot.reward_ema),
            best_reward: RwLock::new(snapshot.stats.best_reward),
            best_params: RwLock::new(snapshot.stats.best_params),
            episode_count: AtomicU64::new(snapshot.stats.episode_count),
            config: snapshot.config,
        })
    }
}

const SNAPSHOT_VERSION: &str = "1.0.0";

#[derive(serde::Serialize, serde::Deserialize)]
struct EngineSnapshot {
    version: String,
    config: AdaptiveConfig,
    stats: AdaptiveStats,
    current_params: Parameters,
    reward_ema: f32,
    buffer: Vec<Transition>,
    agent: tpde_rl::AgentSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with(accuracy: f32, latency_ms: f32) -> StreamingMetrics {
        StreamingMetrics {
            accuracy,
            precision: 0.9,
            recall: 0.9,
            false_positive_rate: 0.05,
            latency_ms,
            throughput_eps: 5_000.0,
            memory_mb: 200.0,
            cpu_pct: 40.0,
            variance: 0.3,
            trend_code: 0.5,
            seasonality_flag: 0.0,
            outlier_rate: 0.1,
            missing_rate: 0.0,
        }
    }

    #[test]
    fn reward_rewards_accuracy_and_penalizes_latency() {
        let weights = RewardWeights::default();
        let fast_accurate = compute_reward(&metrics_with(0.95, 50.0), &weights);
        let slow_inaccurate = compute_reward(&metrics_with(0.5, 900.0), &weights);
        assert!(fast_accurate > slow_inaccurate);
    }

    #[test]
    fn encoded_state_is_always_in_unit_interval() {
        let params = Parameters::default();
        let state = encode_state(&params, &metrics_with(0.8, 100.0), 0.3);
        assert!(state.all_in_unit_interval());
    }

    #[test]
    fn decoded_action_respects_declared_ranges() {
        let params = Parameters::default();
        let action = Action::clamped([1.0; tpde_types::ACTION_DIM]);
        let next = decode_action(&action, &params);
        assert!(next.in_declared_ranges());
    }

    #[test]
    fn fifth_component_selects_method_and_adaptive_flag_jointly() {
        let params = Parameters::default();
        let low = decode_action(&Action::clamped([0.5, 0.5, 0.5, 0.5, 0.1]), &params);
        assert_eq!(low.method, EmbeddingMethod::Statistical);
        assert!(!low.adaptive);

        let high = decode_action(&Action::clamped([0.5, 0.5, 0.5, 0.5, 0.9]), &params);
        assert_eq!(high.method, EmbeddingMethod::Hybrid);
        assert!(high.adaptive);
    }

    #[test]
    fn step_tracks_best_reward_across_ticks() {
        let config = AdaptiveConfig {
            agent_config: AgentConfig {
                batch_size: 4,
                ..AgentConfig::default()
            },
            ..AdaptiveConfig::default()
        };
        let engine = AdaptiveEngine::new(config, Parameters::default());
        for _ in 0..10 {
            engine.step(&metrics_with(0.9, 80.0));
        }
        let stats = engine.stats();
        assert_eq!(stats.episode_count, 10);
        assert!(stats.best_reward.is_finite());
    }

    #[test]
    fn convergence_progress_increases_with_episodes() {
        let engine = AdaptiveEngine::new(AdaptiveConfig::default(), Parameters::default());
        let before = engine.convergence_progress();
        for _ in 0..50 {
            engine.step(&metrics_with(0.9, 80.0));
        }
        let after = engine.convergence_progress();
        assert!(after >= before);
    }

    #[test]
    fn export_import_round_trips_best_reward() {
        let config = AdaptiveConfig {
            agent_config: AgentConfig {
                batch_size: 2,
                ..AgentConfig::default()
            },
            ..AdaptiveConfig::default()
        };
        let engine = AdaptiveEngine::new(config, Parameters::default());
        for _ in 0..20 {
            engine.step(&metrics_with(0.9, 80.0));
        }
        let before = engine.stats().best_reward;

        let document = engine.export_state().unwrap();
        let imported = AdaptiveEngine::import_state(&document).unwrap();
        assert_eq!(imported.stats().best_reward, before);

        for _ in 0..10 {
            imported.step(&metrics_with(0.9, 80.0));
        }
        assert!(imported.stats().best_reward >= before);
    }

    #[test]
    fn import_rejects_mismatched_version() {
        let engine = AdaptiveEngine::new(AdaptiveConfig::default(), Parameters::default());
        let document = engine.export_state().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&document).unwrap();
        value["version"] = serde_json::json!("0.9.0");
        let tampered = serde_json::to_string(&value).unwrap();
        let result = AdaptiveEngine::import_state(&tampered);
        assert!(matches!(result, Err(AdaptiveError::VersionMismatch { .. })));
    }
}
