//! Experience replay (C7) and RL agent (C8): the components the adaptive
//! learning engine (C9) drives to tune pipeline parameters from observed
//! reward.

mod agent;
mod buffer;
mod mlp;

pub use agent::{
    Agent, AgentConfig, AgentKind, AgentKindTag, AgentSnapshot, ActorCriticAgent, DqnAgent,
    QLearningAgent, SarsaAgent,
};
pub use buffer::{ExperienceBuffer, DEFAULT_CAPACITY};
pub use mlp::{Activation, Mlp};
