//! # Multi-Agent Environment Module
//!
//! The trainer only sees environments through [`MultiAgentEnv`] and the
//! [`EnvDescriptor`] it publishes. Scenario physics live behind the trait;
//! [`EnvPool`] drives several instances in lock step.

pub mod pool;
pub mod spread;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{MaddpgError, Result};

pub use pool::{EnvPool, PoolStep};
pub use spread::SpreadEnv;

/// Action space of one agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionSpace {
    /// Bounded real vector.
    Continuous { dim: usize, low: f32, high: f32 },
    /// Categorical choice among `n` actions, encoded one-hot.
    Discrete { n: usize },
}

impl ActionSpace {
    /// Width of the action vector fed to critics and stored in the buffer.
    pub fn dim(&self) -> usize {
        match self {
            ActionSpace::Continuous { dim, .. } => *dim,
            ActionSpace::Discrete { n } => *n,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, ActionSpace::Discrete { .. })
    }
}

/// Role group of an agent slot; each group picks its own critic variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    Agent,
    Adversary,
}

/// What the environment declares about one agent slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub role: AgentRole,
    pub observation_dim: usize,
    pub action_space: ActionSpace,
}

impl AgentSpec {
    /// Reject spaces no network can be sized for: empty observations or
    /// actions, and continuous bounds that are not a finite `low <= high`.
    pub fn validate(&self) -> Result<()> {
        if self.observation_dim == 0 {
            return Err(MaddpgError::config("observation_dim must be positive"));
        }
        match self.action_space {
            ActionSpace::Discrete { n: 0 } => Err(MaddpgError::config("discrete action space needs n > 0")),
            ActionSpace::Continuous { dim: 0, .. } => Err(MaddpgError::config("continuous action space needs dim > 0")),
            ActionSpace::Continuous { low, high, .. } if !(low.is_finite() && high.is_finite() && low <= high) => {
                Err(MaddpgError::config(format!(
                    "continuous action bounds must be finite with low <= high, got [{}, {}]",
                    low, high
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Per-agent observation and action spaces of an environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvDescriptor {
    pub agents: Vec<AgentSpec>,
}

impl EnvDescriptor {
    pub fn new(agents: Vec<AgentSpec>) -> Self {
        EnvDescriptor { agents }
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn observation_dims(&self) -> Vec<usize> {
        self.agents.iter().map(|a| a.observation_dim).collect()
    }

    pub fn action_dims(&self) -> Vec<usize> {
        self.agents.iter().map(|a| a.action_space.dim()).collect()
    }

    /// True when every agent has the same observation width and action space.
    pub fn is_homogeneous(&self) -> bool {
        self.agents.windows(2).all(|pair| {
            pair[0].observation_dim == pair[1].observation_dim && pair[0].action_space == pair[1].action_space
        })
    }
}

/// Result of stepping one environment instance.
#[derive(Clone, Debug)]
pub struct EnvStep {
    pub observations: Vec<Array1<f32>>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub info: HashMap<String, f32>,
}

/// A simultaneous-move environment with a fixed set of agents.
pub trait MultiAgentEnv: Send {
    fn descriptor(&self) -> EnvDescriptor;

    /// Start a new episode; one observation per agent.
    fn reset(&mut self) -> Result<Vec<Array1<f32>>>;

    /// Apply one action per agent (one-hot for discrete agents).
    fn step(&mut self, actions: &[Array1<f32>]) -> Result<EnvStep>;

    fn seed(&mut self, seed: u64);
}
