//! Run configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes:
//!
//! ```json
//! { "env_id": "spread", "model_name": "shared", "parameter_sharing": true }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{MaddpgError, Result};

/// Critic flavour chosen per role group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriticVariant {
    /// Centralized critic over every agent's observation and action.
    #[serde(rename = "MADDPG")]
    Maddpg,
    /// Independent critic over the agent's own observation and action.
    #[serde(rename = "DDPG")]
    Ddpg,
}

impl CriticVariant {
    pub fn is_centralized(self) -> bool {
        self == CriticVariant::Maddpg
    }
}

impl FromStr for CriticVariant {
    type Err = MaddpgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MADDPG" => Ok(CriticVariant::Maddpg),
            "DDPG" => Ok(CriticVariant::Ddpg),
            other => Err(MaddpgError::config(format!(
                "unknown algorithm '{}', expected MADDPG or DDPG",
                other
            ))),
        }
    }
}

impl fmt::Display for CriticVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriticVariant::Maddpg => write!(f, "MADDPG"),
            CriticVariant::Ddpg => write!(f, "DDPG"),
        }
    }
}

/// Where parameters live. The ndarray backend only has the CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Which actions fill the other agents' slots when a centralized critic
/// scores an agent's current policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtherAgentActions {
    /// The actions stored in the sampled joint transition.
    #[default]
    Replayed,
    /// The other agents' current deterministic policies on the sampled observations.
    CurrentPolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub env_id: String,
    pub model_name: String,
    pub num_agents: usize,
    pub seed: u64,
    pub n_rollout_threads: usize,
    pub buffer_length: usize,
    pub n_episodes: usize,
    pub episode_length: usize,
    pub steps_per_update: usize,
    pub batch_size: usize,
    pub n_exploration_eps: usize,
    pub init_noise_scale: f32,
    pub final_noise_scale: f32,
    pub save_interval: usize,
    pub hidden_dim: usize,
    pub lr: f32,
    pub tau: f32,
    pub gamma: f32,
    pub agent_alg: CriticVariant,
    pub adversary_alg: CriticVariant,
    pub discrete_action: bool,
    pub parameter_sharing: bool,
    pub normalize_rewards: bool,
    pub other_agent_actions: OtherAgentActions,
    pub model_root: PathBuf,
    pub device: Device,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            env_id: "spread".to_string(),
            model_name: "maddpg".to_string(),
            num_agents: 2,
            seed: 1,
            n_rollout_threads: 1,
            buffer_length: 1_000_000,
            n_episodes: 100_000,
            episode_length: 100,
            steps_per_update: 100,
            batch_size: 2048,
            n_exploration_eps: 25_000,
            init_noise_scale: 0.3,
            final_noise_scale: 0.0,
            save_interval: 1000,
            hidden_dim: 64,
            lr: 0.01,
            tau: 0.01,
            gamma: 0.95,
            agent_alg: CriticVariant::Maddpg,
            adversary_alg: CriticVariant::Maddpg,
            discrete_action: false,
            parameter_sharing: false,
            normalize_rewards: true,
            other_agent_actions: OtherAgentActions::Replayed,
            model_root: PathBuf::from("./models"),
            device: Device::Cpu,
        }
    }
}

impl TrainingConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: TrainingConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_agents", self.num_agents),
            ("n_rollout_threads", self.n_rollout_threads),
            ("buffer_length", self.buffer_length),
            ("episode_length", self.episode_length),
            ("steps_per_update", self.steps_per_update),
            ("batch_size", self.batch_size),
            ("save_interval", self.save_interval),
            ("hidden_dim", self.hidden_dim),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(MaddpgError::config(format!("{} must be positive", name)));
            }
        }
        if self.batch_size > self.buffer_length {
            return Err(MaddpgError::config(format!(
                "batch_size {} exceeds buffer_length {}",
                self.batch_size, self.buffer_length
            )));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(MaddpgError::config(format!("tau must lie in [0, 1], got {}", self.tau)));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(MaddpgError::config(format!("gamma must lie in [0, 1], got {}", self.gamma)));
        }
        if !(self.lr > 0.0) {
            return Err(MaddpgError::config(format!("lr must be positive, got {}", self.lr)));
        }
        if self.env_id.is_empty() || self.model_name.is_empty() {
            return Err(MaddpgError::config("env_id and model_name must be non-empty"));
        }
        Ok(())
    }
}
