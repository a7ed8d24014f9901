//! # maddpg - Multi-Agent Actor-Critic Training
//!
//! Trains a group of agents sharing one simulated environment with
//! decentralized actors and centralized critics (MADDPG), or with
//! independent per-agent critics (DDPG), on plain `ndarray` networks.
//!
//! ## Key Features
//!
//! - **Joint replay**: a ring buffer whose samples keep every agent's fields
//!   from the same environment step together
//! - **Target networks**: a separate, gradient-inert type updated only by
//!   Polyak averaging
//! - **Exploration**: Ornstein-Uhlenbeck noise for continuous actions,
//!   Gumbel-softmax for discrete ones, annealed per episode
//! - **Parameter sharing**: rotated copies of each transition let one policy
//!   learn from every agent's experience
//! - **Parallel rollouts**: environment workers stepped with `rayon`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maddpg::config::TrainingConfig;
//! use maddpg::env::{EnvPool, SpreadEnv};
//! use maddpg::rollout::RolloutLoop;
//!
//! let config = TrainingConfig {
//!     n_episodes: 200,
//!     batch_size: 256,
//!     ..TrainingConfig::default()
//! };
//! let pool = EnvPool::new(vec![SpreadEnv::new(2, false)], config.seed)?;
//! let summary = RolloutLoop::new(config, pool)?.run()?;
//! println!("{} updates", summary.updates);
//! # Ok::<(), maddpg::MaddpgError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU, Tanh and linear activations
//! - [`agent`] - One agent's actor, critic, targets and exploration
//! - [`checkpoint`] - Run directories and atomic checkpoint writes
//! - [`config`] - Run configuration and algorithm selection
//! - [`distributions`] - Softmax, one-hot and Gumbel-softmax helpers
//! - [`env`] - Environment trait, descriptors, worker pool and a navigation scenario
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers and weight initialization
//! - [`metrics`] - Scalar metric sinks
//! - [`network`] - Multi-layer perceptron with hand-written backpropagation
//! - [`noise`] - Ornstein-Uhlenbeck noise and the exploration schedule
//! - [`optimizer`] - Adam and global-norm gradient clipping
//! - [`replay_buffer`] - Joint multi-agent experience replay
//! - [`rollout`] - The collect/update training loop
//! - [`target`] - Target networks
//! - [`trainer`] - The multi-agent coordinator

pub mod activations;
pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod distributions;
pub mod env;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod network;
pub mod noise;
pub mod optimizer;
pub mod replay_buffer;
pub mod rollout;
pub mod target;
pub mod trainer;

pub use error::{MaddpgError, Result};
