//! Train MADDPG (or independent DDPG) agents on the cooperative navigation
//! scenario.
//!
//! ```text
//! RUST_LOG=debug train --config run.json --episodes 2000 --threads 4
//! ```

use clap::Parser;
use log::info;
use std::path::PathBuf;

use maddpg::config::{CriticVariant, TrainingConfig};
use maddpg::env::{EnvPool, SpreadEnv};
use maddpg::rollout::RolloutLoop;
use maddpg::trainer::Maddpg;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Multi-agent actor-critic training")]
struct Args {
    /// JSON run configuration; missing keys take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model_name: Option<String>,
    #[arg(long)]
    model_root: Option<PathBuf>,
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    num_agents: Option<usize>,
    /// Parallel rollout workers.
    #[arg(long)]
    threads: Option<usize>,
    /// MADDPG or DDPG.
    #[arg(long)]
    agent_alg: Option<CriticVariant>,
    #[arg(long)]
    adversary_alg: Option<CriticVariant>,
    #[arg(long, default_value_t = false)]
    discrete_action: bool,
    #[arg(long, default_value_t = false)]
    parameter_sharing: bool,
    /// Continue from a saved model.bin.
    #[arg(long)]
    resume: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> maddpg::Result<(TrainingConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(name) = self.model_name {
            config.model_name = name;
        }
        if let Some(root) = self.model_root {
            config.model_root = root;
        }
        if let Some(episodes) = self.episodes {
            config.n_episodes = episodes;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.num_agents {
            config.num_agents = n;
        }
        if let Some(threads) = self.threads {
            config.n_rollout_threads = threads;
        }
        if let Some(alg) = self.agent_alg {
            config.agent_alg = alg;
        }
        if let Some(alg) = self.adversary_alg {
            config.adversary_alg = alg;
        }
        config.discrete_action |= self.discrete_action;
        config.parameter_sharing |= self.parameter_sharing;
        config.validate()?;
        Ok((config, self.resume))
    }
}

fn main() -> maddpg::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let (config, resume) = Args::parse().into_config()?;
    let envs = (0..config.n_rollout_threads)
        .map(|_| SpreadEnv::new(config.num_agents, config.discrete_action))
        .collect();
    let pool = EnvPool::new(envs, config.seed)?;

    let mut rollout = RolloutLoop::new(config, pool)?;
    if let Some(path) = resume {
        info!("resuming from {}", path.display());
        rollout = rollout.with_trainer(Maddpg::load(path)?)?;
    }

    let summary = rollout.run()?;
    info!(
        "{} episodes, {} steps, {} updates; final mean rewards {:?}; saved to {}",
        summary.episodes_completed,
        summary.total_steps,
        summary.updates,
        summary.final_mean_rewards,
        summary.run_dir.display()
    );
    Ok(())
}
