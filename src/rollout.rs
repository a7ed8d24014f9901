//! The collect/update training loop.
//!
//! Each pass of the outer loop runs one episode in every rollout worker at
//! once, so the episode counter advances by the number of workers. Inside an
//! episode, every step's joint transition goes into the replay buffer and an
//! update cycle fires whenever the buffer holds a full batch and the global
//! step counter crosses a `steps_per_update` boundary.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::checkpoint::RunDirectory;
use crate::config::TrainingConfig;
use crate::env::{EnvPool, MultiAgentEnv};
use crate::error::{MaddpgError, Result};
use crate::metrics::{MetricsSink, ScalarLogger};
use crate::noise::ExplorationSchedule;
use crate::replay_buffer::{ReplayBuffer, Transition};
use crate::trainer::Maddpg;

/// Cloneable flag asking a running loop to stop after its current step.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished (or stopped) run did.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub episodes_completed: usize,
    pub total_steps: usize,
    pub updates: usize,
    pub stopped_early: bool,
    pub final_mean_rewards: Vec<f32>,
    pub run_dir: PathBuf,
}

pub struct RolloutLoop<E: MultiAgentEnv> {
    config: TrainingConfig,
    pool: EnvPool<E>,
    trainer: Maddpg,
    buffer: ReplayBuffer,
    run_dir: RunDirectory,
    logger: ScalarLogger,
    rng: StdRng,
    stop: StopHandle,
}

impl<E: MultiAgentEnv> RolloutLoop<E> {
    /// Validate `config`, build a fresh trainer and buffer for the pool's
    /// descriptor and create the next run directory.
    pub fn new(config: TrainingConfig, pool: EnvPool<E>) -> Result<Self> {
        config.validate()?;
        if pool.num_envs() != config.n_rollout_threads {
            return Err(MaddpgError::config(format!(
                "pool has {} workers but n_rollout_threads is {}",
                pool.num_envs(),
                config.n_rollout_threads
            )));
        }

        let descriptor = pool.descriptor().clone();
        let trainer = Maddpg::from_config(&config, &descriptor)?;
        let buffer = ReplayBuffer::new(
            config.buffer_length,
            &descriptor.observation_dims(),
            &descriptor.action_dims(),
        )?;
        let run_dir = RunDirectory::create(&config.model_root, &config.env_id, &config.model_name)?;
        config.save_json(run_dir.config_path())?;
        let logger = ScalarLogger::new(run_dir.log_dir())?;

        Ok(RolloutLoop {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            pool,
            trainer,
            buffer,
            run_dir,
            logger,
            stop: StopHandle::new(),
        })
    }

    /// Continue from an existing trainer, e.g. one restored with
    /// [`Maddpg::load`].
    pub fn with_trainer(mut self, trainer: Maddpg) -> Result<Self> {
        if trainer.descriptor() != self.pool.descriptor() {
            return Err(MaddpgError::config("trainer was built for a different environment"));
        }
        self.trainer = trainer;
        Ok(self)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn trainer(&self) -> &Maddpg {
        &self.trainer
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn run_dir(&self) -> &RunDirectory {
        &self.run_dir
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let n_envs = self.pool.num_envs();
        let n_agents = self.trainer.num_agents();
        let device = self.config.device;
        let schedule = ExplorationSchedule::new(
            self.config.n_exploration_eps,
            self.config.init_noise_scale,
            self.config.final_noise_scale,
        );

        info!(
            "training {} agents for {} episodes with {} workers on {}",
            n_agents, self.config.n_episodes, n_envs, device
        );

        let mut t = 0;
        let mut episodes_completed = 0;
        let mut stopped_early = false;
        let mut mean_rewards = vec![0.0; n_agents];

        let mut ep = 0;
        while ep < self.config.n_episodes {
            if self.stop.is_stop_requested() {
                stopped_early = true;
                break;
            }
            info!("Episodes {}-{} of {}", ep + 1, ep + 1 + n_envs, self.config.n_episodes);

            let mut observations = self.pool.reset()?;
            self.trainer.prep_rollouts(device);
            let scale = schedule.scale(ep);
            self.trainer.scale_noise(scale);
            self.trainer.reset_noise();
            self.logger.add_scalar("noise_scale", scale, ep)?;

            for _ in 0..self.config.episode_length {
                let actions = self.trainer.step(&observations, true)?;
                let step = self.pool.step(&actions)?;
                let transition = Transition {
                    observations,
                    actions,
                    rewards: step.rewards,
                    next_observations: step.next_observations,
                    dones: step.dones,
                };
                self.buffer.push(&transition)?;
                if self.trainer.parameter_sharing() {
                    for k in 1..n_agents {
                        self.buffer.push(&transition.rotated(k))?;
                    }
                }
                observations = transition.next_observations;
                t += n_envs;

                if self.buffer.len() >= self.config.batch_size && t % self.config.steps_per_update < n_envs {
                    self.update_cycle(n_envs)?;
                }
                if self.stop.is_stop_requested() {
                    stopped_early = true;
                    break;
                }
            }
            if stopped_early {
                break;
            }

            mean_rewards = self
                .buffer
                .get_average_rewards(self.config.episode_length * n_envs);
            for (i, reward) in mean_rewards.iter().enumerate() {
                self.logger
                    .add_scalar(&format!("agent{}/mean_episode_rewards", i), *reward, ep)?;
            }
            info!("mean episode rewards {:?}", mean_rewards);
            episodes_completed = (ep + n_envs).min(self.config.n_episodes);

            if ep % self.config.save_interval < n_envs {
                self.trainer.save(self.run_dir.incremental_model(ep + 1))?;
                self.trainer.save(self.run_dir.latest_model())?;
                info!("checkpoint at episode {}", ep + 1);
            }
            ep += n_envs;
        }

        self.trainer.save(self.run_dir.latest_model())?;
        self.logger.flush()?;
        self.logger.export_json(self.run_dir.log_dir().join("summary.json"))?;
        info!(
            "finished after {} episodes, {} steps, {} updates{}",
            episodes_completed,
            t,
            self.trainer.niter(),
            if stopped_early { " (stopped)" } else { "" }
        );

        Ok(RunSummary {
            episodes_completed,
            total_steps: t,
            updates: self.trainer.niter(),
            stopped_early,
            final_mean_rewards: mean_rewards,
            run_dir: self.run_dir.root().to_path_buf(),
        })
    }

    /// `rounds` passes of (one update per agent on its own fresh sample,
    /// then one target synchronization), inside the training phase.
    fn update_cycle(&mut self, rounds: usize) -> Result<()> {
        let device = self.config.device;
        self.trainer.prep_training(device);
        for _ in 0..rounds {
            for agent in 0..self.trainer.num_agents() {
                let batch = self
                    .buffer
                    .sample(self.config.batch_size, self.config.normalize_rewards, &mut self.rng)?;
                self.trainer.update(&batch, agent, &mut self.logger)?;
            }
            self.trainer.update_all_targets()?;
        }
        self.trainer.prep_rollouts(device);
        debug!("update cycle done, niter {}", self.trainer.niter());
        Ok(())
    }
}
