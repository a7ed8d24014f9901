//! Multi-agent coordinator.
//!
//! [`Maddpg`] owns one [`AgentPolicy`] per agent slot. Actors act on their
//! own observations; each critic is either centralized (every agent's
//! observation, then every agent's action) or independent (own observation
//! and action), chosen per role group with [`CriticVariant`].
//!
//! ```no_run
//! use maddpg::config::CriticVariant;
//! use maddpg::env::{MultiAgentEnv, SpreadEnv};
//! use maddpg::trainer::Maddpg;
//!
//! let env = SpreadEnv::new(2, false);
//! let trainer = Maddpg::init_from_env(
//!     &env.descriptor(),
//!     CriticVariant::Maddpg,
//!     CriticVariant::Maddpg,
//!     0.01,
//!     0.01,
//!     64,
//! )?;
//! # Ok::<(), maddpg::MaddpgError>(())
//! ```

use log::{debug, info};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::agent::AgentPolicy;
use crate::checkpoint::write_atomic;
use crate::config::{CriticVariant, Device, OtherAgentActions, TrainingConfig};
use crate::env::{AgentRole, EnvDescriptor};
use crate::error::{MaddpgError, Result};
use crate::metrics::MetricsSink;
use crate::replay_buffer::Batch;

/// Which configuration the networks are in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Inference only; no cached activations.
    #[default]
    Rollout,
    /// Gradient updates allowed.
    Training,
}

/// Losses of one agent's update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateStats {
    pub critic_loss: f32,
    pub policy_loss: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Maddpg {
    agents: Vec<AgentPolicy>,
    descriptor: EnvDescriptor,
    variants: Vec<CriticVariant>,
    gamma: f32,
    tau: f32,
    lr: f32,
    hidden_dim: usize,
    parameter_sharing: bool,
    other_agent_actions: OtherAgentActions,
    device: Device,
    niter: usize,
    #[serde(skip)]
    phase: Phase,
}

impl Maddpg {
    /// One policy per agent slot of `descriptor`; agents with role
    /// `Adversary` use `adversary_alg`, all others `agent_alg`.
    pub fn init_from_env(
        descriptor: &EnvDescriptor,
        agent_alg: CriticVariant,
        adversary_alg: CriticVariant,
        tau: f32,
        lr: f32,
        hidden_dim: usize,
    ) -> Result<Self> {
        MaddpgBuilder::new(descriptor.clone())
            .agent_alg(agent_alg)
            .adversary_alg(adversary_alg)
            .tau(tau)
            .lr(lr)
            .hidden_dim(hidden_dim)
            .build()
    }

    pub fn from_config(config: &TrainingConfig, descriptor: &EnvDescriptor) -> Result<Self> {
        MaddpgBuilder::new(descriptor.clone())
            .agent_alg(config.agent_alg)
            .adversary_alg(config.adversary_alg)
            .tau(config.tau)
            .lr(config.lr)
            .hidden_dim(config.hidden_dim)
            .gamma(config.gamma)
            .seed(config.seed)
            .device(config.device)
            .parameter_sharing(config.parameter_sharing)
            .other_agent_actions(config.other_agent_actions)
            .build()
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agents(&self) -> &[AgentPolicy] {
        &self.agents
    }

    pub fn agent(&self, index: usize) -> Option<&AgentPolicy> {
        self.agents.get(index)
    }

    pub fn descriptor(&self) -> &EnvDescriptor {
        &self.descriptor
    }

    pub fn variants(&self) -> &[CriticVariant] {
        &self.variants
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn niter(&self) -> usize {
        self.niter
    }

    pub fn tau(&self) -> f32 {
        self.tau
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn parameter_sharing(&self) -> bool {
        self.parameter_sharing
    }

    /// Agent whose actor drives physical agent `index`.
    pub fn policy_slot(&self, index: usize) -> usize {
        if self.parameter_sharing {
            0
        } else {
            index
        }
    }

    /// Decentralized action selection: agent `i`'s block of observations
    /// `[n_envs, obs_dim_i]` goes through its own actor only.
    pub fn step(&mut self, observations: &[Array2<f32>], explore: bool) -> Result<Vec<Array2<f32>>> {
        self.check_observations(observations)?;
        let mut actions = Vec::with_capacity(observations.len());
        for (i, block) in observations.iter().enumerate() {
            let slot = self.policy_slot(i);
            actions.push(self.agents[slot].step(block.view(), explore)?);
        }
        Ok(actions)
    }

    fn check_observations(&self, observations: &[Array2<f32>]) -> Result<()> {
        if observations.len() != self.agents.len() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} observation blocks", self.agents.len()),
                format!("{}", observations.len()),
            ));
        }
        for (i, (block, spec)) in observations.iter().zip(&self.descriptor.agents).enumerate() {
            if block.ncols() != spec.observation_dim {
                return Err(MaddpgError::dimension_mismatch(
                    format!("agent {} observations of width {}", i, spec.observation_dim),
                    format!("width {}", block.ncols()),
                ));
            }
        }
        Ok(())
    }

    /// Update the critic, then the actor, of `agent_index` on `batch`.
    ///
    /// The bootstrap uses every agent's target actor and the agent's target
    /// critic; no other agent's parameters change. Losses are reported to
    /// `sink` at step [`niter`](Self::niter).
    pub fn update(&mut self, batch: &Batch, agent_index: usize, sink: &mut dyn MetricsSink) -> Result<UpdateStats> {
        if self.phase != Phase::Training {
            return Err(MaddpgError::TrainingError(
                "update requires the training phase; call prep_training first".to_string(),
            ));
        }
        if agent_index >= self.agents.len() {
            return Err(MaddpgError::invalid_parameter(
                "agent_index".to_string(),
                format!("{} is out of range for {} agents", agent_index, self.agents.len()),
            ));
        }
        let n = self.agents.len();
        if [
            batch.observations.len(),
            batch.actions.len(),
            batch.rewards.len(),
            batch.next_observations.len(),
            batch.dones.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(MaddpgError::dimension_mismatch(
                format!("batch for {} agents", self.agents.len()),
                format!("batch for {} agents", batch.observations.len()),
            ));
        }

        let i = agent_index;
        let centralized = self.variants[i].is_centralized();

        let target_critic_input = if centralized {
            let next_actions = self
                .agents
                .iter()
                .zip(&batch.next_observations)
                .map(|(agent, next_obs)| agent.target_action(next_obs.view()))
                .collect::<Result<Vec<_>>>()?;
            joint_input(&batch.next_observations, &next_actions)?
        } else {
            let next_action = self.agents[i].target_action(batch.next_observations[i].view())?;
            concat_columns(&[batch.next_observations[i].view(), next_action.view()])?
        };
        let next_q = self.agents[i].target_critic.predict(target_critic_input.view())?;
        let not_done = batch.dones[i].mapv(|d| 1.0 - d);
        let targets: Array1<f32> = &batch.rewards[i] + &(next_q.column(0).to_owned() * not_done * self.gamma);

        let critic_input = if centralized {
            joint_input(&batch.observations, &batch.actions)?
        } else {
            concat_columns(&[batch.observations[i].view(), batch.actions[i].view()])?
        };
        let critic_loss = self.agents[i].update_critic(critic_input.view(), targets.view())?;

        let (actor_critic_input, action_offset) = if centralized {
            let actions = match self.other_agent_actions {
                OtherAgentActions::Replayed => batch.actions.clone(),
                OtherAgentActions::CurrentPolicy => self
                    .agents
                    .iter()
                    .zip(&batch.observations)
                    .map(|(agent, obs)| agent.policy_action(obs.view()))
                    .collect::<Result<Vec<_>>>()?,
            };
            let obs_width: usize = self.descriptor.observation_dims().iter().sum();
            let preceding: usize = self.descriptor.action_dims()[..i].iter().sum();
            (joint_input(&batch.observations, &actions)?, obs_width + preceding)
        } else {
            (critic_input, self.descriptor.agents[i].observation_dim)
        };
        let policy_loss =
            self.agents[i].update_actor(batch.observations[i].view(), actor_critic_input, action_offset)?;

        sink.add_scalar(&format!("agent{}/losses/vf_loss", i), critic_loss, self.niter)?;
        sink.add_scalar(&format!("agent{}/losses/pol_loss", i), policy_loss, self.niter)?;
        debug!(
            "agent {} update at iteration {}: vf_loss {:.5}, pol_loss {:.5}",
            i, self.niter, critic_loss, policy_loss
        );

        Ok(UpdateStats {
            critic_loss,
            policy_loss,
        })
    }

    /// Soft-update every agent's targets at rate τ and advance `niter`.
    pub fn update_all_targets(&mut self) -> Result<()> {
        for agent in &mut self.agents {
            agent.soft_update_targets(self.tau)?;
        }
        self.niter += 1;
        Ok(())
    }

    pub fn scale_noise(&mut self, scale: f32) {
        for agent in &mut self.agents {
            agent.scale_noise(scale);
        }
    }

    pub fn reset_noise(&mut self) {
        for agent in &mut self.agents {
            agent.reset_noise();
        }
    }

    /// Switch every network to inference configuration on `device`.
    pub fn prep_rollouts(&mut self, device: Device) {
        self.switch_phase(Phase::Rollout, device);
    }

    /// Switch every network to training configuration on `device`.
    pub fn prep_training(&mut self, device: Device) {
        self.switch_phase(Phase::Training, device);
    }

    fn switch_phase(&mut self, phase: Phase, device: Device) {
        for agent in &mut self.agents {
            agent.clear_caches();
        }
        if device != self.device {
            debug!("moving parameters from {} to {}", self.device, device);
            self.device = device;
        }
        self.phase = phase;
    }

    /// Reseed every agent's exploration RNG; agent `i` gets `seed + i`.
    pub fn seed(&mut self, seed: u64) {
        for (i, agent) in self.agents.iter_mut().enumerate() {
            agent.seed(seed.wrapping_add(i as u64));
        }
    }

    /// Persist all agents, targets, optimizer state and settings.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        write_atomic(path, &bytes)
    }

    /// Restore a trainer written by [`save`](Self::save). It starts in the
    /// rollout phase.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        let trainer: Maddpg = bincode::deserialize(&bytes)?;
        Ok(trainer)
    }
}

/// All observation blocks followed by all action blocks.
fn joint_input(observations: &[Array2<f32>], actions: &[Array2<f32>]) -> Result<Array2<f32>> {
    let views: Vec<ArrayView2<f32>> = observations.iter().chain(actions).map(|a| a.view()).collect();
    concat_columns(&views)
}

fn concat_columns(blocks: &[ArrayView2<f32>]) -> Result<Array2<f32>> {
    concatenate(Axis(1), blocks).map_err(|e| {
        MaddpgError::dimension_mismatch(
            "blocks with equal row counts".to_string(),
            format!("{:?} ({})", blocks.iter().map(|b| b.dim()).collect::<Vec<_>>(), e),
        )
    })
}

/// Builder for [`Maddpg`].
pub struct MaddpgBuilder {
    descriptor: EnvDescriptor,
    agent_alg: CriticVariant,
    adversary_alg: CriticVariant,
    tau: f32,
    lr: f32,
    hidden_dim: usize,
    gamma: f32,
    seed: u64,
    device: Device,
    parameter_sharing: bool,
    other_agent_actions: OtherAgentActions,
}

impl MaddpgBuilder {
    pub fn new(descriptor: EnvDescriptor) -> Self {
        MaddpgBuilder {
            descriptor,
            agent_alg: CriticVariant::Maddpg,
            adversary_alg: CriticVariant::Maddpg,
            tau: 0.01,
            lr: 0.01,
            hidden_dim: 64,
            gamma: 0.95,
            seed: 1,
            device: Device::Cpu,
            parameter_sharing: false,
            other_agent_actions: OtherAgentActions::Replayed,
        }
    }

    pub fn agent_alg(mut self, alg: CriticVariant) -> Self {
        self.agent_alg = alg;
        self
    }

    pub fn adversary_alg(mut self, alg: CriticVariant) -> Self {
        self.adversary_alg = alg;
        self
    }

    pub fn tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    pub fn lr(mut self, lr: f32) -> Self {
        self.lr = lr;
        self
    }

    pub fn hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Let every physical agent act through agent 0's policy. Needs a
    /// homogeneous descriptor.
    pub fn parameter_sharing(mut self, enabled: bool) -> Self {
        self.parameter_sharing = enabled;
        self
    }

    pub fn other_agent_actions(mut self, source: OtherAgentActions) -> Self {
        self.other_agent_actions = source;
        self
    }

    pub fn build(self) -> Result<Maddpg> {
        let descriptor = self.descriptor;
        if descriptor.num_agents() == 0 {
            return Err(MaddpgError::config("environment declares no agents"));
        }
        for (i, spec) in descriptor.agents.iter().enumerate() {
            spec.validate().map_err(|e| MaddpgError::config(format!("agent {}: {}", i, e)))?;
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(MaddpgError::invalid_parameter(
                "tau".to_string(),
                format!("must lie in [0, 1], got {}", self.tau),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(MaddpgError::invalid_parameter(
                "gamma".to_string(),
                format!("must lie in [0, 1], got {}", self.gamma),
            ));
        }
        if !(self.lr > 0.0) || self.hidden_dim == 0 {
            return Err(MaddpgError::invalid_parameter(
                "lr/hidden_dim".to_string(),
                format!("need a positive learning rate and width, got {} and {}", self.lr, self.hidden_dim),
            ));
        }
        if self.parameter_sharing && !descriptor.is_homogeneous() {
            return Err(MaddpgError::config(
                "parameter sharing needs agents with identical observation and action spaces",
            ));
        }

        let joint_width: usize =
            descriptor.observation_dims().iter().sum::<usize>() + descriptor.action_dims().iter().sum::<usize>();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut agents = Vec::with_capacity(descriptor.num_agents());
        let mut variants = Vec::with_capacity(descriptor.num_agents());

        for spec in &descriptor.agents {
            let variant = match spec.role {
                AgentRole::Adversary => self.adversary_alg,
                AgentRole::Agent => self.agent_alg,
            };
            let critic_input_dim = if variant.is_centralized() {
                joint_width
            } else {
                spec.observation_dim + spec.action_space.dim()
            };
            agents.push(AgentPolicy::new(spec, critic_input_dim, self.hidden_dim, self.lr, &mut rng)?);
            variants.push(variant);
        }

        info!(
            "initialised {} agents ({:?}), hidden {}, lr {}, tau {}, gamma {}, sharing {}",
            agents.len(),
            variants,
            self.hidden_dim,
            self.lr,
            self.tau,
            self.gamma,
            self.parameter_sharing
        );

        let mut trainer = Maddpg {
            agents,
            descriptor,
            variants,
            gamma: self.gamma,
            tau: self.tau,
            lr: self.lr,
            hidden_dim: self.hidden_dim,
            parameter_sharing: self.parameter_sharing,
            other_agent_actions: self.other_agent_actions,
            device: self.device,
            niter: 0,
            phase: Phase::Rollout,
        };
        trainer.seed(self.seed);
        Ok(trainer)
    }
}
