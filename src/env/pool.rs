use log::debug;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::collections::HashMap;

use super::{EnvDescriptor, EnvStep, MultiAgentEnv};
use crate::error::{MaddpgError, Result};

/// Joint result of stepping every worker, laid out agent-major:
/// `next_observations[agent]` has one row per worker.
#[derive(Clone, Debug)]
pub struct PoolStep {
    pub next_observations: Vec<Array2<f32>>,
    pub rewards: Vec<Array1<f32>>,
    pub dones: Vec<Array1<bool>>,
    pub infos: Vec<HashMap<String, f32>>,
}

/// Vectorised set of environment instances stepped in parallel.
///
/// `reset` and `step` return only once every worker has answered; a failing
/// worker fails the whole call.
pub struct EnvPool<E: MultiAgentEnv> {
    envs: Vec<E>,
    descriptor: EnvDescriptor,
}

impl<E: MultiAgentEnv> EnvPool<E> {
    /// Build a pool and seed worker `k` with `seed + 1000 * k`.
    pub fn new(mut envs: Vec<E>, seed: u64) -> Result<Self> {
        let descriptor = match envs.first() {
            Some(env) => env.descriptor(),
            None => return Err(MaddpgError::config("environment pool needs at least one worker")),
        };
        for (rank, env) in envs.iter_mut().enumerate() {
            if env.descriptor() != descriptor {
                return Err(MaddpgError::dimension_mismatch(
                    format!("worker {} to match worker 0's descriptor", rank),
                    "a different descriptor".to_string(),
                ));
            }
            env.seed(seed.wrapping_add(rank as u64 * 1000));
        }
        debug!("environment pool with {} workers, {} agents", envs.len(), descriptor.num_agents());
        Ok(EnvPool { envs, descriptor })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn descriptor(&self) -> &EnvDescriptor {
        &self.descriptor
    }

    /// Reset every worker; one `[n_envs, obs_dim]` block per agent.
    pub fn reset(&mut self) -> Result<Vec<Array2<f32>>> {
        let per_env = self
            .envs
            .par_iter_mut()
            .enumerate()
            .map(|(rank, env)| env.reset().map_err(|e| worker_failed(rank, e)))
            .collect::<Result<Vec<_>>>()?;
        self.gather_observations(&per_env)
    }

    /// Step every worker with its row of each agent's action block.
    pub fn step(&mut self, actions: &[Array2<f32>]) -> Result<PoolStep> {
        let n_agents = self.descriptor.num_agents();
        if actions.len() != n_agents {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} action blocks", n_agents),
                format!("{} action blocks", actions.len()),
            ));
        }
        for (agent, (block, spec)) in actions.iter().zip(&self.descriptor.agents).enumerate() {
            if block.dim() != (self.envs.len(), spec.action_space.dim()) {
                return Err(MaddpgError::dimension_mismatch(
                    format!("agent {} actions of shape {:?}", agent, (self.envs.len(), spec.action_space.dim())),
                    format!("{:?}", block.dim()),
                ));
            }
        }

        let results: Vec<EnvStep> = self
            .envs
            .par_iter_mut()
            .enumerate()
            .map(|(rank, env)| {
                let joint: Vec<Array1<f32>> = actions.iter().map(|block| block.row(rank).to_owned()).collect();
                env.step(&joint).map_err(|e| worker_failed(rank, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rewards = vec![Array1::zeros(results.len()); n_agents];
        let mut dones = vec![Array1::from_elem(results.len(), false); n_agents];
        for (rank, result) in results.iter().enumerate() {
            if result.rewards.len() != n_agents || result.dones.len() != n_agents {
                return Err(MaddpgError::dimension_mismatch(
                    format!("{} rewards and dones", n_agents),
                    format!("{} rewards, {} dones", result.rewards.len(), result.dones.len()),
                ));
            }
            for agent in 0..n_agents {
                rewards[agent][rank] = result.rewards[agent];
                dones[agent][rank] = result.dones[agent];
            }
        }

        let observations: Vec<Vec<Array1<f32>>> = results.iter().map(|r| r.observations.clone()).collect();
        let next_observations = self.gather_observations(&observations)?;
        let infos = results.into_iter().map(|r| r.info).collect();

        Ok(PoolStep {
            next_observations,
            rewards,
            dones,
            infos,
        })
    }

    /// Regroup worker-major observations into agent-major blocks, checking
    /// each against its declared width.
    fn gather_observations(&self, per_env: &[Vec<Array1<f32>>]) -> Result<Vec<Array2<f32>>> {
        let n_agents = self.descriptor.num_agents();
        let mut blocks: Vec<Array2<f32>> = self
            .descriptor
            .agents
            .iter()
            .map(|spec| Array2::zeros((per_env.len(), spec.observation_dim)))
            .collect();

        for (rank, observations) in per_env.iter().enumerate() {
            if observations.len() != n_agents {
                return Err(MaddpgError::dimension_mismatch(
                    format!("{} observations from worker {}", n_agents, rank),
                    format!("{}", observations.len()),
                ));
            }
            for (agent, observation) in observations.iter().enumerate() {
                let declared = self.descriptor.agents[agent].observation_dim;
                if observation.len() != declared {
                    return Err(MaddpgError::dimension_mismatch(
                        format!("agent {} observation width {}", agent, declared),
                        format!("{}", observation.len()),
                    ));
                }
                blocks[agent].row_mut(rank).assign(observation);
            }
        }
        Ok(blocks)
    }
}

fn worker_failed(rank: usize, err: MaddpgError) -> MaddpgError {
    MaddpgError::Environment(format!("worker {} failed: {}", rank, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ActionSpace, AgentRole, AgentSpec};
    use ndarray::arr1;

    /// Echoes the first action component back as observation and reward.
    struct EchoEnv {
        seed: u64,
        fail: bool,
        obs_dim: usize,
    }

    impl MultiAgentEnv for EchoEnv {
        fn descriptor(&self) -> EnvDescriptor {
            let spec = AgentSpec {
                role: AgentRole::Agent,
                observation_dim: 1,
                action_space: ActionSpace::Continuous { dim: 1, low: -1.0, high: 1.0 },
            };
            EnvDescriptor::new(vec![spec.clone(), spec])
        }

        fn reset(&mut self) -> Result<Vec<Array1<f32>>> {
            if self.fail {
                return Err(MaddpgError::IoError("pipe closed".to_string()));
            }
            Ok(vec![Array1::from_elem(self.obs_dim, self.seed as f32); 2])
        }

        fn step(&mut self, actions: &[Array1<f32>]) -> Result<EnvStep> {
            if self.fail {
                return Err(MaddpgError::IoError("pipe closed".to_string()));
            }
            Ok(EnvStep {
                observations: actions.to_vec(),
                rewards: actions.iter().map(|a| a[0]).collect(),
                dones: vec![false, true],
                info: HashMap::new(),
            })
        }

        fn seed(&mut self, seed: u64) {
            self.seed = seed;
        }
    }

    fn echo(fail: bool) -> EchoEnv {
        EchoEnv { seed: 0, fail, obs_dim: 1 }
    }

    #[test]
    fn test_reset_seeds_workers_apart() {
        let mut pool = EnvPool::new(vec![echo(false), echo(false)], 5).unwrap();
        let obs = pool.reset().unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].column(0).to_vec(), vec![5.0, 1005.0]);
    }

    #[test]
    fn test_step_regroups_by_agent() {
        let mut pool = EnvPool::new(vec![echo(false), echo(false), echo(false)], 0).unwrap();
        let actions = vec![
            Array2::from_shape_vec((3, 1), vec![0.1, 0.2, 0.3]).unwrap(),
            Array2::from_shape_vec((3, 1), vec![-0.1, -0.2, -0.3]).unwrap(),
        ];
        let step = pool.step(&actions).unwrap();
        assert_eq!(step.rewards[0], arr1(&[0.1, 0.2, 0.3]));
        assert_eq!(step.rewards[1], arr1(&[-0.1, -0.2, -0.3]));
        assert_eq!(step.dones[1], arr1(&[true, true, true]));
        assert_eq!(step.next_observations[1], actions[1]);
    }

    #[test]
    fn test_worker_failure_propagates() {
        let mut pool = EnvPool::new(vec![echo(false), echo(true)], 0).unwrap();
        let actions = vec![Array2::zeros((2, 1)), Array2::zeros((2, 1))];
        match pool.step(&actions) {
            Err(MaddpgError::Environment(msg)) => assert!(msg.starts_with("worker 1 failed")),
            other => panic!("unexpected {:?}", other.map(|s| s.rewards.len())),
        }
    }

    #[test]
    fn test_reset_failure_is_environment_error() {
        let mut pool = EnvPool::new(vec![echo(false), echo(true)], 0).unwrap();
        match pool.reset() {
            Err(MaddpgError::Environment(msg)) => assert!(msg.starts_with("worker 1 failed")),
            other => panic!("unexpected {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_large_seed_wraps() {
        let mut pool = EnvPool::new(vec![echo(false), echo(false)], u64::MAX).unwrap();
        let obs = pool.reset().unwrap();
        assert_eq!(obs[0][[0, 0]], u64::MAX as f32);
        assert_eq!(obs[0][[1, 0]], 999.0);
    }

    #[test]
    fn test_observation_width_mismatch_is_fatal() {
        let bad = EchoEnv { seed: 0, fail: false, obs_dim: 3 };
        let mut pool = EnvPool::new(vec![bad], 0).unwrap();
        assert!(matches!(pool.reset(), Err(MaddpgError::DimensionMismatch { .. })));
    }
}
