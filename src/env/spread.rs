use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use super::{ActionSpace, AgentRole, AgentSpec, EnvDescriptor, EnvStep, MultiAgentEnv};
use crate::error::{MaddpgError, Result};

const DT: f32 = 0.1;
const DAMPING: f32 = 0.25;
const ACCEL: f32 = 0.4;
const STEP_PENALTY: f32 = 0.1;
const COVER_DISTANCE: f32 = 0.03;

/// Cooperative navigation: agents with different top speeds must cover one
/// landmark each.
///
/// Observation of agent `i`: own position, landmark positions relative to
/// it, then the other agents' positions relative to it. All agents receive
/// the same reward, `-0.1 - Σ_l min_i |p_i - l|`, which is lifted to zero
/// once every landmark has an agent within 0.03. Episodes never terminate
/// on their own.
pub struct SpreadEnv {
    num_agents: usize,
    num_landmarks: usize,
    discrete: bool,
    max_speeds: Vec<f32>,
    positions: Vec<Array1<f32>>,
    velocities: Vec<Array1<f32>>,
    landmarks: Vec<Array1<f32>>,
    rng: StdRng,
}

impl SpreadEnv {
    pub fn new(num_agents: usize, discrete: bool) -> Self {
        let mut env = SpreadEnv {
            num_agents,
            num_landmarks: num_agents,
            discrete,
            max_speeds: Vec::new(),
            positions: vec![Array1::zeros(2); num_agents],
            velocities: vec![Array1::zeros(2); num_agents],
            landmarks: vec![Array1::zeros(2); num_agents],
            rng: StdRng::seed_from_u64(0),
        };
        env.draw_speeds();
        env
    }

    pub fn max_speeds(&self) -> &[f32] {
        &self.max_speeds
    }

    fn draw_speeds(&mut self) {
        let rng = &mut self.rng;
        self.max_speeds = (0..self.num_agents).map(|_| rng.gen_range(0.1..0.9)).collect();
    }

    fn uniform_point(&mut self) -> Array1<f32> {
        array![self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0)]
    }

    fn observation(&self, agent: usize) -> Array1<f32> {
        let own = &self.positions[agent];
        let mut obs = Vec::with_capacity(self.observation_dim());
        obs.extend(own.iter().copied());
        for landmark in &self.landmarks {
            obs.extend((landmark - own).iter().copied());
        }
        for (other, position) in self.positions.iter().enumerate() {
            if other != agent {
                obs.extend((position - own).iter().copied());
            }
        }
        Array1::from(obs)
    }

    fn observation_dim(&self) -> usize {
        2 + 2 * self.num_landmarks + 2 * (self.num_agents - 1)
    }

    /// Force applied by one action; discrete moves are `[noop, +x, -x, +y, -y]`.
    fn force(&self, action: &Array1<f32>) -> Array1<f32> {
        let u = if self.discrete {
            array![action[1] - action[2], action[3] - action[4]]
        } else {
            array![action[0], action[1]]
        };
        u * ACCEL
    }

    fn min_landmark_distances(&self) -> Vec<f32> {
        self.landmarks
            .iter()
            .map(|landmark| {
                self.positions
                    .iter()
                    .map(|p| (p - landmark).mapv(|v| v * v).sum().sqrt())
                    .fold(f32::INFINITY, f32::min)
            })
            .collect()
    }

    fn reward(&self) -> (f32, usize) {
        let distances = self.min_landmark_distances();
        let total: f32 = distances.iter().sum();
        let covered = distances.iter().filter(|&&d| d < COVER_DISTANCE).count();
        if covered == distances.len() {
            (0.0, covered)
        } else {
            (-STEP_PENALTY - total, covered)
        }
    }
}

impl MultiAgentEnv for SpreadEnv {
    fn descriptor(&self) -> EnvDescriptor {
        let action_space = if self.discrete {
            ActionSpace::Discrete { n: 5 }
        } else {
            ActionSpace::Continuous {
                dim: 2,
                low: -1.0,
                high: 1.0,
            }
        };
        let spec = AgentSpec {
            role: AgentRole::Agent,
            observation_dim: self.observation_dim(),
            action_space,
        };
        EnvDescriptor::new(vec![spec; self.num_agents])
    }

    fn reset(&mut self) -> Result<Vec<Array1<f32>>> {
        for agent in 0..self.num_agents {
            self.positions[agent] = self.uniform_point();
            self.velocities[agent] = Array1::zeros(2);
        }
        for landmark in 0..self.num_landmarks {
            self.landmarks[landmark] = self.uniform_point();
        }
        Ok((0..self.num_agents).map(|i| self.observation(i)).collect())
    }

    fn step(&mut self, actions: &[Array1<f32>]) -> Result<EnvStep> {
        let width = if self.discrete { 5 } else { 2 };
        if actions.len() != self.num_agents || actions.iter().any(|a| a.len() != width) {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} actions of width {}", self.num_agents, width),
                format!("{:?}", actions.iter().map(|a| a.len()).collect::<Vec<_>>()),
            ));
        }

        for agent in 0..self.num_agents {
            let force = self.force(&actions[agent]);
            let mut velocity = &self.velocities[agent] * (1.0 - DAMPING) + force * DT;
            let speed = velocity.mapv(|v| v * v).sum().sqrt();
            let max_speed = self.max_speeds[agent];
            if speed > max_speed {
                velocity *= max_speed / speed;
            }
            self.positions[agent] = &self.positions[agent] + &(&velocity * DT);
            self.velocities[agent] = velocity;
        }

        let (reward, covered) = self.reward();
        let mut info = HashMap::new();
        info.insert("occupied_landmarks".to_string(), covered as f32);

        Ok(EnvStep {
            observations: (0..self.num_agents).map(|i| self.observation(i)).collect(),
            rewards: vec![reward; self.num_agents],
            dones: vec![false; self.num_agents],
            info,
        })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.draw_speeds();
    }
}
