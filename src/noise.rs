//! Exploration noise and its annealing schedule.

use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Ornstein-Uhlenbeck process for temporally correlated action noise.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OuNoise {
    pub mu: f32,
    pub theta: f32,
    pub sigma: f32,
    pub scale: f32,
    state: Array1<f32>,
}

impl OuNoise {
    pub fn new(action_dim: usize, scale: f32) -> Self {
        let mu = 0.0;
        OuNoise {
            mu,
            theta: 0.15,
            sigma: 0.2,
            scale,
            state: Array1::from_elem(action_dim, mu),
        }
    }

    pub fn reset(&mut self) {
        self.state.fill(self.mu);
    }

    pub fn state(&self) -> &Array1<f32> {
        &self.state
    }

    /// Advance the process one step and return the scaled sample.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Array1<f32> {
        let (mu, theta, sigma) = (self.mu, self.theta, self.sigma);
        self.state.mapv_inplace(|x| {
            let gaussian: f32 = rng.sample(StandardNormal);
            x + theta * (mu - x) + sigma * gaussian
        });
        &self.state * self.scale
    }
}

/// Per-agent exploration state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Exploration {
    /// Additive OU noise for continuous actions.
    OrnsteinUhlenbeck(OuNoise),
    /// Gumbel-softmax sampling for discrete actions. The scale is tracked for
    /// reporting; categorical sampling always uses the full Gumbel noise.
    Gumbel { scale: f32 },
}

impl Exploration {
    pub fn scale(&self) -> f32 {
        match self {
            Exploration::OrnsteinUhlenbeck(noise) => noise.scale,
            Exploration::Gumbel { scale } => *scale,
        }
    }

    pub fn set_scale(&mut self, scale: f32) {
        match self {
            Exploration::OrnsteinUhlenbeck(noise) => noise.scale = scale,
            Exploration::Gumbel { scale: current } => *current = scale,
        }
    }

    pub fn reset(&mut self) {
        if let Exploration::OrnsteinUhlenbeck(noise) = self {
            noise.reset();
        }
    }
}

/// Linear annealing of the exploration scale over a number of episodes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ExplorationSchedule {
    pub n_exploration_eps: usize,
    pub init_scale: f32,
    pub final_scale: f32,
}

impl ExplorationSchedule {
    pub fn new(n_exploration_eps: usize, init_scale: f32, final_scale: f32) -> Self {
        ExplorationSchedule {
            n_exploration_eps,
            init_scale,
            final_scale,
        }
    }

    /// Fraction of the exploration period still ahead at `episode`, in [0, 1].
    pub fn fraction_remaining(&self, episode: usize) -> f32 {
        if self.n_exploration_eps == 0 {
            return 0.0;
        }
        self.n_exploration_eps.saturating_sub(episode) as f32 / self.n_exploration_eps as f32
    }

    pub fn scale(&self, episode: usize) -> f32 {
        self.final_scale + (self.init_scale - self.final_scale) * self.fraction_remaining(episode)
    }
}
