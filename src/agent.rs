use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::distributions::{gumbel_softmax, onehot_from_logits};
use crate::env::{ActionSpace, AgentSpec};
use crate::error::{MaddpgError, Result};
use crate::layers::WeightInit;
use crate::network::NeuralNetwork;
use crate::noise::{Exploration, OuNoise};
use crate::optimizer::GradientClipper;
use crate::target::TargetNetwork;

const GRAD_CLIP: GradientClipper = GradientClipper::ClipByGlobalNorm { max_norm: 0.5 };
const ACTOR_OUTPUT_PENALTY: f32 = 1e-3;
const FINAL_ACTOR_INIT: WeightInit = WeightInit::Uniform { min: -3e-3, max: 3e-3 };

fn fresh_rng() -> StdRng {
    StdRng::from_entropy()
}

/// One agent's actor, critic, their targets and exploration state.
///
/// The actor sees only the agent's own observation. The critic's input
/// width is decided by the trainer (joint or own observation and action).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentPolicy {
    pub actor: NeuralNetwork,
    pub critic: NeuralNetwork,
    pub target_actor: TargetNetwork,
    pub target_critic: TargetNetwork,
    pub action_space: ActionSpace,
    pub exploration: Exploration,
    pub lr: f32,
    #[serde(skip, default = "fresh_rng")]
    rng: StdRng,
}

impl AgentPolicy {
    pub fn new<R: Rng + ?Sized>(
        spec: &AgentSpec,
        critic_input_dim: usize,
        hidden_dim: usize,
        lr: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let action_dim = spec.action_space.dim();
        let (output_activation, output_init, exploration) = match spec.action_space {
            ActionSpace::Continuous { dim, .. } => (
                Activation::Tanh,
                FINAL_ACTOR_INIT,
                Exploration::OrnsteinUhlenbeck(OuNoise::new(dim, 0.1)),
            ),
            ActionSpace::Discrete { .. } => (Activation::Linear, WeightInit::FanInUniform, Exploration::Gumbel { scale: 0.3 }),
        };

        let actor = NeuralNetwork::mlp(spec.observation_dim, action_dim, hidden_dim, output_activation, output_init, rng)?;
        let critic = NeuralNetwork::mlp(critic_input_dim, 1, hidden_dim, Activation::Linear, WeightInit::FanInUniform, rng)?;

        Ok(AgentPolicy {
            target_actor: TargetNetwork::from_network(&actor),
            target_critic: TargetNetwork::from_network(&critic),
            actor,
            critic,
            action_space: spec.action_space.clone(),
            exploration,
            lr,
            rng: StdRng::seed_from_u64(rng.gen()),
        })
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Actions for a batch of this agent's observations.
    ///
    /// With `explore`, continuous actions get the current OU sample added and
    /// are clipped to the action bounds; discrete actions are Gumbel-softmax
    /// samples. Without it the deterministic policy action is returned.
    pub fn step(&mut self, observations: ArrayView2<f32>, explore: bool) -> Result<Array2<f32>> {
        if !explore {
            return self.policy_action(observations);
        }
        let output = self.actor.predict(observations)?;
        match (&self.action_space, &mut self.exploration) {
            (ActionSpace::Continuous { low, high, .. }, Exploration::OrnsteinUhlenbeck(noise)) => {
                let sample = noise.sample(&mut self.rng);
                let (low, high) = (*low, *high);
                Ok((&output + &sample).mapv(|a| a.clamp(low, high)))
            }
            (ActionSpace::Discrete { .. }, _) => Ok(gumbel_softmax(output.view(), 1.0, &mut self.rng).hard),
            (ActionSpace::Continuous { .. }, Exploration::Gumbel { .. }) => Err(MaddpgError::config(
                "continuous agent configured with categorical exploration",
            )),
        }
    }

    /// Deterministic action of the current actor: the tanh output, or the
    /// one-hot of the logits.
    pub fn policy_action(&self, observations: ArrayView2<f32>) -> Result<Array2<f32>> {
        let output = self.actor.predict(observations)?;
        Ok(self.deterministic(output))
    }

    /// Deterministic action of the target actor, used for bootstrapping.
    pub fn target_action(&self, observations: ArrayView2<f32>) -> Result<Array2<f32>> {
        let output = self.target_actor.predict(observations)?;
        Ok(self.deterministic(output))
    }

    fn deterministic(&self, output: Array2<f32>) -> Array2<f32> {
        if self.action_space.is_discrete() {
            onehot_from_logits(output.view())
        } else {
            output
        }
    }

    /// One MSE regression step of the critic toward `targets`. Returns the loss.
    pub fn update_critic(&mut self, inputs: ArrayView2<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        if inputs.nrows() != targets.len() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} critic targets", inputs.nrows()),
                format!("{}", targets.len()),
            ));
        }
        let q = self.critic.forward_batch(inputs)?;
        let n = targets.len() as f32;
        let diff = &q.column(0) - &targets;
        let loss = diff.mapv(|d| d * d).sum() / n;

        let errors = (diff * (2.0 / n)).insert_axis(Axis(1));
        let (gradients, _) = self.critic.backward_batch(errors.view())?;
        self.critic.apply_gradients(gradients, self.lr, GRAD_CLIP)?;
        Ok(loss)
    }

    /// One deterministic policy-gradient step of the actor.
    ///
    /// `critic_inputs` is the critic input for the batch; the columns
    /// `action_offset..action_offset + action_dim` are overwritten with the
    /// current actor's action before the critic scores it. The critic's
    /// parameters are not changed. Returns the actor loss
    /// `-mean(Q) + 1e-3 * mean(output²)`.
    pub fn update_actor(
        &mut self,
        observations: ArrayView2<f32>,
        mut critic_inputs: Array2<f32>,
        action_offset: usize,
    ) -> Result<f32> {
        let output = self.actor.forward_batch(observations)?;
        let action_dim = output.ncols();
        if critic_inputs.nrows() != output.nrows() || action_offset + action_dim > critic_inputs.ncols() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} critic rows with room for {} action columns at {}", output.nrows(), action_dim, action_offset),
                format!("{:?}", critic_inputs.dim()),
            ));
        }

        let relaxed = if self.action_space.is_discrete() {
            Some(gumbel_softmax(output.view(), 1.0, &mut self.rng))
        } else {
            None
        };
        let action = relaxed.as_ref().map_or(&output, |sample| &sample.hard);
        critic_inputs
            .slice_mut(s![.., action_offset..action_offset + action_dim])
            .assign(action);

        let q = self.critic.forward_batch(critic_inputs.view())?;
        let n_rows = q.nrows() as f32;
        let n_outputs = output.len() as f32;
        let penalty = ACTOR_OUTPUT_PENALTY * output.mapv(|o| o * o).sum() / n_outputs;
        let loss = -q.sum() / n_rows + penalty;

        let q_errors = Array2::from_elem(q.dim(), -1.0 / n_rows);
        let (_, critic_input_grad) = self.critic.backward_batch(q_errors.view())?;
        self.critic.clear_cache();

        let action_grad = critic_input_grad.slice(s![.., action_offset..action_offset + action_dim]);
        let mut output_grad = match &relaxed {
            Some(sample) => sample.backward(action_grad),
            None => action_grad.to_owned(),
        };
        output_grad.zip_mut_with(&output, |g, &o| *g += 2.0 * ACTOR_OUTPUT_PENALTY * o / n_outputs);

        let (gradients, _) = self.actor.backward_batch(output_grad.view())?;
        self.actor.apply_gradients(gradients, self.lr, GRAD_CLIP)?;
        Ok(loss)
    }

    pub fn soft_update_targets(&mut self, tau: f32) -> Result<()> {
        self.target_actor.soft_update_from(&self.actor, tau)?;
        self.target_critic.soft_update_from(&self.critic, tau)
    }

    pub fn scale_noise(&mut self, scale: f32) {
        self.exploration.set_scale(scale);
    }

    pub fn reset_noise(&mut self) {
        self.exploration.reset();
    }

    /// Drop cached activations of both trainable networks.
    pub fn clear_caches(&mut self) {
        self.actor.clear_cache();
        self.critic.clear_cache();
    }

    pub fn action_dim(&self) -> usize {
        self.action_space.dim()
    }

    pub fn observation_dim(&self) -> usize {
        self.actor.input_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::AgentRole;

    fn spec(action_space: ActionSpace) -> AgentSpec {
        AgentSpec {
            role: AgentRole::Agent,
            observation_dim: 3,
            action_space,
        }
    }

    fn continuous() -> AgentSpec {
        spec(ActionSpace::Continuous { dim: 2, low: -1.0, high: 1.0 })
    }

    #[test]
    fn test_continuous_actor_starts_near_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        let agent = AgentPolicy::new(&continuous(), 5, 16, 0.01, &mut rng).unwrap();
        let actions = agent.policy_action(Array2::from_elem((4, 3), 0.5).view()).unwrap();
        assert_eq!(actions.dim(), (4, 2));
        assert!(actions.iter().all(|a| a.abs() < 0.3));
    }

    #[test]
    fn test_exploration_is_clipped() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut agent = AgentPolicy::new(&continuous(), 5, 16, 0.01, &mut rng).unwrap();
        agent.scale_noise(50.0);
        let obs = Array2::from_elem((8, 3), 0.5);
        for _ in 0..10 {
            let actions = agent.step(obs.view(), true).unwrap();
            assert!(actions.iter().all(|a| (-1.0..=1.0).contains(a)));
        }
    }

    #[test]
    fn test_discrete_actions_are_one_hot() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut agent = AgentPolicy::new(&spec(ActionSpace::Discrete { n: 5 }), 8, 16, 0.01, &mut rng).unwrap();
        let obs = Array2::from_elem((6, 3), 0.2);
        for explore in [true, false] {
            let actions = agent.step(obs.view(), explore).unwrap();
            for row in actions.rows() {
                assert_eq!(row.sum(), 1.0);
            }
        }
    }

    #[test]
    fn test_critic_update_reduces_loss() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut agent = AgentPolicy::new(&continuous(), 5, 16, 0.01, &mut rng).unwrap();
        let inputs = Array2::from_shape_fn((16, 5), |(i, j)| ((i * 5 + j) as f32 * 0.1).sin());
        let targets = ndarray::Array1::from_elem(16, 1.0);
        let first = agent.update_critic(inputs.view(), targets.view()).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = agent.update_critic(inputs.view(), targets.view()).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn test_actor_update_leaves_critic_and_targets() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut agent = AgentPolicy::new(&continuous(), 5, 16, 0.01, &mut rng).unwrap();
        let critic_before = TargetNetwork::from_network(&agent.critic);
        let target_before = agent.target_actor.clone();
        let actor_before = TargetNetwork::from_network(&agent.actor);

        let obs = Array2::from_elem((4, 3), 0.3);
        let critic_inputs = ndarray::concatenate![Axis(1), obs, Array2::<f32>::zeros((4, 2))];
        agent.update_actor(obs.view(), critic_inputs, 3).unwrap();

        assert_eq!(TargetNetwork::from_network(&agent.critic), critic_before);
        assert_eq!(agent.target_actor, target_before);
        assert_ne!(TargetNetwork::from_network(&agent.actor), actor_before);
    }

    #[test]
    fn test_actor_update_rejects_bad_offset() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut agent = AgentPolicy::new(&continuous(), 5, 16, 0.01, &mut rng).unwrap();
        let obs = Array2::from_elem((4, 3), 0.3);
        let result = agent.update_actor(obs.view(), Array2::zeros((4, 5)), 4);
        assert!(matches!(result, Err(MaddpgError::DimensionMismatch { .. })));
    }
}
