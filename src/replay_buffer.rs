use log::warn;
use ndarray::{s, Array1, Array2, Axis};
use rand::seq::index;
use rand::Rng;

use crate::error::{MaddpgError, Result};

/// One simultaneous step of every rollout worker.
///
/// Fields are indexed by agent first; each agent's block has one row per
/// worker, and row `k` of every block belongs to the same environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub observations: Vec<Array2<f32>>,
    pub actions: Vec<Array2<f32>>,
    pub rewards: Vec<Array1<f32>>,
    pub next_observations: Vec<Array2<f32>>,
    pub dones: Vec<Array1<bool>>,
}

impl Transition {
    pub fn num_agents(&self) -> usize {
        self.observations.len()
    }

    /// Rows per agent block (the number of rollout workers).
    pub fn num_envs(&self) -> usize {
        self.observations.first().map_or(0, |o| o.nrows())
    }

    /// Cyclic relabelling of the agent axis: agent `i`'s experience becomes
    /// agent `(i + k) % n`'s. Every field moves together and `self` is left
    /// untouched, so `rotated(n)` equals the original.
    pub fn rotated(&self, k: usize) -> Transition {
        Transition {
            observations: rotate(&self.observations, k),
            actions: rotate(&self.actions, k),
            rewards: rotate(&self.rewards, k),
            next_observations: rotate(&self.next_observations, k),
            dones: rotate(&self.dones, k),
        }
    }
}

fn rotate<T: Clone>(items: &[T], k: usize) -> Vec<T> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }
    let shift = k % n;
    (0..n).map(|j| items[(j + n - shift) % n].clone()).collect()
}

/// Joint minibatch. Row `j` of every agent's block comes from the same
/// stored entry, `indices[j]`.
#[derive(Clone, Debug)]
pub struct Batch {
    pub observations: Vec<Array2<f32>>,
    pub actions: Vec<Array2<f32>>,
    pub rewards: Vec<Array1<f32>>,
    pub next_observations: Vec<Array2<f32>>,
    /// 1.0 for terminal entries, 0.0 otherwise.
    pub dones: Vec<Array1<f32>>,
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Fixed-capacity ring of joint transitions with per-agent column storage.
///
/// Valid entries occupy `cursor - size .. cursor` modulo capacity; pushing
/// into a full buffer overwrites the oldest entry.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    observation_dims: Vec<usize>,
    action_dims: Vec<usize>,
    observations: Vec<Array2<f32>>,
    actions: Vec<Array2<f32>>,
    rewards: Vec<Array1<f32>>,
    next_observations: Vec<Array2<f32>>,
    dones: Vec<Array1<f32>>,
    cursor: usize,
    size: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize, observation_dims: &[usize], action_dims: &[usize]) -> Result<Self> {
        if capacity == 0 {
            return Err(MaddpgError::invalid_parameter("capacity", "must be positive"));
        }
        if observation_dims.len() != action_dims.len() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} action dims", observation_dims.len()),
                format!("{} action dims", action_dims.len()),
            ));
        }

        let observations = observation_dims.iter().map(|&d| Array2::zeros((capacity, d))).collect();
        let next_observations = observation_dims.iter().map(|&d| Array2::zeros((capacity, d))).collect();
        let actions = action_dims.iter().map(|&d| Array2::zeros((capacity, d))).collect();
        let n_agents = observation_dims.len();

        Ok(ReplayBuffer {
            capacity,
            observation_dims: observation_dims.to_vec(),
            action_dims: action_dims.to_vec(),
            observations,
            actions,
            rewards: vec![Array1::zeros(capacity); n_agents],
            next_observations,
            dones: vec![Array1::zeros(capacity); n_agents],
            cursor: 0,
            size: 0,
        })
    }

    /// Store every worker row of `transition` as its own joint entry.
    ///
    /// All agents' shapes are checked before anything is written, so a
    /// rejected transition leaves the buffer unchanged.
    pub fn push(&mut self, transition: &Transition) -> Result<()> {
        self.validate(transition)?;

        for row in 0..transition.num_envs() {
            let slot = self.cursor;
            for agent in 0..self.num_agents() {
                self.observations[agent]
                    .row_mut(slot)
                    .assign(&transition.observations[agent].row(row));
                self.actions[agent].row_mut(slot).assign(&transition.actions[agent].row(row));
                self.rewards[agent][slot] = transition.rewards[agent][row];
                self.next_observations[agent]
                    .row_mut(slot)
                    .assign(&transition.next_observations[agent].row(row));
                self.dones[agent][slot] = if transition.dones[agent][row] { 1.0 } else { 0.0 };
            }
            self.cursor = (self.cursor + 1) % self.capacity;
            self.size = (self.size + 1).min(self.capacity);
        }
        Ok(())
    }

    fn validate(&self, transition: &Transition) -> Result<()> {
        let n_agents = self.num_agents();
        let field_counts = [
            transition.observations.len(),
            transition.actions.len(),
            transition.rewards.len(),
            transition.next_observations.len(),
            transition.dones.len(),
        ];
        if field_counts.iter().any(|&c| c != n_agents) {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} agents in every field", n_agents),
                format!("{:?}", field_counts),
            ));
        }

        let rows = transition.num_envs();
        for agent in 0..n_agents {
            let expected = [
                (rows, self.observation_dims[agent]),
                (rows, self.action_dims[agent]),
                (rows, self.observation_dims[agent]),
            ];
            let actual = [
                transition.observations[agent].dim(),
                transition.actions[agent].dim(),
                transition.next_observations[agent].dim(),
            ];
            if expected != actual
                || transition.rewards[agent].len() != rows
                || transition.dones[agent].len() != rows
            {
                return Err(MaddpgError::dimension_mismatch(
                    format!("agent {} blocks {:?} with {} rewards and dones", agent, expected, rows),
                    format!(
                        "{:?} with {} rewards and {} dones",
                        actual,
                        transition.rewards[agent].len(),
                        transition.dones[agent].len()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Draw `batch_size` distinct stored entries and gather every agent's
    /// fields with that single index set.
    ///
    /// With `normalize_rewards`, each agent's sampled rewards are
    /// standardised by the mean and standard deviation of all of that
    /// agent's stored rewards.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, normalize_rewards: bool, rng: &mut R) -> Result<Batch> {
        if batch_size == 0 {
            return Err(MaddpgError::invalid_parameter("batch_size", "must be positive"));
        }
        if batch_size > self.size {
            return Err(MaddpgError::InsufficientSamples {
                requested: batch_size,
                available: self.size,
            });
        }

        let start = (self.cursor + self.capacity - self.size) % self.capacity;
        let indices: Vec<usize> = index::sample(rng, self.size, batch_size)
            .into_iter()
            .map(|p| (start + p) % self.capacity)
            .collect();

        let gather2 = |blocks: &[Array2<f32>]| -> Vec<Array2<f32>> {
            blocks.iter().map(|b| b.select(Axis(0), &indices)).collect()
        };
        let gather1 = |blocks: &[Array1<f32>]| -> Vec<Array1<f32>> {
            blocks.iter().map(|b| b.select(Axis(0), &indices)).collect()
        };

        let mut rewards = gather1(&self.rewards);
        if normalize_rewards {
            for (agent, sampled) in rewards.iter_mut().enumerate() {
                let stored = self.rewards[agent].slice(s![..self.size]);
                let mean = stored.mean().unwrap_or(0.0);
                let std = stored.std(0.0);
                if std > 0.0 {
                    sampled.mapv_inplace(|r| (r - mean) / std);
                } else {
                    warn!("agent {} rewards have zero variance; centering without scaling", agent);
                    sampled.mapv_inplace(|r| r - mean);
                }
            }
        }

        Ok(Batch {
            observations: gather2(&self.observations),
            actions: gather2(&self.actions),
            rewards,
            next_observations: gather2(&self.next_observations),
            dones: gather1(&self.dones),
            indices,
        })
    }

    /// Per-agent mean reward over the most recent `window` entries (all
    /// entries when fewer are stored).
    pub fn get_average_rewards(&self, window: usize) -> Vec<f32> {
        let count = window.min(self.size);
        self.rewards
            .iter()
            .map(|rewards| {
                if count == 0 {
                    return 0.0;
                }
                let sum: f32 = (1..=count)
                    .map(|back| rewards[(self.cursor + self.capacity - back) % self.capacity])
                    .sum();
                sum / count as f32
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_agents(&self) -> usize {
        self.observation_dims.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Single-worker transition whose every field carries `marker`.
    fn marked(marker: f32, n_agents: usize) -> Transition {
        Transition {
            observations: vec![Array2::from_elem((1, 2), marker); n_agents],
            actions: vec![Array2::from_elem((1, 1), marker); n_agents],
            rewards: vec![Array1::from_elem(1, marker); n_agents],
            next_observations: vec![Array2::from_elem((1, 2), marker); n_agents],
            dones: vec![Array1::from_elem(1, false); n_agents],
        }
    }

    fn buffer(capacity: usize, n_agents: usize) -> ReplayBuffer {
        ReplayBuffer::new(capacity, &vec![2; n_agents], &vec![1; n_agents]).unwrap()
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut buffer = buffer(3, 2);
        for marker in 0..5 {
            buffer.push(&marked(marker as f32, 2)).unwrap();
        }
        assert_eq!(buffer.len(), 3);
        let mut rng = StdRng::seed_from_u64(0);
        let batch = buffer.sample(3, false, &mut rng).unwrap();
        let mut kept: Vec<f32> = batch.rewards[0].to_vec();
        kept.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);

        // five pushes into three slots: cursor 2, oldest survivor (marker 2) at slot 2
        let start = (buffer.cursor + buffer.capacity - buffer.len()) % buffer.capacity;
        assert_eq!(start, 2);
        for (row, &slot) in batch.indices.iter().enumerate() {
            let age = (slot + buffer.capacity - start) % buffer.capacity;
            assert_eq!(batch.rewards[0][row], (2 + age) as f32);
            assert_eq!(batch.rewards[1][row], (2 + age) as f32);
        }
        let oldest = batch.indices.iter().position(|&slot| slot == start).unwrap();
        assert_eq!(batch.rewards[0][oldest], 2.0);
    }

    #[test]
    fn test_multi_worker_push_writes_each_row() {
        let mut buffer = buffer(10, 2);
        let mut transition = marked(0.0, 2);
        for agent in 0..2 {
            transition.observations[agent] = Array2::zeros((3, 2));
            transition.actions[agent] = Array2::zeros((3, 1));
            transition.next_observations[agent] = Array2::zeros((3, 2));
            transition.rewards[agent] = Array1::from(vec![1.0, 2.0, 3.0]);
            transition.dones[agent] = Array1::from(vec![false, false, true]);
        }
        buffer.push(&transition).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get_average_rewards(2), vec![2.5, 2.5]);
    }

    #[test]
    fn test_bad_shape_leaves_buffer_untouched() {
        let mut buffer = buffer(4, 2);
        buffer.push(&marked(1.0, 2)).unwrap();
        let mut bad = marked(2.0, 2);
        bad.actions[1] = Array2::zeros((1, 3));
        assert!(matches!(buffer.push(&bad), Err(MaddpgError::DimensionMismatch { .. })));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.rewards[0][1], 0.0);
    }

    #[test]
    fn test_sample_refuses_more_than_stored() {
        let mut buffer = buffer(10, 1);
        buffer.push(&marked(1.0, 1)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        match buffer.sample(2, false, &mut rng) {
            Err(MaddpgError::InsufficientSamples { requested, available }) => {
                assert_eq!((requested, available), (2, 1));
            }
            other => panic!("unexpected {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_normalized_rewards() {
        let mut buffer = buffer(4, 1);
        for marker in [1.0, 3.0] {
            buffer.push(&marked(marker, 1)).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(0);
        let batch = buffer.sample(2, true, &mut rng).unwrap();
        let mut rewards = batch.rewards[0].to_vec();
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_zero_variance_rewards_are_centered() {
        let mut buffer = buffer(4, 1);
        buffer.push(&marked(5.0, 1)).unwrap();
        buffer.push(&marked(5.0, 1)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let batch = buffer.sample(2, true, &mut rng).unwrap();
        assert!(batch.rewards[0].iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_average_rewards_window() {
        let mut buffer = buffer(3, 1);
        assert_eq!(buffer.get_average_rewards(5), vec![0.0]);
        for marker in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(&marked(marker, 1)).unwrap();
        }
        assert_eq!(buffer.get_average_rewards(2), vec![3.5]);
        assert_eq!(buffer.get_average_rewards(10), vec![3.0]);
    }

    #[test]
    fn test_rotation_moves_whole_tuples() {
        let transition = Transition {
            observations: (0..3).map(|i| Array2::from_elem((1, 2), i as f32)).collect(),
            actions: (0..3).map(|i| Array2::from_elem((1, 1), i as f32)).collect(),
            rewards: (0..3).map(|i| Array1::from_elem(1, i as f32)).collect(),
            next_observations: (0..3).map(|i| Array2::from_elem((1, 2), i as f32)).collect(),
            dones: (0..3).map(|i| Array1::from_elem(1, i == 0)).collect(),
        };
        let rotated = transition.rotated(1);
        // old agent 0 now sits in slot 1
        assert_eq!(rotated.rewards[1][0], 0.0);
        assert_eq!(rotated.observations[1][[0, 0]], 0.0);
        assert!(rotated.dones[1][0]);
        assert_eq!(rotated.rewards[0][0], 2.0);
        assert_eq!(transition.rotated(3), transition);
        assert_eq!(transition.rewards[0][0], 0.0);
    }
}
