//! Categorical action helpers for discrete-action agents.
//!
//! Discrete actors output logits. Exploration samples a one-hot action with
//! the Gumbel-softmax trick; the straight-through estimator lets the actor
//! loss differentiate through the soft relaxation while the forward value
//! stays a hard one-hot.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

const GUMBEL_EPS: f32 = 1e-20;

/// Row-wise numerically stable softmax.
pub fn softmax_rows(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Index of the largest value in each row (first one on ties).
pub fn argmax_rows(values: ArrayView2<f32>) -> Array1<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
                    if v > best_v {
                        (i, v)
                    } else {
                        (best, best_v)
                    }
                })
                .0
        })
        .collect()
}

/// Deterministic mode action: one-hot of each row's argmax.
pub fn onehot_from_logits(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = Array2::zeros(logits.dim());
    for (row, index) in argmax_rows(logits).iter().enumerate() {
        out[[row, *index]] = 1.0;
    }
    out
}

/// Standard Gumbel noise `-ln(-ln(U))`.
pub fn sample_gumbel<R: Rng + ?Sized>(shape: (usize, usize), rng: &mut R) -> Array2<f32> {
    Array2::from_shape_fn(shape, |_| {
        let u: f32 = rng.gen();
        -(-(u + GUMBEL_EPS).ln() + GUMBEL_EPS).ln()
    })
}

/// A hard Gumbel-softmax sample together with its soft relaxation.
#[derive(Clone, Debug)]
pub struct GumbelSample {
    pub hard: Array2<f32>,
    pub soft: Array2<f32>,
    pub temperature: f32,
}

impl GumbelSample {
    /// Straight-through gradient: maps dL/d(hard) to dL/d(logits) through the
    /// softmax of the perturbed logits.
    pub fn backward(&self, upstream: ArrayView2<f32>) -> Array2<f32> {
        let dot = (&upstream * &self.soft).sum_axis(Axis(1)).insert_axis(Axis(1));
        (&upstream - &dot) * &self.soft / self.temperature
    }
}

/// Draw one-hot actions from `logits` with Gumbel-softmax at `temperature`.
pub fn gumbel_softmax<R: Rng + ?Sized>(logits: ArrayView2<f32>, temperature: f32, rng: &mut R) -> GumbelSample {
    let noisy = (&logits + &sample_gumbel(logits.dim(), rng)) / temperature;
    let soft = softmax_rows(noisy.view());
    let hard = onehot_from_logits(soft.view());
    GumbelSample { hard, soft, temperature }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let p = softmax_rows(arr2(&[[1.0, 2.0, 3.0], [1000.0, 0.0, -1000.0]]).view());
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!(p[[1, 0]] > 0.999);
    }

    #[test]
    fn test_onehot_from_logits() {
        let onehot = onehot_from_logits(arr2(&[[0.1, 0.7, 0.2], [5.0, -1.0, 0.0]]).view());
        assert_eq!(onehot, arr2(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]));
    }

    #[test]
    fn test_gumbel_sample_is_one_hot() {
        let mut rng = StdRng::seed_from_u64(3);
        let logits = Array2::zeros((16, 5));
        let sample = gumbel_softmax(logits.view(), 1.0, &mut rng);
        for row in sample.hard.rows() {
            assert_eq!(row.sum(), 1.0);
            assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
        }
    }

    #[test]
    fn test_straight_through_gradient_matches_softmax_jacobian() {
        let sample = GumbelSample {
            hard: arr2(&[[0.0, 1.0]]),
            soft: arr2(&[[0.25, 0.75]]),
            temperature: 1.0,
        };
        let grad = sample.backward(arr2(&[[1.0, 0.0]]).view());
        // d soft_0 / d logits = [p0 (1 - p0), -p0 p1]
        assert!((grad[[0, 0]] - 0.1875).abs() < 1e-6);
        assert!((grad[[0, 1]] + 0.1875).abs() < 1e-6);
    }
}
