//! Target networks for stable bootstrapped values.
//!
//! A target network is a slowly tracking copy of a trainable network. It is a
//! separate type with no backward pass and no optimizer, so nothing can ever
//! train it directly; the only way its parameters change is Polyak averaging:
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{MaddpgError, Result};
use crate::layers::dense::forward_parameters;
use crate::network::NeuralNetwork;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct FrozenLayer {
    weights: Array2<f32>,
    biases: Array1<f32>,
    activation: Activation,
}

/// Gradient-inert copy of a [`NeuralNetwork`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TargetNetwork {
    layers: Vec<FrozenLayer>,
}

impl TargetNetwork {
    /// Hard copy of the source network's current parameters.
    pub fn from_network(source: &NeuralNetwork) -> Self {
        let layers = source
            .layers
            .iter()
            .map(|layer| FrozenLayer {
                weights: layer.weights.clone(),
                biases: layer.biases.clone(),
                activation: layer.activation,
            })
            .collect();
        TargetNetwork { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    /// Forward pass; uses the same arithmetic as [`NeuralNetwork::predict`].
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{} input features", inputs.ncols()),
            ));
        }
        let mut current = inputs.to_owned();
        for layer in &self.layers {
            current = forward_parameters(layer.weights.view(), layer.biases.view(), layer.activation, current.view());
        }
        Ok(current)
    }

    /// Move every parameter toward `source` at rate `tau`.
    ///
    /// `tau == 1` copies exactly and `tau == 0` leaves the target untouched.
    pub fn soft_update_from(&mut self, source: &NeuralNetwork, tau: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&tau) {
            return Err(MaddpgError::invalid_parameter(
                "tau".to_string(),
                format!("must lie in [0, 1], got {}", tau),
            ));
        }
        if source.layers.len() != self.layers.len()
            || source
                .layers
                .iter()
                .zip(&self.layers)
                .any(|(s, t)| s.weights.dim() != t.weights.dim())
        {
            return Err(MaddpgError::dimension_mismatch(
                "source with the target's architecture".to_string(),
                "a different architecture".to_string(),
            ));
        }
        if tau == 0.0 {
            return Ok(());
        }

        for (target, source) in self.layers.iter_mut().zip(&source.layers) {
            if tau == 1.0 {
                target.weights.assign(&source.weights);
                target.biases.assign(&source.biases);
            } else {
                target
                    .weights
                    .zip_mut_with(&source.weights, |t, &s| *t = tau * s + (1.0 - tau) * *t);
                target
                    .biases
                    .zip_mut_with(&source.biases, |t, &s| *t = tau * s + (1.0 - tau) * *t);
            }
        }
        Ok(())
    }

    /// Flattened parameters, input layer first. Used for comparisons in tests and tooling.
    pub fn parameters(&self) -> Vec<f32> {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter().chain(l.biases.iter()).copied())
            .collect()
    }
}
