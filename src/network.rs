use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{MaddpgError, Result};
use crate::layers::{DenseLayer, LayerGradients, WeightInit};
use crate::optimizer::{Adam, GradientClipper, Optimizer};

/// A multi-layer perceptron with its optimizer state.
///
/// `predict` is the inference path used while collecting rollouts; it never
/// touches cached activations. `forward_batch` followed by `backward_batch`
/// is the training path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
    pub optimizer: Adam,
}

impl NeuralNetwork {
    /// Create a network from layer sizes and activations, one initializer per layer.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        inits: &[WeightInit],
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 || layer_sizes.len() - 1 != activations.len() || activations.len() != inits.len() {
            return Err(MaddpgError::invalid_parameter(
                "layer_sizes".to_string(),
                format!(
                    "{} sizes need {} activations and initializers, got {} and {}",
                    layer_sizes.len(),
                    layer_sizes.len().saturating_sub(1),
                    activations.len(),
                    inits.len()
                ),
            ));
        }

        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter().zip(inits))
            .map(|(window, (&activation, &init))| DenseLayer::new(window[0], window[1], activation, init, rng))
            .collect::<Vec<_>>();
        let optimizer = Adam::default(&layers);

        Ok(NeuralNetwork { layers, optimizer })
    }

    /// Two hidden ReLU layers of `hidden_dim` followed by an output layer.
    pub fn mlp<R: Rng + ?Sized>(
        input_dim: usize,
        output_dim: usize,
        hidden_dim: usize,
        output_activation: Activation,
        output_init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(
            &[input_dim, hidden_dim, hidden_dim, output_dim],
            &[Activation::Relu, Activation::Relu, output_activation],
            &[WeightInit::FanInUniform, WeightInit::FanInUniform, output_init],
            rng,
        )
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_size)
    }

    /// Inference forward pass for a batch of inputs.
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(inputs)?;
        let mut current = inputs.to_owned();
        for layer in &self.layers {
            current = layer.predict(current.view());
        }
        Ok(current)
    }

    /// Training forward pass; every layer caches what backpropagation needs.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(inputs)?;
        let mut current = inputs.to_owned();
        for layer in &mut self.layers {
            current = layer.forward_batch(current.view());
        }
        Ok(current)
    }

    /// Backpropagate dL/d(output) through the cached forward pass.
    ///
    /// Returns per-layer gradients (input layer first) and dL/d(input).
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<(Vec<LayerGradients>, Array2<f32>)> {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut current_error = output_errors.to_owned();

        for layer in self.layers.iter().rev() {
            let (input_error, layer_gradients) = layer.backward_batch(current_error.view())?;
            gradients.push(layer_gradients);
            current_error = input_error;
        }

        gradients.reverse();
        Ok((gradients, current_error))
    }

    /// Clip and apply gradients. Returns the pre-clip gradient norm.
    pub fn apply_gradients(
        &mut self,
        mut gradients: Vec<LayerGradients>,
        learning_rate: f32,
        clipper: GradientClipper,
    ) -> Result<f32> {
        if gradients.len() != self.layers.len() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} layer gradients", self.layers.len()),
                format!("{} layer gradients", gradients.len()),
            ));
        }
        let norm = clipper.clip(&mut gradients);
        if !norm.is_finite() {
            return Err(MaddpgError::NumericalError(format!("gradient norm is {}", norm)));
        }
        self.optimizer.step(&mut self.layers, &gradients, learning_rate);
        Ok(norm)
    }

    /// Drop every layer's cached activations.
    pub fn clear_cache(&mut self) {
        for layer in &mut self.layers {
            layer.clear_cache();
        }
    }

    fn check_input(&self, inputs: ArrayView2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{} input features", inputs.ncols()),
            ));
        }
        Ok(())
    }
}
