use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::initialization::WeightInit;
use crate::activations::Activation;
use crate::error::{MaddpgError, Result};

/// Weight and bias gradients of one dense layer.
#[derive(Clone, Debug)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

/// A fully connected (dense) layer in a neural network
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer with the given sizes, activation and initialization.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        let weights = init.initialize_weights((input_size, output_size), rng);
        let biases = init.initialize_biases(input_size, output_size, rng);
        DenseLayer {
            weights,
            biases,
            activation,
            pre_activation_output: None,
            inputs: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Inference forward pass. Nothing is cached, so no gradient can be taken from it.
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        forward_parameters(self.weights.view(), self.biases.view(), self.activation, inputs)
    }

    /// Training forward pass; caches inputs and pre-activations for `backward_batch`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let pre_activation = affine(self.weights.view(), self.biases.view(), inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply_batch(&mut outputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(pre_activation);
        outputs
    }

    /// Backpropagate `output_errors` (dL/d output) through the layer.
    ///
    /// Returns the error with respect to the layer input along with the
    /// parameter gradients.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<(Array2<f32>, LayerGradients)> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(MaddpgError::TrainingError(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(MaddpgError::dimension_mismatch(
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = &output_errors * &activation_deriv;
        let weight_gradients = inputs.t().dot(&adjusted_error);
        let bias_gradients = adjusted_error.sum_axis(Axis(0));
        let input_error = adjusted_error.dot(&self.weights.t());

        Ok((
            input_error,
            LayerGradients {
                weights: weight_gradients,
                biases: bias_gradients,
            },
        ))
    }

    /// Drop cached activations.
    pub fn clear_cache(&mut self) {
        self.inputs = None;
        self.pre_activation_output = None;
    }

    pub fn has_cache(&self) -> bool {
        self.inputs.is_some()
    }
}

fn affine(weights: ArrayView2<f32>, biases: ArrayView1<f32>, inputs: ArrayView2<f32>) -> Array2<f32> {
    inputs.dot(&weights) + &biases.insert_axis(Axis(0))
}

/// Forward pass shared by trainable layers and frozen target parameters, so
/// identical parameters always give bit-identical outputs.
pub(crate) fn forward_parameters(
    weights: ArrayView2<f32>,
    biases: ArrayView1<f32>,
    activation: Activation,
    inputs: ArrayView2<f32>,
) -> Array2<f32> {
    let mut outputs = affine(weights, biases, inputs);
    activation.apply_batch(&mut outputs);
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_layer(activation: Activation) -> DenseLayer {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = DenseLayer::new(2, 2, activation, WeightInit::Zeros, &mut rng);
        layer.weights = arr2(&[[1.0, -1.0], [2.0, 0.5]]);
        layer.biases = arr1(&[0.5, 0.0]);
        layer
    }

    #[test]
    fn test_predict_matches_forward() {
        let mut layer = fixed_layer(Activation::Relu);
        let x = arr2(&[[1.0, 1.0], [-1.0, 0.0]]);
        let predicted = layer.predict(x.view());
        let trained = layer.forward_batch(x.view());
        assert_eq!(predicted, trained);
        assert_eq!(predicted, arr2(&[[3.5, 0.0], [0.0, 1.0]]));
    }

    #[test]
    fn test_backward_requires_forward() {
        let layer = fixed_layer(Activation::Linear);
        let err = layer.backward_batch(arr2(&[[1.0, 1.0]]).view());
        assert!(err.is_err());
    }

    #[test]
    fn test_linear_input_gradient() {
        let mut layer = fixed_layer(Activation::Linear);
        let x = arr2(&[[1.0, 2.0]]);
        layer.forward_batch(x.view());
        let (input_error, grads) = layer.backward_batch(arr2(&[[1.0, 0.0]]).view()).unwrap();
        // d(out_0)/d(x) is the first column of the weights
        assert_eq!(input_error, arr2(&[[1.0, 2.0]]));
        assert_eq!(grads.weights, arr2(&[[1.0, 0.0], [2.0, 0.0]]));
        assert_eq!(grads.biases, arr1(&[1.0, 0.0]));
    }
}
