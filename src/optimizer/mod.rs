pub mod gradient_clipper;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::layers::{DenseLayer, LayerGradients};

pub use gradient_clipper::GradientClipper;

/// Steps every layer of one network with that network's gradients.
pub trait Optimizer {
    fn step(&mut self, layers: &mut [DenseLayer], gradients: &[LayerGradients], learning_rate: f32);
}

/// Adam with per-layer first and second moments.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Array2<f32>>,
    v_weights: Vec<Array2<f32>>,
    m_biases: Vec<Array1<f32>>,
    v_biases: Vec<Array1<f32>>,
    pub t: i32,
}

impl Adam {
    pub fn new(layers: &[DenseLayer], beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m_weights: layers.iter().map(|l| Array2::zeros(l.weights.dim())).collect(),
            v_weights: layers.iter().map(|l| Array2::zeros(l.weights.dim())).collect(),
            m_biases: layers.iter().map(|l| Array1::zeros(l.biases.dim())).collect(),
            v_biases: layers.iter().map(|l| Array1::zeros(l.biases.dim())).collect(),
            t: 0,
        }
    }

    pub fn default(layers: &[DenseLayer]) -> Self {
        Self::new(layers, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, layers: &mut [DenseLayer], gradients: &[LayerGradients], learning_rate: f32) {
        self.t += 1;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - beta1.powi(self.t);
        let correction2 = 1.0 - beta2.powi(self.t);

        for (index, (layer, grad)) in layers.iter_mut().zip(gradients).enumerate() {
            let m = &mut self.m_weights[index];
            let v = &mut self.v_weights[index];
            m.zip_mut_with(&grad.weights, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&grad.weights, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
            ndarray::Zip::from(&mut layer.weights)
                .and(&*m)
                .and(&*v)
                .for_each(|w, &m, &v| {
                    *w -= learning_rate * (m / correction1) / ((v / correction2).sqrt() + epsilon);
                });

            let m = &mut self.m_biases[index];
            let v = &mut self.v_biases[index];
            m.zip_mut_with(&grad.biases, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&grad.biases, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
            ndarray::Zip::from(&mut layer.biases)
                .and(&*m)
                .and(&*v)
                .for_each(|b, &m, &v| {
                    *b -= learning_rate * (m / correction1) / ((v / correction2).sqrt() + epsilon);
                });
        }
    }
}
