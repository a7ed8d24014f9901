use crate::layers::LayerGradients;

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GradientClipper {
    /// Clip gradients by global norm (across all layers of one network)
    ClipByGlobalNorm { max_norm: f32 },
}

impl GradientClipper {
    /// Compute global norm of all gradients
    pub fn compute_global_norm(gradients: &[LayerGradients]) -> f32 {
        gradients
            .iter()
            .map(|g| {
                g.weights.iter().map(|&x| x * x).sum::<f32>()
                    + g.biases.iter().map(|&x| x * x).sum::<f32>()
            })
            .sum::<f32>()
            .sqrt()
    }

    /// Clip in place; returns the norm measured before clipping.
    pub fn clip(&self, gradients: &mut [LayerGradients]) -> f32 {
        let GradientClipper::ClipByGlobalNorm { max_norm } = *self;
        let global_norm = Self::compute_global_norm(gradients);
        if global_norm > max_norm {
            let scale = max_norm / (global_norm + 1e-6);
            for grad in gradients.iter_mut() {
                grad.weights.mapv_inplace(|g| g * scale);
                grad.biases.mapv_inplace(|g| g * scale);
            }
        }
        global_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_global_norm_clipping() {
        let mut grads = vec![LayerGradients {
            weights: arr2(&[[3.0, 0.0]]),
            biases: arr1(&[4.0]),
        }];
        let norm = GradientClipper::ClipByGlobalNorm { max_norm: 0.5 }.clip(&mut grads);
        assert!((norm - 5.0).abs() < 1e-6);
        let clipped = GradientClipper::compute_global_norm(&grads);
        assert!(clipped <= 0.5 + 1e-5);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let mut grads = vec![LayerGradients {
            weights: arr2(&[[0.1, 0.0]]),
            biases: arr1(&[0.1]),
        }];
        GradientClipper::ClipByGlobalNorm { max_norm: 0.5 }.clip(&mut grads);
        assert_eq!(grads[0].weights, arr2(&[[0.1, 0.0]]));
    }
}
