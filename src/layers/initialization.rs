use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// U(-1/sqrt(fan_in), 1/sqrt(fan_in)) for weights and biases
    FanInUniform,

    /// Uniform weights in a custom range, fan-in uniform biases
    Uniform { min: f32, max: f32 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Initialize a `(fan_in, fan_out)` weight matrix
    pub fn initialize_weights<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        let (fan_in, _) = shape;
        match self {
            WeightInit::FanInUniform => {
                let limit = fan_in_limit(fan_in);
                Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }
            WeightInit::Uniform { min, max } => {
                Array2::random_using(shape, Uniform::new_inclusive(*min, *max), rng)
            }
            WeightInit::Zeros => Array2::zeros(shape),
        }
    }

    /// Initialize the bias vector of a layer with the given fan-in
    pub fn initialize_biases<R: Rng + ?Sized>(&self, fan_in: usize, size: usize, rng: &mut R) -> Array1<f32> {
        match self {
            WeightInit::FanInUniform | WeightInit::Uniform { .. } => {
                let limit = fan_in_limit(fan_in);
                Array1::random_using(size, Uniform::new_inclusive(-limit, limit), rng)
            }
            WeightInit::Zeros => Array1::zeros(size),
        }
    }
}

fn fan_in_limit(fan_in: usize) -> f32 {
    1.0 / (fan_in.max(1) as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fan_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let w = WeightInit::FanInUniform.initialize_weights((16, 8), &mut rng);
        assert_eq!(w.dim(), (16, 8));
        assert!(w.iter().all(|v| v.abs() <= 0.25));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = WeightInit::FanInUniform.initialize_weights((4, 3), &mut StdRng::seed_from_u64(1));
        let b = WeightInit::FanInUniform.initialize_weights((4, 3), &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
