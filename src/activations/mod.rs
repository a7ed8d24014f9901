//! # Activation Functions Module
//!
//! Activations used by the actor and critic networks.
//!
//! - **ReLU**: `max(0, x)` for hidden layers
//! - **Tanh**: bounded output in `[-1, 1]` for continuous actors
//! - **Linear**: identity, used for critic values and discrete logits

pub mod functions;

pub use functions::Activation;
