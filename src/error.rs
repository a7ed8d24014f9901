use std::fmt;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, MaddpgError>;

/// Main error type for the training engine
#[derive(Debug, Clone)]
pub enum MaddpgError {
    /// Invalid configuration (unknown algorithm, bad value, incompatible options)
    Config(String),

    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Sampling more joint transitions than the buffer holds
    InsufficientSamples {
        requested: usize,
        available: usize,
    },

    /// An environment worker failed
    Environment(String),

    /// Training error
    TrainingError(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Numerical computation errors
    NumericalError(String),
}

impl fmt::Display for MaddpgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaddpgError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MaddpgError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            MaddpgError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            MaddpgError::InsufficientSamples { requested, available } => {
                write!(
                    f,
                    "Insufficient samples: requested {} but buffer holds {}",
                    requested, available
                )
            }
            MaddpgError::Environment(msg) => write!(f, "Environment error: {}", msg),
            MaddpgError::TrainingError(msg) => write!(f, "Training error: {}", msg),
            MaddpgError::IoError(msg) => write!(f, "IO error: {}", msg),
            MaddpgError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            MaddpgError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for MaddpgError {}

impl From<std::io::Error> for MaddpgError {
    fn from(err: std::io::Error) -> Self {
        MaddpgError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for MaddpgError {
    fn from(err: bincode::Error) -> Self {
        MaddpgError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for MaddpgError {
    fn from(err: serde_json::Error) -> Self {
        MaddpgError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl MaddpgError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        MaddpgError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        MaddpgError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        MaddpgError::Config(msg.into())
    }
}
