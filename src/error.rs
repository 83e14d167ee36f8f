//! Error types for the ballistics system.

/// Reasons a bullet could not be spawned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpawnError {
    #[error("bullet registry is full ({capacity} slots)")]
    CapacityExhausted { capacity: usize },
    #[error("invalid bullet template: {0}")]
    InvalidTemplate(String),
    #[error("spawn position is not finite: {0:?}")]
    NonFinitePosition(bevy::math::Vec3),
}

/// Failure reported by a user-supplied impact handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("impact handler failed: {0}")]
    Failed(String),
    #[error("impact handler panicked: {0}")]
    Panicked(String),
}

/// Failure reported by a raycast backend for a single query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RaycastError {
    #[error("raycast backend failure: {0}")]
    Backend(String),
}

/// Zeroing solver failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ZeroingError {
    #[error("invalid zeroing input: {0}")]
    InvalidInput(String),
    #[error("target at {distance} m is out of reach")]
    Unreachable { distance: f32 },
    #[error("zeroing at {distance} m did not converge (residual {residual} m)")]
    DidNotConverge { distance: f32, residual: f32 },
    #[error("zeroing task was cancelled")]
    Cancelled,
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
