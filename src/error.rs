//! Errors raised by the gesture core. Everything above the core uses anyhow.

use thiserror::Error;

/// A landmark set the classifier refuses to look at.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    #[error("hand observation has {0} landmarks, expected 21")]
    LandmarkCount(usize),
    #[error("landmark {index} has a non-finite coordinate ({x}, {y})")]
    NonFinite { index: usize, x: f32, y: f32 },
}

/// Rejected runtime configuration; the previous value stays in effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value}")]
    NonPositiveThreshold { name: &'static str, value: f64 },
    #[error("unknown gesture '{0}' (expected open-palm or peace-sign)")]
    UnknownGesture(String),
}
