//! Error types for the nuviz source/sink abstraction.

use thiserror::Error;

/// Errors raised by scene sources and packet sinks.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No scene with this name exists in the catalog
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    /// No sample (or ego pose) recorded at the requested time
    #[error("No sample at t={0:.6}s")]
    SampleNotFound(f64),

    /// Sensor has no calibration in this scene
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    /// Filesystem failure in a sink or loader
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed recorded-scene or index file
    #[error("Parse error: {0}")]
    Parse(String),
}

impl EnvError {
    /// Creates a sensor-not-found error.
    pub fn sensor(name: impl Into<String>) -> Self {
        Self::SensorNotFound(name.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Self::Parse(msg.to_string())
    }
}
