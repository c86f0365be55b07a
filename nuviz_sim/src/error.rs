//! Harness error type.

use nuviz_core::ConvertError;
use nuviz_env::EnvError;
use thiserror::Error;

/// Errors raised while generating or converting synthetic scenes.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Env(#[from] EnvError),

    /// Run report could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad scenario parameters (zero samples, non-positive noise, ...)
    #[error("Invalid scenario: {0}")]
    Scenario(String),
}
