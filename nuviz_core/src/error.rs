//! Conversion error taxonomy.

use nuviz_env::EnvError;
use thiserror::Error;

/// Errors raised while converting a scene.
///
/// Lacking history for an object is not an error: history and future
/// queries return an empty `Vec` instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Orientation is not a unit quaternion
    #[error("Invalid pose: quaternion norm {norm:.6} is not 1")]
    InvalidPose { norm: f64 },

    /// A sensor produced no reading for a sample
    #[error("Missing sensor data: {sensor} at t={timestamp:.6}s")]
    MissingSensorData { sensor: String, timestamp: f64 },

    /// A frame referenced a stream that metadata never declared
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// Frames must be packed in timestamp order
    #[error("Frame at t={current:.6}s packed after t={previous:.6}s")]
    OutOfOrder { previous: f64, current: f64 },

    /// Metadata may only be written once, before any frame
    #[error("Metadata already written")]
    MetadataAlreadyWritten,

    /// A frame arrived before metadata
    #[error("Frame packed before metadata")]
    MetadataMissing,

    /// Scene-level failure (unresolvable scene, empty sample list, ...)
    #[error("Scene error: {0}")]
    Scene(String),

    /// Sensor reading has the wrong payload for its adapter
    #[error("Unexpected data from {sensor}: expected {expected}")]
    UnexpectedData { sensor: String, expected: &'static str },

    /// Packet encoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Packet decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(String),
}

impl ConvertError {
    /// Creates a missing-sensor-data error.
    pub fn missing(sensor: impl Into<String>, timestamp: f64) -> Self {
        Self::MissingSensorData {
            sensor: sensor.into(),
            timestamp,
        }
    }

    /// Creates a scene-level error.
    pub fn scene(msg: impl std::fmt::Display) -> Self {
        Self::Scene(msg.to_string())
    }
}
