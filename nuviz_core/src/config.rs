//! Converter configuration, read once before a scene.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Lidar channel of a nuScenes rig.
pub const LIDAR_CHANNEL: &str = "LIDAR_TOP";

/// The five nuScenes radars.
pub const RADAR_CHANNELS: [&str; 5] = [
    "RADAR_FRONT",
    "RADAR_FRONT_LEFT",
    "RADAR_FRONT_RIGHT",
    "RADAR_BACK_LEFT",
    "RADAR_BACK_RIGHT",
];

/// The six nuScenes cameras.
pub const CAMERA_CHANNELS: [&str; 6] = [
    "CAM_FRONT",
    "CAM_FRONT_LEFT",
    "CAM_FRONT_RIGHT",
    "CAM_BACK",
    "CAM_BACK_LEFT",
    "CAM_BACK_RIGHT",
];

/// Configuration for a `SceneConverter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Maximum number of samples converted per scene (None = all)
    pub max_samples: Option<usize>,

    /// Camera frames are downscaled to fit within this width (0 = unbounded)
    pub image_max_width: u32,

    /// Camera frames are downscaled to fit within this height (0 = unbounded)
    pub image_max_height: u32,

    /// JPEG quality for re-encoded camera frames (1-100)
    pub jpeg_quality: u8,

    /// Look-back window for object history in seconds (default: 3.0)
    pub history_window: f64,

    /// Look-ahead window for object prediction in seconds (default: 3.0)
    pub future_window: f64,

    /// Number of predicted poses within the look-ahead window (default: 6)
    pub future_steps: usize,

    /// Objects slower than this (m/s) get no prediction (default: 0.1)
    pub min_prediction_speed: f64,

    /// Number of samples in the ego trajectory polyline, current included
    pub ego_trajectory_lookahead: usize,

    pub lidar_channel: String,
    pub radar_channels: Vec<String>,
    pub camera_channels: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            max_samples: None,
            image_max_width: 400,
            image_max_height: 300,
            jpeg_quality: 85,
            history_window: 3.0,
            future_window: 3.0,
            future_steps: 6,
            min_prediction_speed: 0.1,
            ego_trajectory_lookahead: 6,
            lidar_channel: LIDAR_CHANNEL.to_string(),
            radar_channels: RADAR_CHANNELS.iter().map(|s| s.to_string()).collect(),
            camera_channels: CAMERA_CHANNELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ConverterConfig {
    /// Loads a JSON override file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let file = File::open(path.as_ref())
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ConvertError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the converter cannot honor.
    pub fn validate(&self) -> Result<(), ConvertError> {
        let windows = [self.history_window, self.future_window];
        if windows.iter().any(|w| w.is_nan() || *w < 0.0) {
            return Err(ConvertError::Config(
                "history_window and future_window must be non-negative".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConvertError::Config(format!(
                "jpeg_quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.max_samples == Some(0) {
            return Err(ConvertError::Config("max_samples must be positive".to_string()));
        }
        Ok(())
    }

    /// Sets the per-scene sample cap.
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    /// Sets the camera frame bounds.
    pub fn with_image_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.image_max_width = max_width;
        self.image_max_height = max_height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_full_rig() {
        let config = ConverterConfig::default();
        assert_eq!(config.radar_channels.len(), 5);
        assert_eq!(config.camera_channels.len(), 6);
        assert_eq!(config.future_steps, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ConverterConfig =
            serde_json::from_str(r#"{ "max_samples": 20, "image_max_width": 640 }"#).unwrap();
        assert_eq!(config.max_samples, Some(20));
        assert_eq!(config.image_max_width, 640);
        assert_eq!(config.image_max_height, 300);
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let mut config = ConverterConfig::default();
        config.jpeg_quality = 0;
        assert!(matches!(config.validate(), Err(ConvertError::Config(_))));
    }
}
