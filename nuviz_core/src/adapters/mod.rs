//! Stream adapters: one per sensor channel plus the annotation and pose layers.
//!
//! Every adapter implements the same three operations, and the assembler
//! drives a registered list of them:
//!
//! ```text
//!   load(scene)              once, before the first frame
//!   get_metadata()           once, into the metadata packet
//!   convert_message(sample)  once per sample, into that sample's frame
//! ```

mod annotation;
mod camera;
mod lidar;
mod pose;
mod radar;

pub use annotation::{
    box_corners, AnnotationAdapter, OBJECT_BOXES_STREAM, OBJECT_FUTURE_BOXES_STREAM,
    OBJECT_FUTURE_TRAJECTORY_STREAM, OBJECT_TRAJECTORY_STREAM,
};
pub use camera::{fit_within, CameraAdapter};
pub use lidar::{intensity_color, LidarAdapter, LIDAR_STREAM};
pub use pose::{PoseAdapter, VEHICLE_TRAJECTORY_STREAM};
pub use radar::{radar_color, RadarAdapter};

use crate::assembler::FrameBuilder;
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::protocol::StreamMetadata;
use crate::transform::EgoState;
use nuviz_env::{PointCloud, SampleInfo, SceneSource, SensorData, SensorReading};

/// Scene-wide inputs available while adapters load.
pub struct SceneContext<'a> {
    pub source: &'a dyn SceneSource,

    /// Samples that will be converted, already capped
    pub samples: &'a [SampleInfo],

    pub config: &'a ConverterConfig,
}

/// Per-sample inputs handed to `convert_message`.
pub struct SampleContext<'a> {
    pub source: &'a dyn SceneSource,
    pub sample: &'a SampleInfo,

    /// Position of `sample` within `samples`
    pub index: usize,
    pub samples: &'a [SampleInfo],

    /// Ego state at the sample's timestamp
    pub ego: &'a EgoState,
}

impl SampleContext<'_> {
    pub fn timestamp(&self) -> f64 {
        self.sample.timestamp
    }

    /// Fetches a reading, turning an absent one into `MissingSensorData`.
    pub fn require_reading(&self, sensor: &str) -> Result<SensorReading, ConvertError> {
        self.source
            .sensor_reading(sensor, self.timestamp())?
            .ok_or_else(|| ConvertError::missing(sensor, self.timestamp()))
    }
}

/// A producer of one or more streams.
///
/// # Implementations
///
/// - `LidarAdapter`, `RadarAdapter`: point sets in the vehicle frame
/// - `CameraAdapter`: downscaled JPEG images
/// - `AnnotationAdapter`: boxes, history and predicted trajectories
/// - `PoseAdapter`: the ego's upcoming path
pub trait StreamAdapter: Send {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Prepares scene-level state (calibration lookup, annotation index).
    fn load(&mut self, scene: &SceneContext<'_>) -> Result<(), ConvertError>;

    /// Declares every stream this adapter may emit.
    fn get_metadata(&self) -> Vec<StreamMetadata>;

    /// Converts one sample into primitives on `frame`.
    ///
    /// Any error omits all of this adapter's streams from the sample.
    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError>;
}

/// Stream name for a sensor channel: `/<kind>/<channel lowercase>`.
pub fn sensor_stream(kind: &str, channel: &str) -> String {
    format!("/{}/{}", kind, channel.to_lowercase())
}

/// Borrows the point cloud of a reading.
pub(crate) fn point_cloud(reading: &SensorReading) -> Result<&PointCloud, ConvertError> {
    match &reading.data {
        SensorData::Points(cloud) => Ok(cloud),
        SensorData::Image(_) => Err(ConvertError::UnexpectedData {
            sensor: reading.sensor.clone(),
            expected: "point cloud",
        }),
    }
}

/// The full adapter set for a nuScenes rig, in frame order.
pub fn default_adapters(config: &ConverterConfig) -> Vec<Box<dyn StreamAdapter>> {
    let mut adapters: Vec<Box<dyn StreamAdapter>> = Vec::new();
    adapters.push(Box::new(PoseAdapter::new(config.ego_trajectory_lookahead)));
    adapters.push(Box::new(LidarAdapter::new(&config.lidar_channel)));
    for channel in &config.radar_channels {
        adapters.push(Box::new(RadarAdapter::new(channel)));
    }
    for channel in &config.camera_channels {
        adapters.push(Box::new(CameraAdapter::new(channel, config)));
    }
    adapters.push(Box::new(AnnotationAdapter::new(config)));
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_stream_naming() {
        assert_eq!(sensor_stream("radar", "RADAR_FRONT_LEFT"), "/radar/radar_front_left");
        assert_eq!(sensor_stream("camera", "CAM_BACK"), "/camera/cam_back");
    }

    #[test]
    fn test_default_adapters_declare_unique_streams() {
        let config = ConverterConfig::default();
        let adapters = default_adapters(&config);
        assert_eq!(adapters.len(), 1 + 1 + 5 + 6 + 1);

        let mut names: Vec<String> = adapters
            .iter()
            .flat_map(|a| a.get_metadata())
            .map(|m| m.name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"/camera/cam_front".to_string()));
        assert!(names.contains(&"/object/future_trajectory".to_string()));
    }
}
