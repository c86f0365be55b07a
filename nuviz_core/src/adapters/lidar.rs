//! Lidar sweep -> vehicle-frame point set.

use super::{point_cloud, SampleContext, SceneContext, StreamAdapter};
use crate::assembler::FrameBuilder;
use crate::error::ConvertError;
use crate::protocol::{PointAttribute, PointSet, Primitive, PrimitiveType, StreamMetadata, StreamStyle};
use crate::transform::SensorExtrinsic;
use nuviz_env::PointCloud;

/// Stream carrying the top lidar's sweep.
pub const LIDAR_STREAM: &str = "/lidar/points";

/// Grey-blue ramp over return intensity (0-255).
pub fn intensity_color(intensity: f32) -> [u8; 4] {
    let i = intensity.clamp(0.0, 255.0) / 255.0;
    let rg = (80.0 + i * 80.0) as u8;
    [rg, rg, (80.0 + i * 60.0) as u8, 255]
}

/// Converts the lidar channel's sweep into one point set per sample.
///
/// Points are already local to the vehicle at capture time, so only the
/// sensor extrinsic applies; the ego pose is not re-applied.
#[derive(Debug)]
pub struct LidarAdapter {
    channel: String,
    extrinsic: Option<SensorExtrinsic>,
}

impl LidarAdapter {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            extrinsic: None,
        }
    }

    /// Builds an adapter with a known extrinsic, skipping `load`.
    pub fn with_extrinsic(channel: &str, extrinsic: SensorExtrinsic) -> Self {
        Self {
            channel: channel.to_string(),
            extrinsic: Some(extrinsic),
        }
    }

    /// Moves every point into the vehicle frame and colours it.
    pub fn convert_cloud(&self, cloud: &PointCloud) -> Result<PointSet, ConvertError> {
        let extrinsic = self
            .extrinsic
            .as_ref()
            .ok_or_else(|| ConvertError::scene(format!("{} used before load", self.channel)))?;

        let mut points = Vec::with_capacity(cloud.len() * 3);
        let mut colors = Vec::with_capacity(cloud.len() * 4);
        let mut intensity = Vec::with_capacity(cloud.len());

        for p in &cloud.points {
            points.extend_from_slice(&extrinsic.transform_point(p.position));
            colors.extend_from_slice(&intensity_color(p.intensity));
            intensity.push(p.intensity);
        }

        Ok(PointSet {
            points,
            colors: Some(colors),
            attributes: vec![PointAttribute {
                name: "intensity".to_string(),
                stride: 1,
                values: intensity,
            }],
        })
    }
}

impl StreamAdapter for LidarAdapter {
    fn name(&self) -> &str {
        &self.channel
    }

    fn load(&mut self, scene: &SceneContext<'_>) -> Result<(), ConvertError> {
        let calibration = scene.source.calibration(&self.channel)?;
        self.extrinsic = Some(SensorExtrinsic::from_calibration(&calibration)?);
        Ok(())
    }

    fn get_metadata(&self) -> Vec<StreamMetadata> {
        vec![
            StreamMetadata::new(LIDAR_STREAM, PrimitiveType::Point).with_style(StreamStyle {
                fill_color: Some([40, 0, 170, 255]),
                radius_pixels: Some(1.0),
                ..StreamStyle::default()
            }),
        ]
    }

    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError> {
        let reading = sample.require_reading(&self.channel)?;
        let set = self.convert_cloud(point_cloud(&reading)?)?;
        frame.push(LIDAR_STREAM, Primitive::Points(set))
    }
}
