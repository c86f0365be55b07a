//! Radar returns -> vehicle-frame point sets with velocity and RCS attributes.

use super::{point_cloud, sensor_stream, SampleContext, SceneContext, StreamAdapter};
use crate::assembler::FrameBuilder;
use crate::error::ConvertError;
use crate::protocol::{
    PointAttribute, PointSet, Primitive, PrimitiveType, SensorPose, StreamMetadata, StreamStyle,
};
use crate::transform::SensorExtrinsic;
use nuviz_env::PointCloud;

/// Speed mapped to full red (m/s).
const SPEED_SCALE: f32 = 30.0;

/// RCS range mapped to the colour ramp, in dB.
const RCS_DB_MIN: f32 = -10.0;
const RCS_DB_SPAN: f32 = 30.0;

/// Colours a return by compensated speed (blue = static, red = moving) and
/// RCS (brighter, more opaque = stronger reflector).
pub fn radar_color(speed: f32, rcs: f32) -> [u8; 4] {
    let v = (speed / SPEED_SCALE).clamp(0.0, 1.0);
    let rcs_db = 10.0 * rcs.max(1e-10).log10();
    let r = ((rcs_db - RCS_DB_MIN) / RCS_DB_SPAN).clamp(0.0, 1.0);
    [
        (50.0 + v * 205.0) as u8,
        (50.0 + r * 100.0) as u8,
        (50.0 + (1.0 - v) * 205.0) as u8,
        (100.0 + r * 155.0) as u8,
    ]
}

/// Converts one radar channel into a point set per sample.
///
/// Velocities are rotated by the sensor extrinsic (no translation) so they
/// share the vehicle frame with positions.
#[derive(Debug)]
pub struct RadarAdapter {
    channel: String,
    stream: String,
    extrinsic: Option<SensorExtrinsic>,
}

impl RadarAdapter {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            stream: sensor_stream("radar", channel),
            extrinsic: None,
        }
    }

    pub fn with_extrinsic(channel: &str, extrinsic: SensorExtrinsic) -> Self {
        Self {
            extrinsic: Some(extrinsic),
            ..Self::new(channel)
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn convert_cloud(&self, cloud: &PointCloud) -> Result<PointSet, ConvertError> {
        let extrinsic = self
            .extrinsic
            .as_ref()
            .ok_or_else(|| ConvertError::scene(format!("{} used before load", self.channel)))?;

        let n = cloud.len();
        let mut points = Vec::with_capacity(n * 3);
        let mut colors = Vec::with_capacity(n * 4);
        let mut velocity = Vec::with_capacity(n * 3);
        let mut rcs = Vec::with_capacity(n);

        for p in &cloud.points {
            let [vx, vy] = p.velocity.unwrap_or([0.0, 0.0]);
            let p_rcs = p.rcs.unwrap_or(0.0);

            points.extend_from_slice(&extrinsic.transform_point(p.position));
            velocity.extend_from_slice(&extrinsic.rotate_vector([vx, vy, 0.0]));
            colors.extend_from_slice(&radar_color(vx.hypot(vy), p_rcs));
            rcs.push(p_rcs);
        }

        Ok(PointSet {
            points,
            colors: Some(colors),
            attributes: vec![
                PointAttribute {
                    name: "velocity".to_string(),
                    stride: 3,
                    values: velocity,
                },
                PointAttribute {
                    name: "rcs".to_string(),
                    stride: 1,
                    values: rcs,
                },
            ],
        })
    }
}

impl StreamAdapter for RadarAdapter {
    fn name(&self) -> &str {
        &self.channel
    }

    fn load(&mut self, scene: &SceneContext<'_>) -> Result<(), ConvertError> {
        let calibration = scene.source.calibration(&self.channel)?;
        self.extrinsic = Some(SensorExtrinsic::from_calibration(&calibration)?);
        Ok(())
    }

    fn get_metadata(&self) -> Vec<StreamMetadata> {
        let mut meta = StreamMetadata::new(self.stream.clone(), PrimitiveType::Point).with_style(
            StreamStyle {
                radius_pixels: Some(3.0),
                ..StreamStyle::default()
            },
        );
        if let Some(extrinsic) = &self.extrinsic {
            let pose = extrinsic.pose();
            meta = meta.with_sensor_pose(SensorPose {
                translation: pose.translation,
                rotation: pose.rotation,
            });
        }
        vec![meta]
    }

    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError> {
        let reading = sample.require_reading(&self.channel)?;
        let set = self.convert_cloud(point_cloud(&reading)?)?;
        frame.push(&self.stream, Primitive::Points(set))
    }
}
