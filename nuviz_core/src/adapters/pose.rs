//! Ego vehicle path -> `/vehicle/trajectory` polyline.

use super::{SampleContext, SceneContext, StreamAdapter};
use crate::assembler::FrameBuilder;
use crate::error::ConvertError;
use crate::protocol::{Polyline, Primitive, PrimitiveType, StreamMetadata, StreamStyle};
use crate::transform::point_to_vehicle_frame;
use nalgebra::Point3;

pub const VEHICLE_TRAJECTORY_STREAM: &str = "/vehicle/trajectory";

/// Draws where the ego is headed: its recorded positions over the next
/// `lookahead` samples (current included), in the current vehicle frame.
#[derive(Debug)]
pub struct PoseAdapter {
    lookahead: usize,
}

impl PoseAdapter {
    pub fn new(lookahead: usize) -> Self {
        Self { lookahead }
    }
}

impl StreamAdapter for PoseAdapter {
    fn name(&self) -> &str {
        "vehicle"
    }

    fn load(&mut self, _scene: &SceneContext<'_>) -> Result<(), ConvertError> {
        Ok(())
    }

    fn get_metadata(&self) -> Vec<StreamMetadata> {
        vec![
            StreamMetadata::new(VEHICLE_TRAJECTORY_STREAM, PrimitiveType::Polyline).with_style(
                StreamStyle {
                    stroke_color: Some([87, 173, 87, 170]),
                    stroke_width: Some(1.4),
                    ..StreamStyle::default()
                },
            ),
        ]
    }

    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError> {
        let end = (sample.index + self.lookahead).min(sample.samples.len());
        let upcoming = sample.samples.get(sample.index..end).unwrap_or_default();

        let mut vertices = Vec::with_capacity(upcoming.len());
        for info in upcoming {
            let global = sample.source.ego_pose(info.timestamp)?;
            let [x, y, z] = global.translation;
            let p = point_to_vehicle_frame(&Point3::new(x, y, z), sample.ego);
            vertices.push([p.x as f32, p.y as f32, p.z as f32]);
        }

        if vertices.len() < 2 {
            return Ok(());
        }
        frame.push(
            VEHICLE_TRAJECTORY_STREAM,
            Primitive::Polyline(Polyline {
                vertices,
                id: None,
                classes: Vec::new(),
            }),
        )
    }
}
