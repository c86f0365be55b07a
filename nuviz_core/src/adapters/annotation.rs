//! Annotated objects -> boxes, history trails and predicted paths.
//!
//! Four independent streams so a viewer can toggle each layer:
//!
//! | stream                      | primitive | source                 |
//! |-----------------------------|-----------|------------------------|
//! | `/object/boxes`             | polygon   | current annotations    |
//! | `/object/trajectory`        | polyline  | history window         |
//! | `/object/future_boxes`      | polygon   | one per predicted pose |
//! | `/object/future_trajectory` | polyline  | predicted poses        |

use super::{SampleContext, SceneContext, StreamAdapter};
use crate::assembler::FrameBuilder;
use crate::category::{trajectory_style_classes, ObjectClass};
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::history::{AnnotationIndex, TrajectorySample};
use crate::protocol::{Polygon, Polyline, Primitive, PrimitiveType, StreamMetadata, StreamStyle};
use crate::transform::{pose_to_isometry, to_vehicle_frame};
use nalgebra::Point3;
use nuviz_env::{Annotation, Pose};
use tracing::warn;

pub const OBJECT_BOXES_STREAM: &str = "/object/boxes";
pub const OBJECT_TRAJECTORY_STREAM: &str = "/object/trajectory";
pub const OBJECT_FUTURE_BOXES_STREAM: &str = "/object/future_boxes";
pub const OBJECT_FUTURE_TRAJECTORY_STREAM: &str = "/object/future_trajectory";

/// Corner signs along (length, width, height) in the box frame.
///
/// Front face (+x) first, then the rear face, both in the same winding.
const CORNER_SIGNS: [[f64; 3]; 8] = [
    [1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
];

/// The 8 corners of an oriented box.
///
/// # Arguments
/// * `pose` - Box center and orientation
/// * `size` - Extent `[width, length, height]`; length runs along the pose's +x
pub fn box_corners(pose: &Pose, size: &[f64; 3]) -> Result<Vec<[f32; 3]>, ConvertError> {
    let iso = pose_to_isometry(pose)?;
    let [width, length, height] = *size;
    let half = [length / 2.0, width / 2.0, height / 2.0];

    Ok(CORNER_SIGNS
        .iter()
        .map(|s| {
            let local = Point3::new(s[0] * half[0], s[1] * half[1], s[2] * half[2]);
            let p = iso.transform_point(&local);
            [p.x as f32, p.y as f32, p.z as f32]
        })
        .collect())
}

fn positions(samples: &[TrajectorySample]) -> Vec<[f32; 3]> {
    samples
        .iter()
        .map(|s| {
            let t = s.pose.translation;
            [t[0] as f32, t[1] as f32, t[2] as f32]
        })
        .collect()
}

/// Everything drawn for one object at one sample.
#[derive(Debug, Default)]
struct ObjectLayers {
    boxes: Vec<Polygon>,
    trajectory: Option<Polyline>,
    future_boxes: Vec<Polygon>,
    future_trajectory: Option<Polyline>,
}

/// Emits the four object streams from the scene's annotation index.
#[derive(Debug)]
pub struct AnnotationAdapter {
    index: AnnotationIndex,
    history_window: f64,
    future_window: f64,
    future_steps: usize,
    min_speed: f64,
}

impl AnnotationAdapter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            index: AnnotationIndex::new(),
            history_window: config.history_window,
            future_window: config.future_window,
            future_steps: config.future_steps,
            min_speed: config.min_prediction_speed,
        }
    }

    /// Replaces the index, skipping `load`.
    pub fn with_index(mut self, index: AnnotationIndex) -> Self {
        self.index = index
            .with_min_speed(self.min_speed)
            .with_look_back(self.history_window);
        self
    }

    fn convert_object(
        &self,
        annotation: &Annotation,
        sample: &SampleContext<'_>,
    ) -> Result<ObjectLayers, ConvertError> {
        let t_now = sample.timestamp();
        let id = Some(annotation.object_id.clone());
        let classes: Vec<String> = ObjectClass::from_category(&annotation.category)
            .map(|c| vec![c.name().to_string()])
            .unwrap_or_default();

        let mut layers = ObjectLayers::default();

        let local = to_vehicle_frame(&annotation.pose(), sample.ego)?;
        layers.boxes.push(Polygon {
            vertices: box_corners(&local, &annotation.size)?,
            id: id.clone(),
            classes: classes.clone(),
        });

        let history = self
            .index
            .history(&annotation.object_id, t_now, self.history_window, sample.ego)?;
        if history.len() >= 2 {
            layers.trajectory = Some(Polyline {
                vertices: positions(&history),
                id: id.clone(),
                classes: classes.clone(),
            });
        }

        let future = self.index.future(
            &annotation.object_id,
            t_now,
            self.future_window,
            self.future_steps,
            sample.ego,
        )?;
        for predicted in &future {
            layers.future_boxes.push(Polygon {
                vertices: box_corners(&predicted.pose, &annotation.size)?,
                id: id.clone(),
                classes: classes.clone(),
            });
        }
        if future.len() >= 2 {
            layers.future_trajectory = Some(Polyline {
                vertices: positions(&future),
                id,
                classes,
            });
        }

        Ok(layers)
    }
}

impl StreamAdapter for AnnotationAdapter {
    fn name(&self) -> &str {
        "annotations"
    }

    fn load(&mut self, scene: &SceneContext<'_>) -> Result<(), ConvertError> {
        self.index = AnnotationIndex::build(scene.source, scene.samples)?
            .with_min_speed(self.min_speed)
            .with_look_back(self.history_window);
        Ok(())
    }

    fn get_metadata(&self) -> Vec<StreamMetadata> {
        vec![
            StreamMetadata::new(OBJECT_BOXES_STREAM, PrimitiveType::Polygon)
                .with_style(StreamStyle {
                    extruded: Some(true),
                    fill_color: Some([0, 0, 0, 128]),
                    ..StreamStyle::default()
                })
                .with_style_classes(ObjectClass::style_classes()),
            StreamMetadata::new(OBJECT_TRAJECTORY_STREAM, PrimitiveType::Polyline)
                .with_style(StreamStyle {
                    stroke_width: Some(1.0),
                    ..StreamStyle::default()
                })
                .with_style_classes(trajectory_style_classes()),
            StreamMetadata::new(OBJECT_FUTURE_BOXES_STREAM, PrimitiveType::Polygon)
                .with_style(StreamStyle {
                    extruded: Some(false),
                    fill_color: Some([0, 0, 0, 48]),
                    ..StreamStyle::default()
                })
                .with_style_classes(ObjectClass::style_classes()),
            StreamMetadata::new(OBJECT_FUTURE_TRAJECTORY_STREAM, PrimitiveType::Polyline)
                .with_style(StreamStyle {
                    stroke_width: Some(0.5),
                    ..StreamStyle::default()
                })
                .with_style_classes(trajectory_style_classes()),
        ]
    }

    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError> {
        let annotations = sample.source.annotations(sample.timestamp())?;

        for annotation in annotations.iter().filter(|a| a.is_visible()) {
            // A malformed object is dropped alone; the rest of the sample survives.
            let layers = match self.convert_object(annotation, sample) {
                Ok(layers) => layers,
                Err(e) => {
                    warn!(
                        "Object {} at t={:.3}s skipped: {}",
                        annotation.object_id,
                        sample.timestamp(),
                        e
                    );
                    frame.skip(
                        OBJECT_BOXES_STREAM,
                        format!("object {}: {}", annotation.object_id, e),
                    );
                    continue;
                }
            };

            for polygon in layers.boxes {
                frame.push(OBJECT_BOXES_STREAM, Primitive::Polygon(polygon))?;
            }
            if let Some(line) = layers.trajectory {
                frame.push(OBJECT_TRAJECTORY_STREAM, Primitive::Polyline(line))?;
            }
            for polygon in layers.future_boxes {
                frame.push(OBJECT_FUTURE_BOXES_STREAM, Primitive::Polygon(polygon))?;
            }
            if let Some(line) = layers.future_trajectory {
                frame.push(OBJECT_FUTURE_TRAJECTORY_STREAM, Primitive::Polyline(line))?;
            }
        }
        Ok(())
    }
}
