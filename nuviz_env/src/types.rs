//! Raw scene data as handed over by a loader.
//!
//! Everything here is plain data in the dataset's conventions: positions in
//! meters, quaternions in `[w, x, y, z]` order, timestamps in seconds.
//! Validation (e.g. quaternion norm) happens in the converter, not here.

use serde::{Deserialize, Serialize};

/// Identity rotation in `[w, x, y, z]` order.
pub const IDENTITY_ROTATION: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

/// A rigid-body pose in some frame, stamped with a capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position [x, y, z] in meters
    pub translation: [f64; 3],

    /// Orientation quaternion [w, x, y, z]
    pub rotation: [f64; 4],

    /// Capture time in seconds
    pub timestamp: f64,
}

impl Pose {
    /// Creates a pose from translation, `[w, x, y, z]` rotation and timestamp.
    pub fn new(translation: [f64; 3], rotation: [f64; 4], timestamp: f64) -> Self {
        Self {
            translation,
            rotation,
            timestamp,
        }
    }

    /// Creates an unrotated pose at the given position.
    pub fn at(translation: [f64; 3], timestamp: f64) -> Self {
        Self::new(translation, IDENTITY_ROTATION, timestamp)
    }

    /// Creates a pose rotated by `yaw` radians about +z.
    pub fn with_yaw(translation: [f64; 3], yaw: f64, timestamp: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(translation, [half.cos(), 0.0, 0.0, half.sin()], timestamp)
    }
}

/// Fixed extrinsic calibration of a sensor: sensor frame -> vehicle frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Sensor channel name, e.g. `LIDAR_TOP`
    pub sensor: String,

    /// Sensor origin in the vehicle frame [x, y, z]
    pub translation: [f64; 3],

    /// Sensor orientation in the vehicle frame [w, x, y, z]
    pub rotation: [f64; 4],

    /// Pinhole intrinsics for cameras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_intrinsic: Option<[[f64; 3]; 3]>,
}

impl Calibration {
    /// Creates a calibration without intrinsics.
    pub fn new(sensor: impl Into<String>, translation: [f64; 3], rotation: [f64; 4]) -> Self {
        Self {
            sensor: sensor.into(),
            translation,
            rotation,
            camera_intrinsic: None,
        }
    }
}

/// One return of a lidar or radar sweep, in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Position [x, y, z] in meters
    pub position: [f32; 3],

    /// Return intensity (lidar, 0-255)
    #[serde(default)]
    pub intensity: f32,

    /// Ego-motion compensated velocity [vx, vy] in m/s (radar)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f32; 2]>,

    /// Radar cross section in m^2 (radar)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcs: Option<f32>,
}

impl RawPoint {
    /// A lidar return.
    pub fn lidar(position: [f32; 3], intensity: f32) -> Self {
        Self {
            position,
            intensity,
            velocity: None,
            rcs: None,
        }
    }

    /// A radar return.
    pub fn radar(position: [f32; 3], velocity: [f32; 2], rcs: f32) -> Self {
        Self {
            position,
            intensity: 0.0,
            velocity: Some(velocity),
            rcs: Some(rcs),
        }
    }
}

/// A decoded point cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<RawPoint>,
}

impl PointCloud {
    /// Wraps a list of points.
    pub fn new(points: Vec<RawPoint>) -> Self {
        Self { points }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the sweep has no returns.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Camera frame contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageData {
    /// Decoded 8-bit RGB pixels, row-major, `width * height * 3` bytes
    Raw { width: u32, height: u32, rgb: Vec<u8> },

    /// An encoded file (JPEG, PNG, ...) still to be decoded
    Encoded(Vec<u8>),
}

/// Payload of a sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorData {
    Points(PointCloud),
    Image(ImageData),
}

/// One capture of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Sensor channel name
    pub sensor: String,

    /// Capture time in seconds
    pub timestamp: f64,

    /// Measured data in the sensor frame
    pub data: SensorData,
}

/// Whether an annotated object is observable in its sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    /// Annotated but flagged absent in this sample
    Absent,
}

/// A 3D box annotation of one object instance at one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation token, unique per (object, sample)
    pub token: String,

    /// Stable identity of the object across samples
    pub object_id: String,

    /// Dataset category, e.g. `vehicle.car`
    pub category: String,

    /// Box center in the global frame [x, y, z]
    pub translation: [f64; 3],

    /// Box extent [width, length, height] in meters
    pub size: [f64; 3],

    /// Box orientation in the global frame [w, x, y, z]
    pub rotation: [f64; 4],

    /// Annotated planar velocity [vx, vy] in the global frame, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 2]>,

    #[serde(default)]
    pub visibility: Visibility,

    /// Sample time in seconds
    pub timestamp: f64,
}

impl Annotation {
    /// The annotation's global pose.
    pub fn pose(&self) -> Pose {
        Pose::new(self.translation, self.rotation, self.timestamp)
    }

    /// True unless the object is flagged absent.
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }
}

/// A keyframe of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Sample token
    pub token: String,

    /// Keyframe time in seconds
    pub timestamp: f64,
}

impl SampleInfo {
    pub fn new(token: impl Into<String>, timestamp: f64) -> Self {
        Self {
            token: token.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaw_pose_is_unit_quaternion() {
        let pose = Pose::with_yaw([1.0, 2.0, 0.0], 1.2, 0.0);
        let norm: f64 = pose.rotation.iter().map(|c| c * c).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_annotation_visibility_defaults_to_visible() {
        let json = r#"{
            "token": "a0", "object_id": "obj", "category": "vehicle.car",
            "translation": [0, 0, 0], "size": [1.8, 4.5, 1.5],
            "rotation": [1, 0, 0, 0], "timestamp": 0.5
        }"#;
        let ann: Annotation = serde_json::from_str(json).unwrap();
        assert!(ann.is_visible());
        assert!(ann.velocity.is_none());
    }

    #[test]
    fn test_absent_visibility_roundtrips_as_snake_case() {
        let json = serde_json::to_string(&Visibility::Absent).unwrap();
        assert_eq!(json, "\"absent\"");
    }
}
