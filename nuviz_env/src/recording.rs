//! In-memory recorded scenes and a JSON-backed catalog.

use crate::error::EnvError;
use crate::source::{SceneCatalog, SceneSource};
use crate::types::{Annotation, Calibration, Pose, SampleInfo, SensorReading};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Two timestamps closer than this (seconds) address the same sample.
pub const TIME_EPSILON: f64 = 1e-6;

/// Everything recorded at one keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub token: String,

    /// Keyframe time in seconds
    pub timestamp: f64,

    /// Ego pose in the global frame
    pub ego_pose: Pose,

    #[serde(default)]
    pub readings: Vec<SensorReading>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A fully materialized scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedScene {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Keyframes, kept sorted by timestamp
    pub samples: Vec<RecordedSample>,

    /// Extrinsics of every sensor in the rig
    pub calibrations: Vec<Calibration>,
}

impl RecordedScene {
    /// Creates an empty scene with the given sensor rig.
    pub fn new(name: impl Into<String>, calibrations: Vec<Calibration>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            samples: Vec::new(),
            calibrations,
        }
    }

    /// Appends a sample, keeping samples ordered by timestamp.
    pub fn push_sample(&mut self, sample: RecordedSample) {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(idx, sample);
    }

    /// Restores timestamp order after deserialization.
    pub fn sort_samples(&mut self) {
        self.samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    /// Finds the sample recorded at `timestamp`.
    pub fn sample_at(&self, timestamp: f64) -> Option<&RecordedSample> {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp < timestamp - TIME_EPSILON);
        self.samples
            .get(idx)
            .filter(|s| (s.timestamp - timestamp).abs() <= TIME_EPSILON)
    }

    /// Mutable variant of [`RecordedScene::sample_at`].
    pub fn sample_at_mut(&mut self, timestamp: f64) -> Option<&mut RecordedSample> {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp < timestamp - TIME_EPSILON);
        self.samples
            .get_mut(idx)
            .filter(|s| (s.timestamp - timestamp).abs() <= TIME_EPSILON)
    }

    fn require_sample(&self, timestamp: f64) -> Result<&RecordedSample, EnvError> {
        self.sample_at(timestamp)
            .ok_or(EnvError::SampleNotFound(timestamp))
    }
}

impl SceneSource for RecordedScene {
    fn scene_name(&self) -> &str {
        &self.name
    }

    fn samples(&self) -> Result<Vec<SampleInfo>, EnvError> {
        Ok(self
            .samples
            .iter()
            .map(|s| SampleInfo::new(s.token.clone(), s.timestamp))
            .collect())
    }

    fn ego_pose(&self, timestamp: f64) -> Result<Pose, EnvError> {
        Ok(self.require_sample(timestamp)?.ego_pose)
    }

    fn sensor_reading(
        &self,
        sensor: &str,
        timestamp: f64,
    ) -> Result<Option<SensorReading>, EnvError> {
        let sample = self.require_sample(timestamp)?;
        Ok(sample.readings.iter().find(|r| r.sensor == sensor).cloned())
    }

    fn annotations(&self, timestamp: f64) -> Result<Vec<Annotation>, EnvError> {
        Ok(self.require_sample(timestamp)?.annotations.clone())
    }

    fn calibration(&self, sensor: &str) -> Result<Calibration, EnvError> {
        self.calibrations
            .iter()
            .find(|c| c.sensor == sensor)
            .cloned()
            .ok_or_else(|| EnvError::sensor(sensor))
    }
}

/// Catalog of in-memory scenes.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    scenes: Vec<RecordedScene>,
}

impl MemoryCatalog {
    /// Wraps a list of scenes.
    pub fn new(scenes: Vec<RecordedScene>) -> Self {
        Self { scenes }
    }

    /// Loads scenes from a JSON file holding either one scene or an array.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let value: serde_json::Value =
            serde_json::from_reader(reader).map_err(EnvError::parse)?;

        let mut scenes: Vec<RecordedScene> = if value.is_array() {
            serde_json::from_value(value).map_err(EnvError::parse)?
        } else {
            vec![serde_json::from_value(value).map_err(EnvError::parse)?]
        };
        for scene in &mut scenes {
            scene.sort_samples();
        }

        debug!("Loaded {} recorded scenes from {}", scenes.len(), path.display());
        Ok(Self { scenes })
    }

    /// Adds a scene.
    pub fn push(&mut self, scene: RecordedScene) {
        self.scenes.push(scene);
    }

    /// Number of scenes.
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    /// True when the catalog holds no scene.
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Iterates over scenes.
    pub fn scenes(&self) -> impl Iterator<Item = &RecordedScene> {
        self.scenes.iter()
    }
}

impl SceneCatalog for MemoryCatalog {
    fn scene_names(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.name.clone()).collect()
    }

    fn open_scene(&self, name: &str) -> Result<&dyn SceneSource, EnvError> {
        self.scenes
            .iter()
            .find(|s| s.name == name)
            .map(|s| s as &dyn SceneSource)
            .ok_or_else(|| EnvError::SceneNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointCloud, RawPoint, SensorData};
    use std::io::Write;

    fn sample(token: &str, t: f64) -> RecordedSample {
        RecordedSample {
            token: token.to_string(),
            timestamp: t,
            ego_pose: Pose::at([t, 0.0, 0.0], t),
            readings: vec![SensorReading {
                sensor: "LIDAR_TOP".to_string(),
                timestamp: t,
                data: SensorData::Points(PointCloud::new(vec![RawPoint::lidar(
                    [1.0, 0.0, 0.0],
                    10.0,
                )])),
            }],
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_push_sample_keeps_order() {
        let mut scene = RecordedScene::new("scene-0001", Vec::new());
        scene.push_sample(sample("b", 1.0));
        scene.push_sample(sample("a", 0.5));
        scene.push_sample(sample("c", 1.5));

        let tokens: Vec<_> = scene.samples().unwrap().into_iter().map(|s| s.token).collect();
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lookup_tolerates_float_noise() {
        let mut scene = RecordedScene::new("scene-0001", Vec::new());
        scene.push_sample(sample("a", 0.5));

        let pose = scene.ego_pose(0.5 + 1e-9).unwrap();
        assert_eq!(pose.translation[0], 0.5);
        assert!(matches!(scene.ego_pose(0.6), Err(EnvError::SampleNotFound(_))));
    }

    #[test]
    fn test_missing_sensor_reading_is_none() {
        let mut scene = RecordedScene::new("scene-0001", Vec::new());
        scene.push_sample(sample("a", 0.0));

        assert!(scene.sensor_reading("LIDAR_TOP", 0.0).unwrap().is_some());
        assert!(scene.sensor_reading("RADAR_FRONT", 0.0).unwrap().is_none());
    }

    #[test]
    fn test_unknown_calibration() {
        let scene = RecordedScene::new(
            "scene-0001",
            vec![Calibration::new("LIDAR_TOP", [0.9, 0.0, 1.8], [1.0, 0.0, 0.0, 0.0])],
        );
        assert!(scene.calibration("LIDAR_TOP").is_ok());
        assert!(matches!(
            scene.calibration("CAM_FRONT"),
            Err(EnvError::SensorNotFound(_))
        ));
    }

    #[test]
    fn test_catalog_from_json_file() {
        let mut scene = RecordedScene::new("scene-0042", Vec::new());
        scene.push_sample(sample("a", 0.0));
        scene.push_sample(sample("b", 0.5));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&vec![scene]).unwrap()).unwrap();

        let catalog = MemoryCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.scene_names(), vec!["scene-0042".to_string()]);

        let source = catalog.open_scene("scene-0042").unwrap();
        assert_eq!(source.samples().unwrap().len(), 2);
        assert!(catalog.open_scene("scene-9999").is_err());
    }
}
