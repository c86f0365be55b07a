//! Scene source abstraction consumed by the converter.

use crate::error::EnvError;
use crate::types::{Annotation, Calibration, Pose, SampleInfo, SensorReading};

/// Typed accessors over one recorded scene.
///
/// The converter never touches files or dataset tables directly; it only
/// calls these methods. Implementations are expected to be cheap to query
/// repeatedly (the converter may ask for the same ego pose several times
/// per sample).
///
/// # Implementations
///
/// - `RecordedScene`: in-memory scene, optionally loaded from JSON
/// - Synthetic scenes produced by `nuviz_sim` are `RecordedScene`s too
pub trait SceneSource {
    /// Returns the scene name.
    fn scene_name(&self) -> &str;

    /// Returns all keyframes, ordered by ascending timestamp.
    fn samples(&self) -> Result<Vec<SampleInfo>, EnvError>;

    /// Returns the ego vehicle's global pose at `timestamp`.
    fn ego_pose(&self, timestamp: f64) -> Result<Pose, EnvError>;

    /// Returns the reading of `sensor` captured for the sample at `timestamp`.
    ///
    /// # Returns
    /// * `Ok(None)` - the sensor recorded nothing for this sample
    fn sensor_reading(&self, sensor: &str, timestamp: f64)
        -> Result<Option<SensorReading>, EnvError>;

    /// Returns every annotation of the sample at `timestamp`.
    fn annotations(&self, timestamp: f64) -> Result<Vec<Annotation>, EnvError>;

    /// Returns the fixed sensor -> vehicle calibration of `sensor`.
    fn calibration(&self, sensor: &str) -> Result<Calibration, EnvError>;
}

/// A collection of scenes addressable by name.
///
/// Shared read-only across worker threads, hence `Send + Sync`.
pub trait SceneCatalog: Send + Sync {
    /// Names of all scenes, in catalog order.
    fn scene_names(&self) -> Vec<String>;

    /// Opens one scene for conversion.
    fn open_scene(&self, name: &str) -> Result<&dyn SceneSource, EnvError>;
}
