//! nuviz Environment Abstraction Layer
//!
//! The converter core never loads datasets or writes files itself. This
//! crate defines the seams it talks through:
//! - **Scene sources** (`SceneSource`, `SceneCatalog`): typed accessors for
//!   ego poses, sensor readings, annotations and calibrations
//! - **Packet sinks** (`PacketSink`): where encoded protocol packets go
//!
//! Plus the raw data model those accessors return.
//!
//! # Example
//!
//! ```ignore
//! use nuviz_env::{MemoryCatalog, SceneCatalog, SceneSource};
//!
//! let catalog = MemoryCatalog::from_json_file("scenes.json")?;
//! for name in catalog.scene_names() {
//!     let scene = catalog.open_scene(&name)?;
//!     for sample in scene.samples()? {
//!         let ego = scene.ego_pose(sample.timestamp)?;
//!         // ...
//!     }
//! }
//! ```

mod error;
mod recording;
mod sink;
mod source;
mod types;

pub use error::EnvError;
pub use recording::{MemoryCatalog, RecordedSample, RecordedScene, TIME_EPSILON};
pub use sink::{DirectorySink, MemorySink, PacketSink, StreamIndex, INDEX_FILE, PACKET_EXTENSION};
pub use source::{SceneCatalog, SceneSource};
pub use types::{
    Annotation, Calibration, ImageData, PointCloud, Pose, RawPoint, SampleInfo, SensorData,
    SensorReading, Visibility, IDENTITY_ROTATION,
};
