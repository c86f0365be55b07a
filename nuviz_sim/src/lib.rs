//! nuviz Synthetic Scene Harness
//!
//! Generates deterministic driving scenes and pushes them through the
//! converter end to end, so the whole pipeline can be exercised without a
//! dataset on disk.
//!
//! # Core Principle: One Seed, One Scene
//!
//! All randomness (sensor noise, dropouts, tokens, actor layouts) is
//! drawn from `ChaCha8Rng`s derived from a single 64-bit seed. Re-running
//! a scenario with the same seed reproduces the same packets.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   RecordedScene   ┌───────────────┐
//! │  ScenarioId  │──────────────────►│ MemoryCatalog │
//! │   + Oracle   │                   └───────┬───────┘
//! └──────────────┘                           │
//!                                   ┌────────▼────────┐
//!                                   │   SceneRunner   │  rayon, one
//!                                   │ SceneConverter  │  scene per task
//!                                   └────────┬────────┘
//!                            DirectorySink   │   SceneOutcome
//!                         <out>/<scene>/*.nviz   ▼
//!                                   ┌─────────────────┐
//!                                   │    RunExport    │  run.json
//!                                   └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use nuviz_core::ConverterConfig;
//! use nuviz_env::MemoryCatalog;
//! use nuviz_sim::{RunExport, SceneRunner, ScenarioId};
//!
//! let scene = ScenarioId::StraightDrive.generate(42, 40)?;
//! let catalog = MemoryCatalog::new(vec![scene]);
//!
//! let outcomes = SceneRunner::new(ConverterConfig::default(), "out").run_catalog(&catalog);
//! RunExport::from_outcomes(Some(42), &outcomes).write_to_file("out/run.json")?;
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{RunExport, SceneSummary};
pub use oracle::{Actor, EgoVehicle, Oracle, KEYFRAME_INTERVAL, LIDAR_RANGE, RADAR_RANGE};
pub use runner::{SceneOutcome, SceneRunner};
pub use scenarios::{samples_for, typical_size, ScenarioId};
