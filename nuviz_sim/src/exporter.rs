//! JSON run report.
//!
//! Summarizes a runner invocation for CI and for humans: one entry per
//! scene with its counts, skipped streams and output directory.

use crate::runner::SceneOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

/// Summary of one converted (or failed) scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSummary {
    pub scene: String,

    pub passed: bool,

    /// Samples converted (after the sample cap)
    pub samples: usize,

    /// Frame packets written
    pub frames: usize,

    /// Streams declared in metadata
    pub streams: usize,

    /// Skipped (stream, sample) pairs per stream name
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub skipped: BTreeMap<String, usize>,

    /// Directory holding the packets
    pub output: String,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SceneSummary {
    /// Builds the summary of a runner outcome.
    pub fn from_outcome(outcome: &SceneOutcome) -> Self {
        let output = outcome.output_dir.display().to_string();
        match &outcome.result {
            Ok(report) => Self {
                scene: outcome.scene.clone(),
                passed: true,
                samples: report.samples,
                frames: report.frames,
                streams: report.streams,
                skipped: report.skipped_by_stream(),
                output,
                error: None,
            },
            Err(e) => Self {
                scene: outcome.scene.clone(),
                passed: false,
                samples: 0,
                frames: 0,
                streams: 0,
                skipped: BTreeMap::new(),
                output,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Seed used for synthetic scenes (absent for recorded input)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub total: usize,
    pub passed: usize,
    pub failed: usize,

    /// Per-scene summaries, in catalog order
    pub scenes: Vec<SceneSummary>,
}

impl RunExport {
    /// Creates an empty export.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed,
            total: 0,
            passed: 0,
            failed: 0,
            scenes: Vec::new(),
        }
    }

    /// Adds a scene outcome.
    pub fn add_outcome(&mut self, outcome: &SceneOutcome) {
        let summary = SceneSummary::from_outcome(outcome);
        self.total += 1;
        if summary.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.scenes.push(summary);
    }

    /// Builds an export from a whole run.
    pub fn from_outcomes(seed: Option<u64>, outcomes: &[SceneOutcome]) -> Self {
        let mut export = Self::new(seed);
        for outcome in outcomes {
            export.add_outcome(outcome);
        }
        export
    }

    /// True when every scene converted.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use nuviz_core::{SceneReport, SkippedStream};
    use std::path::PathBuf;

    fn report() -> SceneReport {
        SceneReport {
            scene: "scene-0001".to_string(),
            samples: 3,
            frames: 3,
            streams: 17,
            start_time: 0.0,
            end_time: 1.0,
            skipped: vec![SkippedStream {
                stream: "/radar/radar_front".to_string(),
                timestamp: 0.5,
                reason: "Missing sensor data".to_string(),
            }],
        }
    }

    fn outcomes() -> Vec<SceneOutcome> {
        vec![
            SceneOutcome {
                scene: "scene-0001".to_string(),
                output_dir: PathBuf::from("out/scene-0001"),
                result: Ok(report()),
            },
            SceneOutcome {
                scene: "scene-0002".to_string(),
                output_dir: PathBuf::from("out/scene-0002"),
                result: Err(SimError::Scenario("broken".to_string())),
            },
        ]
    }

    #[test]
    fn test_counts() {
        let export = RunExport::from_outcomes(Some(42), &outcomes());
        assert_eq!((export.total, export.passed, export.failed), (2, 1, 1));
        assert!(!export.all_passed());
        assert_eq!(export.scenes[0].skipped["/radar/radar_front"], 1);
        assert!(export.scenes[1].error.as_deref().unwrap().contains("broken"));
    }

    #[test]
    fn test_write_and_read_back() {
        let export = RunExport::from_outcomes(None, &outcomes());
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        export.write_to_file(path).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let back: RunExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.total, 2);
        assert!(back.seed.is_none());
        assert!(!text.contains("\"seed\""));
    }
}
