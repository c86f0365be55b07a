//! Scene runner - converts a catalog of scenes in parallel.
//!
//! Scenes are independent: each gets its own `SceneConverter` (so its own
//! adapter state) and its own `DirectorySink` under the output directory.
//! A scene that fails is reported and the others carry on.

use crate::error::SimError;
use nuviz_core::{ConverterConfig, SceneConverter, SceneReport};
use nuviz_env::{DirectorySink, SceneCatalog};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Result of converting one scene.
#[derive(Debug)]
pub struct SceneOutcome {
    /// Scene name
    pub scene: String,

    /// Directory holding the scene's packets
    pub output_dir: PathBuf,

    /// Conversion report, or why the scene failed
    pub result: Result<SceneReport, SimError>,
}

impl SceneOutcome {
    /// True when the scene converted (skipped streams allowed).
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    /// Failure message if any.
    pub fn failure_reason(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.to_string())
    }
}

/// Converts scenes into per-scene packet directories.
pub struct SceneRunner {
    config: ConverterConfig,

    /// Root of all scene directories
    output_dir: PathBuf,

    /// Convert scenes on the rayon pool
    parallel: bool,
}

impl SceneRunner {
    /// Creates a runner writing under `output_dir`.
    pub fn new(config: ConverterConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
            parallel: true,
        }
    }

    /// Enables or disables parallel conversion.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory that receives the packets of `scene`.
    pub fn scene_dir(&self, scene: &str) -> PathBuf {
        let safe: String = scene
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.output_dir.join(safe)
    }

    /// Converts every scene of `catalog`.
    ///
    /// # Returns
    /// One outcome per scene, in catalog order.
    pub fn run_catalog(&self, catalog: &dyn SceneCatalog) -> Vec<SceneOutcome> {
        let names = catalog.scene_names();
        info!(
            "Converting {} scenes into {} ({})",
            names.len(),
            self.output_dir.display(),
            if self.parallel { "parallel" } else { "sequential" }
        );

        // Two scenes with the same directory would interleave their packets
        let mut seen = HashSet::new();
        let duplicate: Vec<bool> = names
            .iter()
            .map(|name| !seen.insert(self.scene_dir(name)))
            .collect();

        let run = |(name, duplicate): (&String, &bool)| {
            if *duplicate {
                let outcome = SceneOutcome {
                    scene: name.clone(),
                    output_dir: self.scene_dir(name),
                    result: Err(SimError::Scenario(format!(
                        "duplicate scene name {}",
                        name
                    ))),
                };
                error!("✗ {}: {}", name, outcome.failure_reason().unwrap_or_default());
                return outcome;
            }
            self.run_scene(catalog, name)
        };

        if self.parallel {
            names.par_iter().zip(duplicate.par_iter()).map(run).collect()
        } else {
            names.iter().zip(duplicate.iter()).map(run).collect()
        }
    }

    /// Converts one scene of `catalog` into its own directory.
    pub fn run_scene(&self, catalog: &dyn SceneCatalog, name: &str) -> SceneOutcome {
        let output_dir = self.scene_dir(name);
        let result = self.convert(catalog, name, &output_dir);

        match &result {
            Ok(report) if report.is_complete() => {
                info!("✓ {}: {} frames", name, report.frames);
            }
            Ok(report) => {
                info!(
                    "✓ {}: {} frames, {} skipped streams",
                    name,
                    report.frames,
                    report.skipped.len()
                );
            }
            Err(e) => error!("✗ {}: {}", name, e),
        }

        SceneOutcome {
            scene: name.to_string(),
            output_dir,
            result,
        }
    }

    fn convert(
        &self,
        catalog: &dyn SceneCatalog,
        name: &str,
        output_dir: &Path,
    ) -> Result<SceneReport, SimError> {
        let source = catalog.open_scene(name)?;
        let mut sink = DirectorySink::create(output_dir)?;
        debug!("{} -> {}", name, output_dir.display());

        let mut converter = SceneConverter::new(self.config.clone());
        Ok(converter.convert_scene(source, &mut sink)?)
    }
}
