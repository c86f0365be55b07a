//! nuviz synthetic scene CLI
//!
//! Generates scenario scenes (or loads recorded ones) and converts each
//! into its own packet directory.

use clap::Parser;
use nuviz_core::ConverterConfig;
use nuviz_env::MemoryCatalog;
use nuviz_sim::scenarios::ScenarioId;
use nuviz_sim::{samples_for, RunExport, SceneRunner, SimError};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// nuviz scene conversion CLI
#[derive(Parser, Debug)]
#[command(name = "nuviz-sim")]
#[command(about = "Convert synthetic or recorded driving scenes into nuviz packet streams", long_about = None)]
struct Args {
    /// Scenario to generate (straight_drive, intersection_turn, sensor_dropout,
    /// dense_traffic, pedestrian_crossing, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Convert at most this many samples per scene
    #[arg(long)]
    samples: Option<usize>,

    /// Length of generated scenes in seconds
    #[arg(short, long, default_value = "20")]
    duration: f64,

    /// Recorded scenes (JSON) to convert instead of generating
    #[arg(long)]
    scene_file: Option<PathBuf>,

    /// Converter configuration override (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory, one subdirectory per scene
    #[arg(short, long, default_value = "nuviz_out")]
    output: PathBuf,

    /// Camera frames are downscaled to fit this width
    #[arg(long)]
    image_max_width: Option<u32>,

    /// Camera frames are downscaled to fit this height
    #[arg(long)]
    image_max_height: Option<u32>,

    /// Sequential conversion (one scene at a time)
    #[arg(long)]
    sequential: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<ConverterConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)?,
        None => ConverterConfig::default(),
    };
    if let Some(samples) = args.samples {
        config = config.with_max_samples(samples);
    }
    if let Some(width) = args.image_max_width {
        config.image_max_width = width;
    }
    if let Some(height) = args.image_max_height {
        config.image_max_height = height;
    }
    config.validate()?;
    Ok(config)
}

fn load_catalog(args: &Args, seed: u64) -> Result<MemoryCatalog, SimError> {
    if let Some(path) = &args.scene_file {
        let catalog = MemoryCatalog::from_json_file(path)?;
        info!("Loaded {} recorded scenes from {}", catalog.len(), path.display());
        return Ok(catalog);
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse::<ScenarioId>().map_err(SimError::Scenario)?]
    };

    let samples = samples_for(args.duration);
    let mut catalog = MemoryCatalog::default();
    for scenario in scenarios {
        info!("Generating {} ({} samples): {}", scenario, samples, scenario.description());
        catalog.push(scenario.generate(seed, samples)?);
    }
    Ok(catalog)
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("nuviz scene converter v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Determine base seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let setup = load_config(&args).and_then(|config| Ok((config, load_catalog(&args, seed)?)));
    let (config, catalog) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            error!("{}", e);
            eprintln!("Available scenarios: straight_drive, intersection_turn, sensor_dropout, dense_traffic, pedestrian_crossing, all");
            std::process::exit(1);
        }
    };

    let runner = SceneRunner::new(config, args.output.clone()).with_parallel(!args.sequential);
    let outcomes = runner.run_catalog(&catalog);

    let synthetic_seed = args.scene_file.is_none().then_some(seed);
    let export = RunExport::from_outcomes(synthetic_seed, &outcomes);

    let report_path = args.output.join("run.json");
    let written = std::fs::create_dir_all(&args.output)
        .and_then(|_| export.write_to_file(&report_path.to_string_lossy()));
    if let Err(e) = written {
        error!("Failed to write run report: {}", e);
    }

    if args.json {
        match export.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render run report: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if export.all_passed() {
            info!("✅ All {} scenes converted into {}", export.total, args.output.display());
        } else {
            error!("❌ {}/{} scenes failed!", export.failed, export.total);

            for scene in export.scenes.iter().filter(|s| !s.passed) {
                error!(
                    "  - {}: {}",
                    scene.scene,
                    scene.error.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !export.all_passed() {
        std::process::exit(1);
    }
}
