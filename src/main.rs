// src/main.rs - Command-line driver for the synapse proximity engine

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use log::{info, warn};

use synapse_proximity_lib::config::{Config, PairingMode};
use synapse_proximity_lib::image_io::{get_tif_files_in_dir, group_channel_files};
use synapse_proximity_lib::output::write_run_report;
use synapse_proximity_lib::pipeline::run_batch;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Cross-channel synapse proximity analysis")]
struct Args {
    /// Directory holding the channel stacks
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Threshold as a fraction of the frame maximum (overwrites config)
    #[clap(long)]
    th_percentage: Option<f64>,

    /// Centroid distance budget in physical units (overwrites config)
    #[clap(long)]
    max_distance: Option<f64>,

    /// Objects must have strictly more pixels than this (overwrites config)
    #[clap(long)]
    min_area: Option<u32>,

    /// Physical size of one pixel (overwrites config)
    #[clap(long)]
    x_y_ratio: Option<f64>,

    /// Physical depth of one frame, used for densities (overwrites config)
    #[clap(long)]
    z_ratio: Option<f64>,

    /// Number of smallest distances averaged (overwrites config)
    #[clap(long)]
    average_k: Option<usize>,

    /// Pairing strategy (overwrites config)
    #[clap(long)]
    pairing: Option<PairingArg>,

    /// Write the default configuration to the config path and exit
    #[clap(long)]
    write_default_config: bool,

    /// Log level or flexi_logger filter, e.g. "debug" or "info,synapse_proximity_lib=debug"
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Also write log files into this directory
    #[clap(long)]
    log_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PairingArg {
    AllPairs,
    LargestObject,
}

fn setup_logging(level: &str, log_dir: Option<&str>) -> anyhow::Result<LoggerHandle> {
    let logger = Logger::try_with_str(level)?;

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(Duplicate::All),
        None => logger.log_to_stderr(),
    };

    Ok(logger.start()?)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    if let Some(th) = args.th_percentage {
        config.th_percentage = th;
    }

    if let Some(max_distance) = args.max_distance {
        config.max_distance = max_distance;
    }

    if let Some(min_area) = args.min_area {
        config.min_area = min_area;
    }

    if let Some(ratio) = args.x_y_ratio {
        config.x_y_ratio = ratio;
    }

    if let Some(ratio) = args.z_ratio {
        config.z_ratio = ratio;
    }

    if let Some(k) = args.average_k {
        config.average_k = k;
    }

    if let Some(pairing) = args.pairing {
        config.pairing = match pairing {
            PairingArg::AllPairs => PairingMode::AllPairs,
            PairingArg::LargestObject => PairingMode::LargestObject,
        };
    }
}

/// Main function
fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logger = setup_logging(&args.log_level, args.log_dir.as_deref())
        .context("Logger initialization failed")?;

    if args.write_default_config {
        Config::default()
            .save_to_file(&args.config)
            .with_context(|| format!("Writing default configuration to {}", args.config))?;
        info!("Default configuration written to {}", args.config);
        return Ok(());
    }

    // A missing config file falls back to defaults
    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        warn!("{} not found, using default configuration", args.config);
        Config::default()
    };
    apply_overrides(&mut config, &args);

    config.validate()?;
    config.prepare_paths()?;

    let start_time = Instant::now();

    let input_path = PathBuf::from(&config.input_path);
    if !input_path.is_dir() {
        bail!("Input must be a directory of TIFF stacks: {}", input_path.display());
    }

    let files = get_tif_files_in_dir(&input_path)?;
    info!("Found {} TIFF files in {}", files.len(), input_path.display());

    let groups = group_channel_files(&files, &config.reference_channel);
    info!("Processing {} channel groups", groups.len());

    let report = run_batch(&groups, &config);

    let elapsed = start_time.elapsed();
    let report_path = PathBuf::from(&config.output_base_dir).join("run_report.json");
    write_run_report(&config, &report, elapsed.as_secs_f64(), &report_path)
        .with_context(|| format!("Writing {}", report_path.display()))?;

    println!(
        "Processed {} groups ({} skipped, {} failed) in {:.2} seconds",
        report.processed.len(),
        report.skipped.len(),
        report.failed.len(),
        elapsed.as_secs_f64()
    );

    if !report.failed.is_empty() {
        bail!("{} groups failed", report.failed.len());
    }

    Ok(())
}
