//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, DataPaths};
use crate::adapters::csv_report_adapter::{ASSIGNMENT_FILE, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    DEFAULT_HEIGHT, DEFAULT_WIDTH, parse_forced, validate_assign_config, validate_simulate_config,
};
use crate::domain::error::PixelTraderError;
use crate::domain::pipeline::{PipelineConfig, run_assignment, run_simulation};
use crate::domain::simulation::DEFAULT_DEPLOYED_CAPITAL;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "pixeltrader",
    about = "Assign instruments to pixels and simulate trading the frames"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve the symbol-to-pixel assignment and write it as CSV
    Assign {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Simulate execution under a persisted assignment
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check a config file without loading any data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Assign { config } => run_assign(&config),
        Command::Simulate { config } => run_simulate(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PixelTraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

pub fn build_pipeline_config(adapter: &dyn ConfigPort) -> Result<PipelineConfig, PixelTraderError> {
    let width = adapter.get_int("pixels", "width", DEFAULT_WIDTH);
    let height = adapter.get_int("pixels", "height", DEFAULT_HEIGHT);
    let dimension = |key: &str, value: i64| {
        usize::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| PixelTraderError::ConfigInvalid {
                section: "pixels".into(),
                key: key.into(),
                reason: format!("{key} must be at least 1"),
            })
    };
    let forced = match adapter.get_string("assignment", "forced") {
        Some(raw) => parse_forced(&raw)?,
        None => Vec::new(),
    };
    Ok(PipelineConfig {
        width: dimension("width", width)?,
        height: dimension("height", height)?,
        forced,
        deployed_capital: adapter.get_double(
            "simulation",
            "deployed_capital",
            DEFAULT_DEPLOYED_CAPITAL,
        ),
    })
}

/// Where the assignment is written by `assign` and read by `simulate`.
pub fn assignment_path(adapter: &dyn ConfigPort) -> Result<PathBuf, PixelTraderError> {
    match adapter.get_path("data", "assignment") {
        Some(path) => Ok(path),
        None => Ok(output_dir(adapter)?.join(ASSIGNMENT_FILE)),
    }
}

pub fn output_dir(adapter: &dyn ConfigPort) -> Result<PathBuf, PixelTraderError> {
    adapter
        .get_path("output", "dir")
        .ok_or_else(|| PixelTraderError::ConfigMissing {
            section: "output".into(),
            key: "dir".into(),
        })
}

pub fn build_data_paths(adapter: &dyn ConfigPort) -> Result<DataPaths, PixelTraderError> {
    let required = |key: &str| {
        adapter
            .get_path("data", key)
            .ok_or_else(|| PixelTraderError::ConfigMissing {
                section: "data".into(),
                key: key.into(),
            })
    };
    Ok(DataPaths {
        prices: required("prices")?,
        valuation_prices: adapter.get_path("data", "valuation_prices"),
        frames: required("frames")?,
        scale: adapter.get_path("data", "scale"),
        splits: adapter.get_path("data", "splits"),
        dividends: adapter.get_path("data", "dividends"),
        assignment: Some(assignment_path(adapter)?),
    })
}

/// Size the global rayon pool from `[runtime] threads`; 0 keeps the default.
pub fn configure_threads(adapter: &dyn ConfigPort) {
    let threads = adapter.get_int("runtime", "threads", 0);
    if threads > 0 {
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .build_global();
        if let Err(e) = built {
            tracing::warn!(error = %e, "rayon pool already initialised");
        }
    }
    tracing::debug!(threads = rayon::current_num_threads(), "rayon thread pool");
}

fn run_assign(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match assign_with(&adapter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Validate, solve and write the assignment for a loaded config.
pub fn assign_with(adapter: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    validate_assign_config(adapter)?;
    configure_threads(adapter);
    let config = build_pipeline_config(adapter)?;
    let data = CsvAdapter::new(build_data_paths(adapter)?);
    let report = CsvReportAdapter::new(output_dir(adapter)?)
        .with_assignment_path(assignment_path(adapter)?);

    let outcome = run_assignment(&data, &config)?;
    report.write_assignment(&outcome.symbols, &outcome.assignment)?;

    let matched = outcome.assignment.matched_count();
    eprintln!("\n=== Assignment ===");
    eprintln!("Symbols:          {}", outcome.symbols.len());
    eprintln!("Pixels:           {}", config.num_pixels());
    eprintln!("Matched:          {}", matched);
    eprintln!("Overflow:         {}", outcome.symbols.len() - matched);
    eprintln!("\nAssignment written to: {}", report.assignment_path().display());
    Ok(())
}

fn run_simulate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match simulate_with(&adapter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Validate, simulate and write the results for a loaded config.
pub fn simulate_with(adapter: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    validate_simulate_config(adapter)?;
    configure_threads(adapter);
    let config = build_pipeline_config(adapter)?;
    let data = CsvAdapter::new(build_data_paths(adapter)?);
    let dir = output_dir(adapter)?;
    let report = CsvReportAdapter::new(dir.clone());

    let result = run_simulation(&data, &config)?;
    report.write_simulation(&result)?;

    eprintln!("\n=== Simulation ===");
    eprintln!("Symbols:          {}", result.symbols.len());
    eprintln!("Rebalances:       {}", result.rebalance_history.len());
    eprintln!("Minutes:          {}", result.nav_history.len());
    eprintln!("Spread Cost:      ${:.2}", result.total_spread_cost());
    if let Some(nav) = result.final_nav() {
        eprintln!("Final NAV:        ${:.0}", nav);
    }
    if let Some(ret) = result.total_return() {
        eprintln!("Return:           {:.2}%", ret * 100.0);
    }
    eprintln!("\nResults written to: {}", dir.display());
    Ok(())
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_assign_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let simulate_ok = match validate_simulate_config(&adapter) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("  simulate: not runnable ({e})");
            false
        }
    };
    let config = match build_pipeline_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nPixels:           {}x{} = {}", config.width, config.height, config.num_pixels());
    eprintln!("Forced pairs:     {}", config.forced.len());
    for (symbol, pixel) in &config.forced {
        eprintln!("  {symbol} -> {pixel}");
    }
    if simulate_ok {
        eprintln!("Deployed capital: ${:.0}", config.deployed_capital);
    }
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
