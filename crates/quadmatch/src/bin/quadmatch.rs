//! quadmatch CLI: find the affine transform between two point-set files.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::{info, LevelFilter};
use quadmatch::hash::{MatchConfig, MatchReport};
use quadmatch::BackgroundDensity;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

/// Exit status when the search ran but nothing cleared `--min-ratio`.
const EXIT_NO_MATCH: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "quadmatch")]
#[command(about = "Find the affine transform between two 2D point sets by quad hashing")]
#[command(version)]
struct Cli {
    /// Reference point file (JSON or two-column text).
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Point file to register onto the reference.
    #[arg(long)]
    other: Option<PathBuf>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON run configuration; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Smallest quad frame axis |AB|.
    #[arg(long)]
    min_size: Option<f64>,

    /// Largest quad frame axis |AB|.
    #[arg(long)]
    max_size: Option<f64>,

    /// Frame partners considered per point.
    #[arg(long)]
    max_neighbors: Option<usize>,

    /// Max Euclidean distance between matching quad codes.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Log-likelihood ratio a transform must exceed to be accepted.
    #[arg(long)]
    min_ratio: Option<f64>,

    /// Reference field area (e.g. image width * height) for the background
    /// density. Defaults to the reference bounding box.
    #[arg(long)]
    area: Option<f64>,

    /// Refit the best quad transform on all nearest-neighbor inliers.
    /// The reported ratio is then the refined one.
    #[arg(long)]
    refine: bool,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8) -> CliResult<()> {
    quadmatch::core::init_with_level(level_for(verbose))?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: u8) -> CliResult<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        quadmatch::core::init_with_level(level_for(verbose))?;
    } else {
        quadmatch::core::init_tracing(false);
    }
    Ok(())
}

fn build_config(cli: &Cli) -> CliResult<MatchConfig> {
    let mut cfg = match &cli.config {
        Some(path) => MatchConfig::load_json(path)?,
        None => {
            let (Some(reference), Some(other)) = (&cli.reference, &cli.other) else {
                return Err("--reference and --other are required without --config".into());
            };
            MatchConfig::new(reference.to_string_lossy(), other.to_string_lossy())
        }
    };

    if let Some(reference) = &cli.reference {
        cfg.reference_path = reference.to_string_lossy().into_owned();
    }
    if let Some(other) = &cli.other {
        cfg.other_path = other.to_string_lossy().into_owned();
    }
    if let Some(output) = &cli.output {
        cfg.output_path = Some(output.to_string_lossy().into_owned());
    }
    if let Some(v) = cli.min_size {
        cfg.quads.min_size = v;
    }
    if let Some(v) = cli.max_size {
        cfg.quads.max_size = v;
    }
    if let Some(v) = cli.max_neighbors {
        cfg.quads.max_neighbors = v;
    }
    if let Some(v) = cli.tolerance {
        cfg.search.tolerance = v;
    }
    if let Some(v) = cli.min_ratio {
        cfg.acceptance.min_ratio = v;
    }
    if let Some(area) = cli.area {
        cfg.density = BackgroundDensity::Area(area);
    }
    if cli.refine {
        cfg.search.refine.enabled = true;
    }
    Ok(cfg)
}

fn emit(report: &MatchReport, cfg: &MatchConfig) -> CliResult<()> {
    match cfg.output_path() {
        Some(path) => {
            report.write_json(&path)?;
            info!("wrote report to {}", path.display());
        }
        None => println!("{}", report.to_json_string()?),
    }
    Ok(())
}

fn run(cli: &Cli) -> CliResult<bool> {
    let cfg = build_config(cli)?;
    let report = cfg.run()?;
    emit(&report, &cfg)?;
    if report.accepted {
        info!("accepted: ratio {:.3}", report.best_ratio);
    } else {
        info!(
            "no transform above ratio {} (best {:.3})",
            report.min_ratio, report.best_ratio
        );
    }
    Ok(report.accepted)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("warning: logger setup failed: {err}");
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_NO_MATCH),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
