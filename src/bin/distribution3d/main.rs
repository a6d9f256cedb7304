// distribution3d: reduce stella's 5D distribution function to 3D marginals
// and keep the per-run `.dt<dt>.distribution3D` caches up to date.
//
// Usage:
//   distribution3d runs/                       # every nonlinear run below runs/
//   distribution3d runs/ --dt 2.5              # finer time stride
//   distribution3d runs/ --dry-run             # classify only
//   distribution3d runs/ --report out.json     # also write a JSON report

mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::error;

use report::{RunReport, Summary};
use stella_post::{
    init_logging, opener_for, ArchiveFormat, ArchiveGeometry, Collaborators, DistributionDriver,
    DriverConfig, NamelistReader, PostError, Stride, WalkdirEnumerator,
};

// ─── CLI Parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "distribution3d",
    version,
    about = "Cache reduced 3D distribution functions of stella runs"
)]
struct Args {
    /// Folder searched recursively for stella input files.
    folder: PathBuf,

    /// Time between cached points.
    #[arg(long = "dt", value_parser = parse_stride)]
    stride: Option<Stride>,

    /// Suffix of the output archive next to each input file.
    #[arg(long)]
    archive_suffix: Option<String>,

    /// Archive backend: npz or netcdf4.
    #[arg(long)]
    format: Option<ArchiveFormat>,

    /// Report what would be done without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// JSON file with driver settings; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging (ignored when RUST_LOG is set).
    #[arg(short, long)]
    verbose: bool,
}

fn parse_stride(s: &str) -> Result<Stride, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Stride::new(value).map_err(|e| e.to_string())
}

fn load_config(args: &Args) -> Result<DriverConfig, PostError> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::from_json_file(path)?,
        None => DriverConfig::default(),
    };
    if let Some(stride) = args.stride {
        config.stride = stride;
    }
    if let Some(suffix) = &args.archive_suffix {
        config.archive_suffix = suffix.clone();
    }
    if let Some(format) = args.format {
        config.archive_format = format;
    }
    config.dry_run |= args.dry_run;
    config.validate()?;
    Ok(config)
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, PostError> {
    let config = load_config(args)?;
    let archives = opener_for(config.archive_format)?;
    let inputs = NamelistReader;
    let geometry = ArchiveGeometry::new(archives.as_ref());
    let files = WalkdirEnumerator;
    let collaborators = Collaborators {
        inputs: &inputs,
        archives: archives.as_ref(),
        geometry: &geometry,
        files: &files,
    };

    let started = Instant::now();
    let driver = DistributionDriver::new(config.clone(), collaborators);
    let batch = driver.run(&args.folder)?;
    let elapsed = started.elapsed();

    println!(
        "\n  distribution3d {} | dt = {} | format: {}{}",
        env!("CARGO_PKG_VERSION"),
        batch.stride,
        config.archive_format,
        if config.dry_run { " | dry run" } else { "" }
    );
    println!("  {:<48} {:>24} {:>8}", "Simulation", "Status", "Points");
    println!("  {}", "-".repeat(82));
    for outcome in &batch.outcomes {
        let name = outcome
            .input_file
            .strip_prefix(&args.folder)
            .unwrap_or(&outcome.input_file)
            .display()
            .to_string();
        let points = outcome
            .time_points
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!("  {:<48} {:>24} {:>8}", name, outcome.status.label(), points);
    }

    let summary = Summary::from_batch(&batch);
    println!("  {}", "-".repeat(82));
    println!(
        "  Total: {}  Written: {}  Unchanged: {}  Skipped: {}  Failed: {}  Time: {:.1}s\n",
        summary.total,
        summary.written,
        summary.unchanged,
        summary.skipped,
        summary.failed,
        elapsed.as_secs_f64()
    );

    if let Some(path) = &args.report {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_default();
        let report = RunReport {
            timestamp,
            version: env!("CARGO_PKG_VERSION"),
            folder: batch.folder.display().to_string(),
            stride: &batch.stride,
            archive_format: config.archive_format.to_string(),
            dry_run: config.dry_run,
            elapsed_ms: elapsed.as_millis(),
            summary,
            simulations: &batch.outcomes,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| PostError::Config(format!("report serialization: {e}")))?;
        std::fs::write(path, json).map_err(|e| PostError::io(path, e))?;
        println!("  Report saved to: {}\n", path.display());
    }

    if batch.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
