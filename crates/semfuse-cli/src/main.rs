//! `semfuse` – semantic map fusion command line tool.
//!
//! Reads a labelled point cloud, builds a local semantic occupancy map from
//! it, fuses that map into a fresh global map and reports the outcome:
//!
//! ```text
//! semfuse point_cloud.txt [--config PATH] [--passes N] [--show N] [--json]
//! semfuse --init-config [--config PATH]
//! ```

mod cloud;
mod config;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use semfuse_map::voxel_map::SpatialMap;

use crate::pipeline::{CliError, Session};

#[derive(Parser, Debug)]
#[command(name = "semfuse", version, about = "Fuse a labelled point cloud into a semantic occupancy map")]
struct Args {
    /// Point cloud file: `x y z e1 … eN` per line, class index in the last column.
    #[arg(required_unless_present = "init_config")]
    evidence: Option<PathBuf>,

    /// Config file (defaults to ~/.semfuse/config.toml).
    #[arg(long, env = "SEMFUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of times the local map is merged into the global map.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    passes: u16,

    /// Print the first N global voxels.
    #[arg(long, default_value_t = 0)]
    show: usize,

    /// Print the session summary as JSON.
    #[arg(long)]
    json: bool,

    /// Write the default configuration and exit.
    #[arg(long)]
    init_config: bool,
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); SEMFUSE_LOG_FORMAT=json switches to
    // newline-delimited JSON.  Logs go to stderr so stdout stays parseable.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("SEMFUSE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    if args.init_config {
        let path = args.config.clone().unwrap_or_else(config::config_path);
        config::save_to(&config::Config::default(), &path).map_err(CliError::Config)?;
        println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
        return Ok(());
    }

    let cfg = config::resolve(args.config.as_deref()).map_err(CliError::Config)?;
    info!(?cfg, "configuration resolved");

    let Some(evidence) = args.evidence.as_ref() else {
        return Err(CliError::MissingInputFile(PathBuf::new()));
    };
    if !evidence.is_file() {
        return Err(CliError::MissingInputFile(evidence.clone()));
    }

    let points = cloud::read_cloud(evidence, cfg.extra_columns)?;
    info!(points = points.len(), path = %evidence.display(), "point cloud loaded");

    let session = pipeline::run_session(&points, &cfg, usize::from(args.passes))?;

    if args.json {
        let json = serde_json::to_string_pretty(&session.summary)
            .map_err(|e| CliError::Config(format!("failed to encode summary: {e}")))?;
        println!("{json}");
    } else {
        print_summary(&session, cfg.resolution);
    }
    if args.show > 0 {
        print_voxels(&session, cfg.resolution, args.show);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(session: &Session, resolution: f64) {
    let s = &session.summary;
    println!();
    println!("  {} (resolution {} m)", "Semantic map fusion".bold().cyan(), resolution);
    println!(
        "  Evidence:   {} points, {} labelled, {} without class, {} out of range",
        s.local.points, s.local.labelled, s.local.unlabelled, s.local.unplaced
    );
    println!(
        "  Local map:  {} voxels, {} occupied ({} defaulted to class 0, {} coloured)",
        s.local_voxels,
        session.local.occupied_leaves().count(),
        s.local.defaulted,
        s.local_coloured
    );
    for (i, pass) in s.passes.iter().enumerate() {
        let skipped = if pass.skipped > 0 {
            pass.skipped.to_string().red().to_string()
        } else {
            pass.skipped.to_string()
        };
        println!(
            "  Pass {}:     {} created, {} fused, {} skipped",
            i + 1,
            pass.created,
            pass.fused,
            skipped
        );
    }
    println!(
        "  Global map: {} voxels ({} coloured)",
        s.global_voxels, s.global_coloured
    );
    for (class, n) in s.class_histogram.iter().enumerate() {
        println!("    class {class}: {n}");
    }
    println!();
}

fn print_voxels(session: &Session, resolution: f64, limit: usize) {
    for (key, node) in session.global.leaves().take(limit) {
        let [x, y, z] = key.centre(resolution);
        let semantics = node
            .semantics
            .as_ref()
            .map_or_else(|| "unset".to_string(), ToString::to_string);
        let color = node
            .color
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        println!(
            "  ({x:.3} {y:.3} {z:.3})  occupancy {:.4}  semantics {}  color {}",
            node.occupancy(),
            semantics,
            color.dimmed()
        );
    }
}
