//! Batch runner for alphaMELTS experiments.
//!
//! Reads a TOML batch file, expands its configuration grid over the listed
//! compositions, and drives the engine once per experiment, each in its own
//! folder under the batch base directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use meltsbatch::batch::{Batch, RunOptions};
use meltsbatch::core::plan::build_experiment_set;
use meltsbatch::core::timing::{estimate_duration, format_duration};
use meltsbatch::core::types::Experiment;
use meltsbatch::exit_codes;
use meltsbatch::io::batch_log::BatchLog;
use meltsbatch::io::config::{BatchFile, load_batch, write_template};
use meltsbatch::io::engine::AlphaMeltsEngine;
use meltsbatch::io::folder::run_dir;
use meltsbatch::io::summary::RunStatus;
use meltsbatch::logging;

#[derive(Parser)]
#[command(
    name = "meltsbatch",
    version,
    about = "Batch runner for alphaMELTS experiments"
)]
struct Cli {
    /// Raise diagnostic verbosity on stderr (-v, -vv). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter batch file.
    Init {
        #[arg(default_value = "batch.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the experiment names and the estimated duration without running anything.
    Plan { batch: PathBuf },
    /// Run every experiment of the batch.
    Run {
        batch: PathBuf,
        /// Replace existing run folders instead of skipping them.
        #[arg(long)]
        overwrite: bool,
        /// Omit a parameter or component from every input file (repeatable).
        #[arg(long = "exclude", value_name = "KEY")]
        exclude: Vec<String>,
        /// Start from a subsolidus initial guess.
        #[arg(long)]
        subsolidus: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Init { path, force } => cmd_init(&path, force),
        Command::Plan { batch } => cmd_plan(&batch),
        Command::Run {
            batch,
            overwrite,
            exclude,
            subsolidus,
        } => cmd_run(&batch, overwrite, exclude, subsolidus),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    write_template(path, force)?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(path: &Path) -> Result<i32> {
    let batch = load_batch(path)?;
    let experiments = plan(&batch, path)?;
    for experiment in &experiments {
        let marker = if run_dir(&batch.base_dir, &experiment.name).exists() {
            " (exists)"
        } else {
            ""
        };
        println!("{}{marker}", experiment.name);
    }
    let estimate = estimate_duration(experiments.len(), batch.run.seconds_per_run);
    println!(
        "{} experiments, estimated {}",
        experiments.len(),
        format_duration(estimate)
    );
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, overwrite: bool, exclude: Vec<String>, subsolidus: bool) -> Result<i32> {
    let batch = load_batch(path)?;
    let experiments = plan(&batch, path)?;
    let engine = AlphaMeltsEngine::new(&batch.engine).context("configure engine")?;
    let log = BatchLog::open(&batch.log_path())?;

    let mut options = RunOptions {
        overwrite: overwrite || batch.run.overwrite,
        exclude: batch.run.exclude.clone(),
        superliquidus_start: batch.run.superliquidus_start && !subsolidus,
        log_transcript: batch.run.log_transcript,
    };
    options.exclude.extend(exclude);

    let job = Batch::new(
        experiments,
        batch.base_dir.clone(),
        engine,
        log,
        batch.run.seconds_per_run,
    );
    let outcome = job.run(&options);

    for record in &outcome.records {
        if record.status == RunStatus::Failed {
            eprintln!(
                "failed: {} ({})",
                record.name,
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "succeeded: {}, failed: {}, skipped: {} in {}",
        outcome.count(RunStatus::Succeeded),
        outcome.count(RunStatus::Failed),
        outcome.count(RunStatus::Skipped),
        format_duration(outcome.elapsed)
    );
    println!("summary: {}", outcome.summary_path.display());

    Ok(if outcome.has_failures() {
        exit_codes::FAILED_RUNS
    } else {
        exit_codes::OK
    })
}

fn plan(batch: &BatchFile, path: &Path) -> Result<Vec<Experiment>> {
    build_experiment_set(&batch.default, &batch.grid, &batch.compositions, &batch.env)
        .with_context(|| format!("plan {}", path.display()))
}
