//! Batch orchestration for `meltsbatch run`.
//!
//! Runs are strictly sequential. A failing run is logged and recorded; it
//! never stops the batch. Plan-level defects never get here: they are
//! rejected while the experiment set is built.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{info, instrument, warn};

use crate::core::error::RunError;
use crate::core::meltsfile::ENV_FILE_NAME;
use crate::core::plan::prepare_run;
use crate::core::timing::{estimate_duration, format_duration};
use crate::core::types::Experiment;
use crate::io::batch_log::BatchLog;
use crate::io::engine::{Engine, EngineRequest, command_sequence};
use crate::io::folder::{RunFolder, materialize, run_dir};
use crate::io::summary::{BatchSummary, RunRecord, RunStatus, SUMMARY_FILE_NAME, write_summary};

/// Per-invocation knobs for [`Batch::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Replace existing run folders instead of skipping them.
    pub overwrite: bool,
    /// Keys excluded from every rendered input file.
    pub exclude: Vec<String>,
    pub superliquidus_start: bool,
    /// Keep engine output in run transcripts.
    pub log_transcript: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            exclude: Vec::new(),
            superliquidus_start: true,
            log_transcript: true,
        }
    }
}

/// Everything one [`Batch::run`] did.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub estimate: Duration,
    pub elapsed: Duration,
    /// One record per experiment, in experiment set order.
    pub records: Vec<RunRecord>,
    pub summary_path: PathBuf,
}

impl BatchOutcome {
    pub fn count(&self, status: RunStatus) -> usize {
        self.records
            .iter()
            .filter(|record| record.status == status)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(RunStatus::Failed) > 0
    }

    /// Folders of the runs attempted by this invocation.
    pub fn run_paths(&self) -> Vec<&Path> {
        self.records
            .iter()
            .filter(|record| record.status != RunStatus::Skipped)
            .map(|record| record.path.as_path())
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            started_at: self.started_at.to_rfc3339(),
            finished_at: self.finished_at.to_rfc3339(),
            estimated_secs: self.estimate.as_secs(),
            elapsed_secs: self.elapsed.as_secs_f64(),
            succeeded: self.count(RunStatus::Succeeded),
            failed: self.count(RunStatus::Failed),
            skipped: self.count(RunStatus::Skipped),
            runs: self.records.clone(),
        }
    }
}

/// An experiment set bound to an engine, a base directory and a log.
pub struct Batch<E: Engine> {
    experiments: Vec<Experiment>,
    base_dir: PathBuf,
    engine: E,
    log: BatchLog,
    estimate: Duration,
}

impl<E: Engine> Batch<E> {
    /// Bind `experiments` to `engine` and log the duration estimate.
    pub fn new(
        experiments: Vec<Experiment>,
        base_dir: impl Into<PathBuf>,
        engine: E,
        log: BatchLog,
        seconds_per_run: u64,
    ) -> Self {
        let estimate = estimate_duration(experiments.len(), seconds_per_run);
        log.info(
            "batch",
            &format!("Estimated Calculation Time: {}", format_duration(estimate)),
        );
        Self {
            experiments,
            base_dir: base_dir.into(),
            engine,
            log,
            estimate,
        }
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn estimate(&self) -> Duration {
        self.estimate
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn log(&self) -> &BatchLog {
        &self.log
    }

    /// Run every experiment in order.
    ///
    /// Without `overwrite`, experiments whose folder already exists are
    /// skipped, whatever the outcome of the earlier attempt. A folder claimed
    /// by someone else after that check is a skip too.
    #[instrument(skip_all, fields(experiments = self.experiments.len(), overwrite = options.overwrite))]
    pub fn run(&self, options: &RunOptions) -> BatchOutcome {
        let started_at = Local::now();
        let started = Instant::now();

        let pending: Vec<bool> = self
            .experiments
            .iter()
            .map(|experiment| {
                options.overwrite || !run_dir(&self.base_dir, &experiment.name).exists()
            })
            .collect();
        let total = pending.iter().filter(|&&is_pending| is_pending).count();
        let skipped = self.experiments.len() - total;
        if skipped > 0 {
            self.log.info(
                "batch",
                &format!("Skipping {skipped} experiments with existing folders."),
            );
        }
        self.log.info("batch", &format!("Starting {total} Calculations."));

        let mut records = Vec::with_capacity(self.experiments.len());
        let mut index = 0;
        for (experiment, pending) in self.experiments.iter().zip(pending) {
            let path = run_dir(&self.base_dir, &experiment.name);
            if !pending {
                info!(run = %experiment.name, "run folder exists, skipping");
                records.push(RunRecord {
                    name: experiment.name.clone(),
                    status: RunStatus::Skipped,
                    path,
                    elapsed_secs: 0.0,
                    failure: None,
                    error: None,
                });
                continue;
            }

            index += 1;
            self.log.info("run", &format!("Start {}.", experiment.name));
            let run_started = Instant::now();
            let result = run_experiment(experiment, &self.base_dir, &self.engine, options);
            let elapsed = run_started.elapsed();

            let record = match result {
                Ok(folder) => {
                    self.log.info("run", &format!("Finished {}.", experiment.name));
                    RunRecord {
                        name: experiment.name.clone(),
                        status: RunStatus::Succeeded,
                        path: folder.dir,
                        elapsed_secs: elapsed.as_secs_f64(),
                        failure: None,
                        error: None,
                    }
                }
                Err(RunError::FolderExists { path }) => {
                    self.log.info(
                        "run",
                        &format!("Skipping {}: folder claimed by another run.", experiment.name),
                    );
                    RunRecord {
                        name: experiment.name.clone(),
                        status: RunStatus::Skipped,
                        path,
                        elapsed_secs: elapsed.as_secs_f64(),
                        failure: None,
                        error: None,
                    }
                }
                Err(err) => {
                    self.log_failure(&experiment.name, elapsed, &err);
                    RunRecord {
                        name: experiment.name.clone(),
                        status: RunStatus::Failed,
                        path,
                        elapsed_secs: elapsed.as_secs_f64(),
                        failure: Some(err.kind()),
                        error: Some(err.to_string()),
                    }
                }
            };
            records.push(record);
            self.log.info(
                "batch",
                &format!(
                    "[{index}/{total}] {} elapsed",
                    format_duration(started.elapsed())
                ),
            );
        }

        let elapsed = started.elapsed();
        self.log.info(
            "batch",
            &format!("Calculations Complete after {}", format_duration(elapsed)),
        );

        let outcome = BatchOutcome {
            started_at,
            finished_at: Local::now(),
            estimate: self.estimate,
            elapsed,
            records,
            summary_path: self.base_dir.join(SUMMARY_FILE_NAME),
        };
        if let Err(err) = write_summary(&outcome.summary_path, &outcome.summary()) {
            warn!(err = %format!("{err:#}"), "failed to write batch summary");
            self.log
                .warn("batch", &format!("Could not write batch summary: {err:#}"));
        }
        outcome
    }

    fn log_failure(&self, name: &str, elapsed: Duration, err: &RunError) {
        let mut message = format!(
            "{name} failed after {:.1}s ({:?}): {err}",
            elapsed.as_secs_f64(),
            err.kind()
        );
        if let Some(tail) = err.transcript_tail()
            && !tail.trim().is_empty()
        {
            message.push_str("\nengine transcript (tail):\n");
            message.push_str(tail);
        }
        self.log.error("run", &message);
    }
}

/// Materialize one experiment's folder and drive the engine through it.
///
/// Usable on its own for a single run outside a batch.
#[instrument(skip_all, fields(run = %experiment.name))]
pub fn run_experiment<E: Engine>(
    experiment: &Experiment,
    base_dir: &Path,
    engine: &E,
    options: &RunOptions,
) -> Result<RunFolder, RunError> {
    let prepared = prepare_run(experiment, &options.exclude)?;
    let folder = materialize(base_dir, &prepared, &experiment.env, options.overwrite)?;
    let report = engine.run(&EngineRequest {
        run_dir: folder.dir.clone(),
        input_file: folder.input_file.clone(),
        env_file: ENV_FILE_NAME.to_string(),
        commands: command_sequence(options.superliquidus_start),
        log_output: options.log_transcript,
    })?;
    info!(
        sent = report.commands_sent,
        transcript = %report.transcript_path.display(),
        "run completed"
    );
    Ok(folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FailureKind;
    use crate::test_support::{ScriptedEngine, ScriptedRun, sample_experiments};

    fn batch(temp: &Path, engine: ScriptedEngine) -> Batch<ScriptedEngine> {
        let log = BatchLog::open(&temp.join("autolog.log")).expect("log");
        Batch::new(sample_experiments(), temp, engine, log, 6)
    }

    #[test]
    fn estimate_is_count_times_seconds_per_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let batch = batch(temp.path(), ScriptedEngine::always_ok());
        assert_eq!(batch.experiments().len(), 6);
        assert_eq!(batch.estimate(), Duration::from_secs(36));

        let log = std::fs::read_to_string(batch.log().path()).expect("read log");
        assert!(log.contains("Estimated Calculation Time: 0:00:36"));
    }

    #[test]
    fn failures_are_recorded_and_the_batch_continues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = ScriptedEngine::new(vec![
            ScriptedRun::Complete,
            ScriptedRun::TimeOut,
            ScriptedRun::Complete,
        ]);
        let batch = batch(temp.path(), engine);
        let outcome = batch.run(&RunOptions::default());

        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.records[1].status, RunStatus::Failed);
        assert_eq!(
            outcome.records[1].failure,
            Some(FailureKind::ProtocolTimeout)
        );
        assert_eq!(outcome.count(RunStatus::Succeeded), 5);
        assert!(outcome.has_failures());
        assert_eq!(outcome.run_paths().len(), 6);
        assert!(outcome.summary_path.is_file());
    }

    #[test]
    fn superliquidus_flag_reaches_the_engine() {
        let temp = tempfile::tempdir().expect("tempdir");
        let batch = batch(temp.path(), ScriptedEngine::always_ok());
        batch.run(&RunOptions {
            superliquidus_start: false,
            ..RunOptions::default()
        });

        let requests = batch.engine.requests();
        assert_eq!(requests.len(), 6);
        assert!(requests.iter().all(|request| request.commands == ["3", "0", "4"]));
        assert!(requests
            .iter()
            .all(|request| request.input_file.ends_with(".melts")));
    }

    #[test]
    fn single_experiment_runs_without_a_batch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let experiment = &sample_experiments()[0];
        let engine = ScriptedEngine::always_ok();

        let folder = run_experiment(experiment, temp.path(), &engine, &RunOptions::default())
            .expect("run");
        assert_eq!(folder.dir, temp.path().join(&experiment.name));
        assert!(folder.input_path.is_file());
        assert_eq!(engine.requests()[0].commands, ["3", "1", "4"]);

        let err = run_experiment(experiment, temp.path(), &engine, &RunOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::FolderExists);
    }
}
