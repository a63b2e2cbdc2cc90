//! Batch-level lifecycle tests.
//!
//! These drive `Batch::run` with a scripted engine to verify folder
//! materialization, skip/overwrite semantics, failure isolation and the
//! ordering of the batch log.

use std::fs;
use std::path::PathBuf;

use meltsbatch::batch::{Batch, RunOptions};
use meltsbatch::core::error::{FailureKind, RunError};
use meltsbatch::core::grid::GridAxis;
use meltsbatch::core::plan::build_experiment_set;
use meltsbatch::core::types::{CompositionOverride, EnvironmentSpec};
use meltsbatch::io::batch_log::BatchLog;
use meltsbatch::io::engine::{Engine, EngineReport, EngineRequest};
use meltsbatch::io::summary::{RunStatus, load_summary};
use meltsbatch::test_support::{
    ScriptedEngine, ScriptedRun, TestBase, composition, default_config, sample_experiments,
};

fn composition_total(melts: &str) -> f64 {
    melts
        .lines()
        .filter_map(|line| line.strip_prefix("Initial Composition: "))
        .filter_map(|rest| rest.split_whitespace().nth(1))
        .map(|value| value.parse::<f64>().expect("number"))
        .sum()
}

/// Full lifecycle: first run materializes and runs all six experiments,
/// a rerun skips them all, and deleting one folder reruns only that one.
#[test]
fn rerun_skips_existing_folders() {
    let base = TestBase::new().expect("base");

    let batch = base.batch(sample_experiments(), ScriptedEngine::always_ok()).expect("batch");
    let first = batch.run(&RunOptions::default());
    assert_eq!(first.count(RunStatus::Succeeded), 6);
    assert_eq!(batch.engine().requests().len(), 6);

    for record in &first.records {
        let input = record.path.join(format!("{}.melts", record.name));
        assert!(input.is_file(), "missing {}", input.display());
        assert!(record.path.join("environment.txt").is_file());
        assert!(record.path.join("engine.log").is_file());
    }

    // Second invocation: nothing to do.
    let batch = base.batch(sample_experiments(), ScriptedEngine::always_ok()).expect("batch");
    let second = batch.run(&RunOptions::default());
    assert_eq!(second.count(RunStatus::Skipped), 6);
    assert!(batch.engine().requests().is_empty());
    assert!(second.run_paths().is_empty());

    // Remove one folder: only that experiment runs again.
    let removed = first.records[3].path.clone();
    fs::remove_dir_all(&removed).expect("remove folder");
    let batch = base.batch(sample_experiments(), ScriptedEngine::always_ok()).expect("batch");
    let third = batch.run(&RunOptions::default());
    assert_eq!(third.count(RunStatus::Succeeded), 1);
    assert_eq!(third.count(RunStatus::Skipped), 5);
    assert_eq!(third.run_paths(), vec![removed.as_path()]);

    let summary = load_summary(&third.summary_path).expect("summary");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 5);
    assert_eq!(summary.estimated_secs, 36);
}

#[test]
fn overwrite_reruns_every_experiment() {
    let base = TestBase::new().expect("base");

    base.batch(sample_experiments(), ScriptedEngine::always_ok())
        .expect("batch")
        .run(&RunOptions::default());
    let stale = base.path().join(&sample_experiments()[0].name).join("stale.tbl");
    fs::write(&stale, "old").expect("write stale");

    let batch = base.batch(sample_experiments(), ScriptedEngine::always_ok()).expect("batch");
    let outcome = batch.run(&RunOptions {
        overwrite: true,
        ..RunOptions::default()
    });
    assert_eq!(outcome.count(RunStatus::Succeeded), 6);
    assert_eq!(batch.engine().requests().len(), 6);
    assert!(!stale.exists());
}

/// A failing run is logged with its transcript and the batch moves on.
#[test]
fn failed_run_does_not_stop_the_batch() {
    let base = TestBase::new().expect("base");
    let engine = ScriptedEngine::new(vec![
        ScriptedRun::Complete,
        ScriptedRun::Fail("engine reported an error: ERROR liquidus not found".to_string()),
    ]);

    let batch = base.batch(sample_experiments(), engine).expect("batch");
    let outcome = batch.run(&RunOptions::default());

    assert_eq!(outcome.count(RunStatus::Failed), 1);
    assert_eq!(outcome.count(RunStatus::Succeeded), 5);
    let failed = &outcome.records[1];
    assert_eq!(failed.failure, Some(FailureKind::ProtocolFailure));
    assert!(failed.path.is_dir());

    let log = base.read_log().expect("read log");
    assert!(log.contains(&format!("{} failed after", failed.name)));
    assert!(log.contains("engine transcript (tail):"));
    assert!(log.contains(" - meltsbatch.run - ERROR - "));
}

/// Log lines of run N all precede those of run N+1, bracketed by the
/// estimate and the completion line.
#[test]
fn batch_log_is_ordered_per_run() {
    let base = TestBase::new().expect("base");
    let experiments = sample_experiments();
    let names: Vec<String> = experiments.iter().map(|exp| exp.name.clone()).collect();

    base.batch(experiments, ScriptedEngine::always_ok())
        .expect("batch")
        .run(&RunOptions::default());

    let log = base.read_log().expect("read log");
    let messages: Vec<&str> = log
        .lines()
        .filter_map(|line| line.splitn(4, " - ").nth(3))
        .collect();

    assert_eq!(messages[0], "Estimated Calculation Time: 0:00:36");
    assert_eq!(messages[1], "Starting 6 Calculations.");
    for (idx, name) in names.iter().enumerate() {
        let base_idx = 2 + idx * 3;
        assert_eq!(messages[base_idx], format!("Start {name}."));
        assert_eq!(messages[base_idx + 1], format!("Finished {name}."));
        assert!(messages[base_idx + 2].starts_with(&format!("[{}/6] ", idx + 1)));
    }
    assert!(
        messages
            .last()
            .expect("last line")
            .starts_with("Calculations Complete after ")
    );
}

/// Composition overrides fix the modified components and renormalize the
/// rest; batch-level exclusions drop keys from every input file.
#[test]
fn modify_chem_and_exclusions_shape_input_files() {
    let base = TestBase::new().expect("base");

    let overrides: Vec<CompositionOverride> = [0.5, 2.0]
        .into_iter()
        .map(|water| [("H2O".to_string(), water)].into())
        .collect();
    let experiments = build_experiment_set(
        &default_config(),
        &[GridAxis::ModifyChem {
            modify_chem: overrides,
        }],
        &[composition("A", 50.0)],
        &EnvironmentSpec::new(),
    )
    .expect("plan");
    assert_eq!(experiments.len(), 3);

    let batch = base.batch(experiments, ScriptedEngine::always_ok()).expect("batch");
    let outcome = batch.run(&RunOptions {
        exclude: vec!["log fo2 Path".to_string()],
        ..RunOptions::default()
    });
    assert_eq!(outcome.count(RunStatus::Succeeded), 3);

    for (record, water) in outcome.records[1..].iter().zip([0.5, 2.0]) {
        let melts = base.read_input(&record.name).expect("read input");
        assert!((composition_total(&melts) - 100.0).abs() < 1e-4);
        assert!(melts.contains(&format!("Initial Composition: H2O {water}\n")));
        assert!(!melts.contains("log fo2 Path"));
        assert!(melts.contains(&format!("Title: {}\n", record.name)));
    }
}

#[test]
fn subsolidus_start_sends_zero() {
    let base = TestBase::new().expect("base");
    let batch = base
        .batch(sample_experiments(), ScriptedEngine::always_ok())
        .expect("batch");
    batch.run(&RunOptions {
        superliquidus_start: false,
        ..RunOptions::default()
    });
    for request in batch.engine().requests() {
        assert_eq!(request.commands, vec!["3", "0", "4"]);
    }
}

/// Engine double that claims another run's folder while it runs, the way a
/// concurrent batch over the same base directory would.
struct ClaimingEngine {
    inner: ScriptedEngine,
    claim: PathBuf,
}

impl Engine for ClaimingEngine {
    fn run(&self, request: &EngineRequest) -> Result<EngineReport, RunError> {
        fs::create_dir_all(&self.claim).map_err(|err| RunError::io("claim folder", err))?;
        self.inner.run(request)
    }
}

#[test]
fn folder_claimed_after_the_scan_is_skipped() {
    let base = TestBase::new().expect("base");
    let experiments = sample_experiments();
    let claimed = base.path().join(&experiments[1].name);
    let engine = ClaimingEngine {
        inner: ScriptedEngine::always_ok(),
        claim: claimed.clone(),
    };
    let log = BatchLog::open(&base.path().join(TestBase::LOG_FILE)).expect("log");
    let batch = Batch::new(experiments, base.path(), engine, log, 6);

    let outcome = batch.run(&RunOptions::default());
    assert_eq!(outcome.records[1].status, RunStatus::Skipped);
    assert_eq!(outcome.records[1].path, claimed);
    assert!(!outcome.has_failures());
    assert_eq!(outcome.count(RunStatus::Succeeded), 5);
    // The claimed folder was left alone.
    assert!(fs::read_dir(&claimed).expect("read claimed").next().is_none());
    assert!(
        base.read_log()
            .expect("log")
            .contains("folder claimed by another run")
    );
}
