//! Test-only engine doubles and experiment fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::batch::Batch;
use crate::core::error::RunError;
use crate::core::grid::GridAxis;
use crate::core::plan::build_experiment_set;
use crate::core::types::{Composition, EnvironmentSpec, Experiment, ExperimentConfig, ParamValue};
use crate::io::batch_log::BatchLog;
use crate::io::engine::{Engine, EngineReport, EngineRequest, TRANSCRIPT_FILE_NAME};
use crate::io::session::SessionState;

/// What a [`ScriptedEngine`] does for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRun {
    Complete,
    TimeOut,
    Fail(String),
}

/// Engine double that never spawns a process.
///
/// Each call pops the next scripted outcome; once the script is exhausted
/// every run completes. Requests are recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: RefCell<VecDeque<ScriptedRun>>,
    requests: RefCell<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.borrow().clone()
    }
}

impl Engine for ScriptedEngine {
    fn run(&self, request: &EngineRequest) -> Result<EngineReport, RunError> {
        self.requests.borrow_mut().push(request.clone());
        let step = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or(ScriptedRun::Complete);

        let transcript: String = request
            .commands
            .iter()
            .map(|command| format!("> {command}\n"))
            .collect();
        let transcript_path = request.run_dir.join(TRANSCRIPT_FILE_NAME);
        fs::write(&transcript_path, &transcript)
            .map_err(|err| RunError::io("write scripted transcript", err))?;

        match step {
            ScriptedRun::Complete => Ok(EngineReport {
                state: SessionState::Completed,
                commands_sent: request.commands.len(),
                transcript_path,
            }),
            ScriptedRun::TimeOut => Err(RunError::ProtocolTimeout {
                timeout: Duration::from_secs(1),
                sent: 1,
                total: request.commands.len(),
                transcript_tail: transcript,
            }),
            ScriptedRun::Fail(reason) => Err(RunError::ProtocolFailure {
                reason,
                transcript_tail: transcript,
            }),
        }
    }
}

/// A two-component composition labelled `label`.
pub fn composition(label: &str, sio2: f64) -> Composition {
    Composition {
        label: Some(label.to_string()),
        components: [
            ("SiO2".to_string(), sio2),
            ("MgO".to_string(), 100.0 - sio2),
        ]
        .into(),
    }
}

/// Default configuration used across fixtures: isobaric cooling at 5 kbar.
pub fn default_config() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    for (key, value) in [
        ("Initial Temperature", ParamValue::Number(1300.0)),
        ("Final Temperature", ParamValue::Number(800.0)),
        ("Increment Temperature", ParamValue::Number(-5.0)),
        ("Initial Pressure", ParamValue::Number(5000.0)),
        ("log fo2 Path", ParamValue::from("FMQ")),
    ] {
        config.params.insert(key.to_string(), value);
    }
    config.modes = vec!["Fractionate Solids".to_string()];
    config
}

/// Pressure axis with two values distinct from the default.
pub fn pressure_axis() -> GridAxis {
    GridAxis::Param {
        param: "Initial Pressure".to_string(),
        values: vec![ParamValue::Number(1000.0), ParamValue::Number(3000.0)],
    }
}

/// 1 default × 2-value grid × 2 compositions: six experiments.
pub fn sample_experiments() -> Vec<Experiment> {
    let env: EnvironmentSpec = [("ALPHAMELTS_MODE".to_string(), "isobaric".to_string())].into();
    let compositions = vec![composition("A", 50.0), composition("B", 45.0)];
    build_experiment_set(&default_config(), &[pressure_axis()], &compositions, &env)
        .expect("sample experiment set")
}

/// Temporary batch base directory with a batch log in it.
pub struct TestBase {
    dir: TempDir,
}

impl TestBase {
    pub const LOG_FILE: &str = "autolog.log";

    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp base dir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Bind `experiments` to `engine` under this base, at 6 s per run.
    pub fn batch(
        &self,
        experiments: Vec<Experiment>,
        engine: ScriptedEngine,
    ) -> Result<Batch<ScriptedEngine>> {
        let log = BatchLog::open(&self.path().join(Self::LOG_FILE))?;
        Ok(Batch::new(experiments, self.path(), engine, log, 6))
    }

    pub fn read_log(&self) -> Result<String> {
        let path = self.path().join(Self::LOG_FILE);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Contents of the input file of run `name`.
    pub fn read_input(&self, name: &str) -> Result<String> {
        let path = self.path().join(name).join(format!("{name}.melts"));
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
