//! Engine abstraction for run execution.
//!
//! The [`Engine`] trait decouples batch orchestration from the actual engine
//! backend (an alphaMELTS process driven over stdin/stdout). Tests use
//! scripted engines that never spawn a process.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use super::config::EngineSettings;
use super::readiness::MarkerDetector;
use super::session::{
    ProcessSession, SessionOptions, SessionState, TRANSCRIPT_TAIL_LINES, Transcript,
};
use crate::core::error::RunError;

/// File name of the session transcript inside the run folder.
pub const TRANSCRIPT_FILE_NAME: &str = "engine.log";

/// Menu selection that starts a single calculation sequence.
const SELECT_CALCULATION: &str = "3";
/// Menu selection that executes the configured path.
const EXECUTE: &str = "4";

/// The canonical command sequence: calculation mode, start condition, run.
pub fn command_sequence(superliquidus_start: bool) -> Vec<String> {
    let start = if superliquidus_start { "1" } else { "0" };
    vec![
        SELECT_CALCULATION.to_string(),
        start.to_string(),
        EXECUTE.to_string(),
    ]
}

/// Parameters for one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// Run folder; the engine's working directory.
    pub run_dir: PathBuf,
    /// Input file name, relative to `run_dir`.
    pub input_file: String,
    /// Environment file name, relative to `run_dir`.
    pub env_file: String,
    /// Commands to send, in order.
    pub commands: Vec<String>,
    /// Keep engine output in the transcript, not only the commands sent.
    pub log_output: bool,
}

/// What a finished engine invocation reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    pub state: SessionState,
    pub commands_sent: usize,
    pub transcript_path: PathBuf,
}

/// Abstraction over engine backends.
pub trait Engine {
    /// Drive one run to completion inside `request.run_dir`.
    fn run(&self, request: &EngineRequest) -> Result<EngineReport, RunError>;
}

/// Engine that spawns the alphaMELTS driver script.
#[derive(Debug, Clone)]
pub struct AlphaMeltsEngine {
    executable: String,
    args: Vec<String>,
    detector: MarkerDetector,
    options: SessionOptions,
}

impl AlphaMeltsEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let detector = MarkerDetector::new(
            &settings.prompt_patterns,
            &settings.finish_patterns,
            &settings.error_patterns,
            Duration::from_millis(settings.quiet_interval_ms),
        )?;
        Ok(Self {
            executable: settings.executable.clone(),
            args: settings.args.clone(),
            detector,
            options: SessionOptions {
                step_timeout: Duration::from_secs(settings.step_timeout_secs),
                poll_interval: Duration::from_millis(settings.poll_interval_ms),
                exit_grace: Duration::from_secs(settings.exit_grace_secs),
                output_limit_bytes: settings.output_limit_bytes,
            },
        })
    }

    fn command(&self, request: &EngineRequest) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(expand_args(&self.args, &request.input_file, &request.env_file))
            .current_dir(&request.run_dir);
        cmd
    }
}

impl Engine for AlphaMeltsEngine {
    #[instrument(skip_all, fields(run_dir = %request.run_dir.display(), commands = request.commands.len()))]
    fn run(&self, request: &EngineRequest) -> Result<EngineReport, RunError> {
        info!(executable = %self.executable, "starting engine");
        let mut session = ProcessSession::spawn(
            self.command(request),
            self.detector.clone(),
            self.options.clone(),
        )?;

        let result = session
            .write(&request.commands, true, request.log_output)
            .and_then(|()| session.finish());
        session.terminate();

        let transcript_path = request.run_dir.join(TRANSCRIPT_FILE_NAME);
        if let Err(err) = write_transcript(&transcript_path, session.transcript()) {
            warn!(err = %err, "failed to write engine transcript");
        }

        let state = result?;
        if state != SessionState::Completed {
            return Err(RunError::ProtocolFailure {
                reason: format!("engine session ended {state:?}"),
                transcript_tail: session.transcript().tail(TRANSCRIPT_TAIL_LINES),
            });
        }
        debug!(sent = session.transcript().send_count(), "engine run completed");
        Ok(EngineReport {
            state,
            commands_sent: session.transcript().send_count(),
            transcript_path,
        })
    }
}

/// Substitute `{input}` and `{env}` in the argument template.
pub fn expand_args(template: &[String], input_file: &str, env_file: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{input}", input_file).replace("{env}", env_file))
        .collect()
}

fn write_transcript(path: &Path, transcript: &Transcript) -> std::io::Result<()> {
    fs::write(path, transcript.render())
}
