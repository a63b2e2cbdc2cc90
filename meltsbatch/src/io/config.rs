//! Batch configuration stored in a TOML batch file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::readiness::MarkerDetector;
use crate::core::grid::GridAxis;
use crate::core::timing::DEFAULT_SECONDS_PER_RUN;
use crate::core::types::{Composition, EnvironmentSpec, ExperimentConfig};

/// Starter batch file written by `meltsbatch init`.
pub const BATCH_TEMPLATE: &str = include_str!("templates/batch.toml");

/// A batch file (TOML).
///
/// Intended to be edited by hand. Missing sections take their defaults; the
/// experiment grid and compositions are checked later, when the batch is
/// planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchFile {
    /// Directory receiving run folders, the batch log and the summary.
    pub base_dir: PathBuf,
    pub run: RunSettings,
    pub engine: EngineSettings,
    /// Entries of every run's environment file.
    pub env: EnvironmentSpec,
    pub default: ExperimentConfig,
    pub grid: Vec<GridAxis>,
    pub compositions: Vec<Composition>,
}

impl Default for BatchFile {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("runs"),
            run: RunSettings::default(),
            engine: EngineSettings::default(),
            env: EnvironmentSpec::new(),
            default: ExperimentConfig::default(),
            grid: Vec::new(),
            compositions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Replace existing run folders instead of skipping them.
    pub overwrite: bool,
    /// Keys omitted from every input file, on top of per-config exclusions.
    pub exclude: Vec<String>,
    /// Start from a superliquidus initial guess (`1`) rather than subsolidus (`0`).
    pub superliquidus_start: bool,
    /// Advisory per-run duration used for the batch estimate.
    pub seconds_per_run: u64,
    /// Keep engine output in each run's transcript.
    pub log_transcript: bool,
    /// Batch log file name, relative to `base_dir`.
    pub log_file: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            overwrite: false,
            exclude: Vec::new(),
            superliquidus_start: true,
            seconds_per_run: DEFAULT_SECONDS_PER_RUN,
            log_transcript: true,
            log_file: "autolog.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable, resolved through `PATH` when not a path.
    pub executable: String,
    /// Startup arguments; `{input}` and `{env}` name the run's files.
    pub args: Vec<String>,
    /// Upper bound on waiting for readiness after one command.
    pub step_timeout_secs: u64,
    /// Silence after output that counts as readiness.
    pub quiet_interval_ms: u64,
    /// Time the engine gets to exit once its input is closed.
    pub exit_grace_secs: u64,
    pub poll_interval_ms: u64,
    /// Engine output kept in a run transcript; the rest is counted and dropped.
    pub output_limit_bytes: usize,
    /// Regexes marking an input prompt.
    pub prompt_patterns: Vec<String>,
    /// Regexes marking a finished calculation.
    pub finish_patterns: Vec<String>,
    /// Regexes marking an engine error.
    pub error_patterns: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            executable: "run_alphamelts.command".to_string(),
            args: ["-m", "{input}", "-f", "{env}"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            step_timeout_secs: 10 * 60,
            quiet_interval_ms: 1_000,
            exit_grace_secs: 5,
            poll_interval_ms: 50,
            output_limit_bytes: 1_000_000,
            prompt_patterns: vec![
                "(?i)your choice:".to_string(),
                r"(?i)initial guess\s*\?".to_string(),
            ],
            finish_patterns: Vec::new(),
            error_patterns: vec![r"(?mi)^\s*error\b".to_string()],
        }
    }
}

impl BatchFile {
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(anyhow!("base_dir must not be empty"));
        }
        if self.run.log_file.trim().is_empty() {
            return Err(anyhow!("run.log_file must not be empty"));
        }
        if self.engine.executable.trim().is_empty() {
            return Err(anyhow!("engine.executable must not be empty"));
        }
        if self.engine.step_timeout_secs == 0 {
            return Err(anyhow!("engine.step_timeout_secs must be > 0"));
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(anyhow!("engine.poll_interval_ms must be > 0"));
        }
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        if self
            .env
            .keys()
            .any(|key| key.trim().is_empty() || key.contains(char::is_whitespace))
        {
            return Err(anyhow!("env keys must be non-empty and contain no whitespace"));
        }
        MarkerDetector::new(
            &self.engine.prompt_patterns,
            &self.engine.finish_patterns,
            &self.engine.error_patterns,
            Duration::from_millis(self.engine.quiet_interval_ms),
        )
        .context("engine patterns")?;
        Ok(())
    }

    /// Path of the batch log.
    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(&self.run.log_file)
    }
}

/// Load and validate a batch file.
///
/// A relative `base_dir` is resolved against the batch file's directory.
pub fn load_batch(path: &Path) -> Result<BatchFile> {
    debug!(path = %path.display(), "loading batch file");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut batch: BatchFile =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    batch
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    if batch.base_dir.is_relative()
        && let Some(parent) = path.parent()
    {
        batch.base_dir = parent.join(&batch.base_dir);
    }
    debug!(
        base_dir = %batch.base_dir.display(),
        axes = batch.grid.len(),
        compositions = batch.compositions.len(),
        "batch file loaded"
    );
    Ok(batch)
}

/// Write the starter batch file to `path`.
///
/// Fails if the file exists unless `force` is set.
pub fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "meltsbatch init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_atomic(path, BATCH_TEMPLATE)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp batch file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace batch file {}", path.display()))?;
    Ok(())
}
