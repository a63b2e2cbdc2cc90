//! Per-batch result summary (`base_dir/batch_summary.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::FailureKind;

pub const SUMMARY_FILE_NAME: &str = "batch_summary.json";

/// Final status of one experiment in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub name: String,
    pub status: RunStatus,
    pub path: PathBuf,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted outcome of one `run` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: String,
    pub finished_at: String,
    pub estimated_secs: u64,
    pub elapsed_secs: f64,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub runs: Vec<RunRecord>,
}

/// Load a summary from disk.
pub fn load_summary(path: &Path) -> Result<BatchSummary> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read summary {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse summary {}", path.display()))
}

/// Atomically write the summary to disk (temp file + rename).
pub fn write_summary(path: &Path, summary: &BatchSummary) -> Result<()> {
    debug!(path = %path.display(), runs = summary.runs.len(), "writing batch summary");
    let mut buf = serde_json::to_string_pretty(summary)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("summary path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp summary {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace summary {}", path.display()))?;
    Ok(())
}
