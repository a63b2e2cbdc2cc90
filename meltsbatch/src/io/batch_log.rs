//! The batch log (`base_dir/autolog.log`).
//!
//! Product output, separate from `tracing` diagnostics: always written,
//! unaffected by `RUST_LOG`. Every line is mirrored to `tracing` so a
//! `RUST_LOG=meltsbatch=info` session shows the same story on stderr.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

/// Logger name prefix of every line.
const LOGGER: &str = "meltsbatch";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        })
    }
}

/// Append-only, line-oriented batch log.
#[derive(Debug)]
pub struct BatchLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl BatchLog {
    /// Open `path` for appending, creating it and its parent if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open batch log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, component: &str, message: &str) {
        info!(component, "{message}");
        self.append(component, Level::Info, message);
    }

    pub fn warn(&self, component: &str, message: &str) {
        warn!(component, "{message}");
        self.append(component, Level::Warning, message);
    }

    pub fn error(&self, component: &str, message: &str) {
        error!(component, "{message}");
        self.append(component, Level::Error, message);
    }

    /// Write one line. A failing log never aborts the batch.
    fn append(&self, component: &str, level: Level, message: &str) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let line = format_line(&timestamp, component, level, message);
        let Ok(mut file) = self.file.lock() else {
            warn!(path = %self.path.display(), "batch log lock poisoned");
            return;
        };
        if let Err(err) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
            warn!(path = %self.path.display(), err = %err, "failed to append to batch log");
        }
    }
}

fn format_line(timestamp: &str, component: &str, level: Level, message: &str) -> String {
    let mut line = String::new();
    for (idx, text) in message.lines().enumerate() {
        if idx == 0 {
            line.push_str(&format!("{timestamp} - {LOGGER}.{component} - {level} - {text}\n"));
        } else {
            // Continuation lines (transcript excerpts) stay attributable.
            line.push_str(&format!("    {text}\n"));
        }
    }
    if line.is_empty() {
        line = format!("{timestamp} - {LOGGER}.{component} - {level} - \n");
    }
    line
}
