//! Error kinds surfaced by planning and by individual runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A defect in the batch configuration. Detected before any run launches
/// when it concerns the plan as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no compositions supplied")]
    NoCompositions,

    #[error("composition {index} has no components")]
    EmptyComposition { index: usize },

    #[error("component {component} has invalid value {value}")]
    InvalidComponent { component: String, value: f64 },

    #[error("grid axis {index} has no values")]
    EmptyAxis { index: usize },

    #[error("grid axis {index} has an empty parameter name")]
    EmptyAxisKey { index: usize },

    #[error("parameter {key} is varied by more than one grid axis")]
    DuplicateAxis { key: String },

    #[error("parameter {key} is reserved and cannot be set directly")]
    ReservedParam { key: String },

    #[error("run name {name} is produced by experiments {first} and {second}")]
    NameCollision {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("composition override fixes {fixed} wt%, more than the 100 wt% total")]
    OverrideExceedsTotal { fixed: f64 },

    #[error(
        "composition override fixes {fixed} wt% but no unmodified component is left to absorb the remainder"
    )]
    NothingToRenormalize { fixed: f64 },

    #[error("every component of run {name} is excluded")]
    NoRenderableComponents { name: String },
}

/// Failure classification recorded in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    FolderExists,
    ProcessSpawn,
    ProtocolTimeout,
    ProtocolFailure,
    Io,
}

/// Why a single run did not succeed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run folder {} already exists", path.display())]
    FolderExists { path: PathBuf },

    #[error("failed to spawn engine {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine not ready within {timeout:?} after {sent} of {total} commands")]
    ProtocolTimeout {
        timeout: Duration,
        sent: usize,
        total: usize,
        transcript_tail: String,
    },

    #[error("engine protocol failure: {reason}")]
    ProtocolFailure {
        reason: String,
        transcript_tail: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RunError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RunError::Config(_) => FailureKind::Config,
            RunError::FolderExists { .. } => FailureKind::FolderExists,
            RunError::ProcessSpawn { .. } => FailureKind::ProcessSpawn,
            RunError::ProtocolTimeout { .. } => FailureKind::ProtocolTimeout,
            RunError::ProtocolFailure { .. } => FailureKind::ProtocolFailure,
            RunError::Io { .. } => FailureKind::Io,
        }
    }

    /// Last lines of the engine transcript, when the failure came from the engine.
    pub fn transcript_tail(&self) -> Option<&str> {
        match self {
            RunError::ProtocolTimeout {
                transcript_tail, ..
            }
            | RunError::ProtocolFailure {
                transcript_tail, ..
            } => Some(transcript_tail.as_str()),
            _ => None,
        }
    }
}
