//! Stable exit codes for meltsbatch CLI commands.

/// Command succeeded; every run succeeded or was skipped.
pub const OK: i32 = 0;
/// Invalid batch file or experiment plan, or another fatal error.
pub const INVALID: i32 = 1;
/// `meltsbatch run` finished with at least one failed run.
pub const FAILED_RUNS: i32 = 2;
