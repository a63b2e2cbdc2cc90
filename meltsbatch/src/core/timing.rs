//! Advisory duration estimates.

use std::time::Duration;

/// Empirical wall time of one isobaric run at 10 degree steps.
pub const DEFAULT_SECONDS_PER_RUN: u64 = 6;

/// Estimate total wall time for `experiment_count` runs.
///
/// Not refined from observed durations while the batch runs.
pub fn estimate_duration(experiment_count: usize, seconds_per_run: u64) -> Duration {
    Duration::from_secs(seconds_per_run.saturating_mul(experiment_count as u64))
}

/// Format as `H:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
