//! Diagnostic tracing for meltsbatch.
//!
//! Diagnostics go to stderr and are never persisted. The product log is the
//! batch log (`io::batch_log`), written to `autolog.log` regardless of any
//! filter set here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset, by `-v` count.
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "meltsbatch=info,warn",
        _ => "meltsbatch=debug,info",
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins over `verbosity` when set, e.g.
/// `RUST_LOG=meltsbatch::io::session=debug meltsbatch run batch.toml`.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
