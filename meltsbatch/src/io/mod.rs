//! I/O helpers for meltsbatch commands.

pub mod batch_log;
pub mod config;
pub mod engine;
pub mod folder;
pub mod readiness;
pub mod session;
pub mod summary;
