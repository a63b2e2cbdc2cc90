//! Batch automation of alphaMELTS runs.
//!
//! A batch is a grid of engine configurations crossed with a set of starting
//! compositions. Every experiment gets its own folder holding a rendered
//! input file and environment file; the engine is then driven through its
//! interactive menu over stdin/stdout. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (grid expansion, naming,
//!   composition overrides, input file rendering). No I/O.
//! - **[`io`]**: Side effects (run folders, engine sessions, batch log,
//!   configuration and summary files).
//!
//! [`batch`] coordinates the two for `meltsbatch run`.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
