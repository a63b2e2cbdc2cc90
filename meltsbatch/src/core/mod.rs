//! Deterministic, pure logic for batch planning.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod composition;
pub mod error;
pub mod grid;
pub mod meltsfile;
pub mod naming;
pub mod plan;
pub mod timing;
pub mod types;
