//! Task Tree — a command-line task runner with per-task incremental
//! freshness.
//!
//! Tasks declared in YAML recipes are re-run only when their definition,
//! their inputs, or their invocation arguments changed since the last
//! successful run. Freshness is tracked with mtimes against a persistent
//! state file keyed by BLAKE3 fingerprints.

pub mod cli;
pub mod core;
pub mod error;
pub mod shell;
