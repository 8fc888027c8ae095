//! Autopush Core Library
//!
//! This is the core library for the autopush tool. It repeatedly stages, commits
//! and pushes a git working tree, with every external command bounded by a
//! timeout and the whole add/commit/push cycle bounded by an overall budget.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`execution`] - Bounded command runner and process tree termination
//! - [`sequencer`] - The staged add/commit/push sequence with its deadlines
//! - [`schedule`] - Timed repetition of sequences and the batch failure policy
//! - [`preflight`] - Repository and identity checks run before any sequence
//! - [`run_log`] - Structured run records and their sinks
//! - [`push_manager`] - High-level interface used by the CLI
//! - [`configs`] - Configuration file parsing
//! - [`results`] - Result types for batch runs
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autopush_core::execution::BoundedRunner;
//! use autopush_core::run_log::TracingLog;
//! use autopush_core::sequencer::{GitSequencer, StageTimeouts};
//! use std::path::Path;
//!
//! # async fn example() {
//! let runner = BoundedRunner::new();
//! let log = TracingLog;
//! let sequencer = GitSequencer::new(&runner, &log, StageTimeouts::default());
//!
//! let outcome = sequencer.run_sequence(Path::new("."), "auto push").await;
//! println!("{}", outcome);
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod preflight;
pub mod push_manager;
pub mod results;
pub mod run_log;
pub mod schedule;
pub mod sequencer;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

// Re-export the main types for easier usage
pub use push_manager::{PushManager, PushManagerConfig};
pub use sequencer::{SequenceOutcome, Stage, StageTimeouts};
pub use types::{AutopushError, AutopushResult};
