//! Command execution module
//!
//! This module handles launching external commands under a wall-clock budget,
//! including output capture and termination of the whole process tree on expiry.

pub mod command;
#[cfg(test)]
pub(crate) mod mock;
pub mod process_tree;
pub mod runner;

pub use command::CommandSpec;
pub use process_tree::{platform_killer, DirectChildKiller, ProcessTreeKiller};
#[cfg(unix)]
pub use process_tree::ProcessGroupKiller;
pub use runner::{BoundedRunner, CapturedOutput, CommandExecution, CommandOutcome, CommandRunner};
