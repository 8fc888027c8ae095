//! Result types for batch runs
//!
//! This module contains the result types returned by the scheduler and the push
//! manager, providing a centralized location for output structures.

use crate::sequencer::SequenceOutcome;

/// What happened in one iteration of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Sequence(SequenceOutcome),
    /// Working tree was clean and skip-unchanged mode is on
    Skipped,
}

impl IterationOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            IterationOutcome::Sequence(outcome) => outcome.is_success(),
            IterationOutcome::Skipped => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationResult {
    /// 1-based
    pub index: u32,
    pub message: String,
    pub outcome: IterationOutcome,
}

/// Why a batch ended before running every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Iterations planned, including jitter
    pub planned: u32,
    pub iterations: Vec<IterationResult>,
    pub stopped: Option<StopReason>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.iterations
            .iter()
            .filter(|it| matches!(&it.outcome, IterationOutcome::Sequence(o) if o.is_success()))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.iterations
            .iter()
            .filter(|it| it.outcome == IterationOutcome::Skipped)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.iterations
            .iter()
            .filter(|it| !it.outcome.is_success())
            .count()
    }
}
