//! Timed repetition of sequence runs
//!
//! Repeats the add/commit/push sequence a number of times with a fixed delay
//! between iterations. A timeout of any kind ends the batch; an ordinary stage
//! failure ends it only when `stop_on_failure` is set.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::execution::CommandRunner;
use crate::preflight::has_changes;
use crate::results::{BatchReport, IterationOutcome, IterationResult, StopReason};
use crate::sequencer::GitSequencer;

/// How many times to run and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPlan {
    pub count: u32,
    pub interval: Duration,
    /// Up to this many extra runs, drawn uniformly per batch
    pub jitter: u32,
}

impl RepeatPlan {
    pub fn total_runs<G: Rng + ?Sized>(&self, rng: &mut G) -> u32 {
        if self.jitter == 0 {
            return self.count;
        }
        self.count.saturating_add(rng.gen_range(0..=self.jitter))
    }
}

/// What ends a batch besides running out of iterations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    pub stop_on_failure: bool,
    pub skip_unchanged: bool,
}

impl BatchPolicy {
    fn stop_reason(&self, outcome: &IterationOutcome) -> Option<StopReason> {
        match outcome {
            IterationOutcome::Sequence(outcome) if outcome.is_timeout() => Some(StopReason::Timeout),
            IterationOutcome::Sequence(outcome) if !outcome.is_success() && self.stop_on_failure => {
                Some(StopReason::Failure)
            }
            _ => None,
        }
    }
}

pub fn commit_message(prefix: &str, index: u32, at: DateTime<Utc>) -> String {
    format!(
        "{} #{} at {}",
        prefix,
        index,
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub struct Scheduler<'a, R: CommandRunner> {
    sequencer: GitSequencer<'a, R>,
    runner: &'a R,
    policy: BatchPolicy,
    interval: Duration,
    message_prefix: String,
}

impl<'a, R: CommandRunner> Scheduler<'a, R> {
    pub fn new(
        sequencer: GitSequencer<'a, R>,
        runner: &'a R,
        policy: BatchPolicy,
        interval: Duration,
        message_prefix: impl Into<String>,
    ) -> Self {
        Self {
            sequencer,
            runner,
            policy,
            interval,
            message_prefix: message_prefix.into(),
        }
    }

    /// Run `runs` iterations against `repo`
    pub async fn run_batch(&self, repo: &Path, runs: u32) -> BatchReport {
        let mut report = BatchReport {
            planned: runs,
            iterations: Vec::new(),
            stopped: None,
        };

        for index in 1..=runs {
            let message = commit_message(&self.message_prefix, index, Utc::now());
            info!(iteration = index, total = runs, %message, "starting push");

            let outcome = self.run_iteration(repo, &message).await;
            let stop = self.policy.stop_reason(&outcome);
            report.iterations.push(IterationResult {
                index,
                message,
                outcome,
            });

            if let Some(reason) = stop {
                warn!(iteration = index, ?reason, "stopping batch early");
                report.stopped = Some(reason);
                break;
            }
            if index < runs {
                info!(seconds = self.interval.as_secs(), "waiting before next push");
                tokio::time::sleep(self.interval).await;
            }
        }

        report
    }

    async fn run_iteration(&self, repo: &Path, message: &str) -> IterationOutcome {
        if self.policy.skip_unchanged {
            match has_changes(self.runner, repo, self.sequencer.excluded()).await {
                Ok(false) => {
                    info!("no changes detected, skipping commit");
                    return IterationOutcome::Skipped;
                }
                Ok(true) => {}
                // Let the sequence itself report whatever is wrong
                Err(e) => warn!(error = %e, "could not check for changes"),
            }
        }
        IterationOutcome::Sequence(self.sequencer.run_sequence(repo, message).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::execution::mock::{MockRunner, Scripted};
    use crate::run_log::MemoryLog;
    use crate::sequencer::{SequenceOutcome, Stage, StageTimeouts};

    fn scheduler<'a>(
        runner: &'a MockRunner,
        log: &'a MemoryLog,
        policy: BatchPolicy,
    ) -> Scheduler<'a, MockRunner> {
        let sequencer = GitSequencer::new(runner, log, StageTimeouts::default());
        Scheduler::new(sequencer, runner, policy, Duration::from_secs(120), "auto push")
    }

    fn nothing_to_commit() -> Scripted {
        Scripted::failure("nothing to commit, working tree clean", "", 1)
    }

    #[test]
    fn test_commit_message_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(
            commit_message("auto push", 3, at),
            "auto push #3 at 2024-05-01T08:30:00Z"
        );
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = RepeatPlan {
            count: 3,
            interval: Duration::from_secs(1),
            jitter: 2,
        };
        for _ in 0..100 {
            let runs = plan.total_runs(&mut rng);
            assert!((3..=5).contains(&runs));
        }

        let fixed = RepeatPlan { jitter: 0, ..plan };
        assert_eq!(fixed.total_runs(&mut rng), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_iteration_with_interval() {
        let runner = MockRunner::new();
        let log = MemoryLog::new();
        let started = tokio::time::Instant::now();

        let report = scheduler(&runner, &log, BatchPolicy::default())
            .run_batch(Path::new("/repo"), 3)
            .await;

        assert_eq!(report.iterations.len(), 3);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.stopped, None);
        assert_eq!(runner.executed_commands().len(), 9);
        // Two waits, none after the last run
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(240));
        assert!(elapsed < Duration::from_secs(241));
        assert!(report.iterations[1].message.starts_with("auto push #2 at "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_failure_continues_by_default() {
        let runner = MockRunner::with_responses(vec![
            Scripted::success(""),
            nothing_to_commit(),
            Scripted::success(""),
            Scripted::success(""),
            Scripted::success(""),
        ]);
        let log = MemoryLog::new();

        let report = scheduler(&runner, &log, BatchPolicy::default())
            .run_batch(Path::new("/repo"), 2)
            .await;

        assert_eq!(report.iterations.len(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.stopped, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_failure_stops_when_configured() {
        let runner = MockRunner::with_responses(vec![Scripted::success(""), nothing_to_commit()]);
        let log = MemoryLog::new();
        let policy = BatchPolicy {
            stop_on_failure: true,
            ..BatchPolicy::default()
        };

        let report = scheduler(&runner, &log, policy)
            .run_batch(Path::new("/repo"), 3)
            .await;

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.stopped, Some(StopReason::Failure));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_always_stops_batch() {
        let runner = MockRunner::with_responses(vec![
            Scripted::success(""),
            Scripted::success(""),
            Scripted::hang(),
        ]);
        let log = MemoryLog::new();

        let report = scheduler(&runner, &log, BatchPolicy::default())
            .run_batch(Path::new("/repo"), 5)
            .await;

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.stopped, Some(StopReason::Timeout));
        assert_eq!(
            report.iterations[0].outcome,
            IterationOutcome::Sequence(SequenceOutcome::StageTimeout {
                stage: Stage::Push,
                limit: Duration::from_secs(35),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_unchanged_skips_clean_tree() {
        let runner = MockRunner::with_responses(vec![
            // iteration 1: clean
            Scripted::success(""),
            // iteration 2: dirty, then add/commit/push
            Scripted::success(" M README.md\n"),
        ]);
        let log = MemoryLog::new();
        let policy = BatchPolicy {
            skip_unchanged: true,
            ..BatchPolicy::default()
        };

        let report = scheduler(&runner, &log, policy)
            .run_batch(Path::new("/repo"), 2)
            .await;

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.succeeded(), 1);
        let commit = format!("git commit -m {:?}", report.iterations[1].message);
        assert_eq!(
            runner.executed_commands(),
            vec![
                "git status --porcelain",
                "git status --porcelain",
                "git add -A",
                commit.as_str(),
                "git push",
            ]
        );
    }
}
