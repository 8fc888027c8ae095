//! Test-double runner that records commands and returns pre-configured outcomes.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::execution::command::CommandSpec;
use crate::execution::runner::{CapturedOutput, CommandOutcome, CommandRunner};
use crate::types::{AutopushError, AutopushResult};

/// A scripted response, optionally taking (virtual) time before it resolves
pub(crate) struct Scripted {
    delay: Duration,
    response: Result<CommandOutcome, String>,
}

impl Scripted {
    pub fn success(stdout: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Ok(CommandOutcome::Success {
                output: CapturedOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            }),
        }
    }

    pub fn failure(stdout: &str, stderr: &str, code: i32) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Ok(CommandOutcome::Failure {
                output: CapturedOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                exit_code: Some(code),
            }),
        }
    }

    /// Hangs; resolves as a timeout once the caller's limit has passed
    pub fn hang() -> Self {
        Self {
            delay: Duration::MAX,
            response: Err(String::new()),
        }
    }

    pub fn spawn_error(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Err(message.to_string()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub(crate) struct MockRunner {
    responses: Mutex<VecDeque<Scripted>>,
    commands: Mutex<Vec<(String, Duration)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> impl Future<Output = AutopushResult<CommandOutcome>> + Send {
        let command = spec.to_string();
        self.commands.lock().unwrap().push((command.clone(), timeout));
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::success(""));

        async move {
            if scripted.delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Ok(CommandOutcome::Timeout {
                    output: CapturedOutput::default(),
                    elapsed: timeout,
                });
            }
            tokio::time::sleep(scripted.delay).await;
            scripted.response.map_err(|message| AutopushError::Spawn {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_runner_records_commands_and_returns_in_order() {
        let runner = MockRunner::with_responses(vec![
            Scripted::success("first"),
            Scripted::failure("", "fail", 1),
        ]);
        let timeout = Duration::from_secs(1);

        let r1 = runner.run(&CommandSpec::shell("cmd1"), timeout).await.unwrap();
        let r2 = runner.run(&CommandSpec::shell("cmd2"), timeout).await.unwrap();
        let r3 = runner.run(&CommandSpec::shell("cmd3"), timeout).await.unwrap();

        assert_eq!(r1.output().stdout, "first");
        assert_eq!(r2.error_text(), "fail");
        assert!(r3.is_success());
        assert_eq!(runner.executed_commands(), vec!["cmd1", "cmd2", "cmd3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mock_runner_times_out_hanging_commands() {
        let runner = MockRunner::with_responses(vec![Scripted::hang()]);
        let outcome = runner
            .run(&CommandSpec::shell("git push"), Duration::from_secs(35))
            .await
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Timeout { elapsed, .. } if elapsed == Duration::from_secs(35)));
    }
}
