use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schedule::RepeatPlan;
use crate::sequencer::StageTimeouts;
use crate::types::{AutopushError, AutopushResult};

/// File looked up in the repository root when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "autopush.yml";

pub const DEFAULT_MESSAGE_PREFIX: &str = "auto push";

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PushConfig {
    pub timeouts: Option<TimeoutConfig>,
    pub repeat: Option<RepeatConfig>,
    /// Commit messages are "<prefix> #<n> at <timestamp>"
    pub message_prefix: Option<String>,
    /// Stop the batch after an ordinary stage failure (timeouts always stop it)
    pub stop_on_failure: Option<bool>,
    /// Skip iterations when `git status --porcelain` is empty
    pub skip_unchanged: Option<bool>,
    /// Append JSON-lines run records to this file, relative to the repository root
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutConfig {
    pub add_secs: Option<u64>,
    pub commit_secs: Option<u64>,
    pub push_secs: Option<u64>,
    pub overall_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepeatConfig {
    pub count: Option<u32>,
    pub interval_secs: Option<u64>,
    /// Up to this many extra repetitions, chosen at random per batch
    pub jitter: Option<u32>,
}

pub fn parse_push_config(yaml_str: &str) -> AutopushResult<PushConfig> {
    let config: PushConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

/// Load the config file. An explicit path must exist; the default file in the
/// repository root is optional.
pub fn load_push_config(repo: &Path, explicit: Option<&Path>) -> AutopushResult<PushConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = repo.join(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(PushConfig::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        AutopushError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    parse_push_config(&content).map_err(|e| {
        AutopushError::Config(format!("Failed to parse config {}: {}", path.display(), e))
    })
}

/// JSON schema of the config file
pub fn push_config_schema() -> AutopushResult<String> {
    let schema = schemars::schema_for!(PushConfig);
    serde_json::to_string_pretty(&schema)
        .map_err(|e| AutopushError::Config(format!("Failed to render schema: {}", e)))
}

/// Values given on the command line; `Some` wins over the file
#[derive(Debug, Default, Clone)]
pub struct PushOverrides {
    pub count: Option<u32>,
    pub interval_secs: Option<u64>,
    pub jitter: Option<u32>,
    pub message_prefix: Option<String>,
    pub stop_on_failure: Option<bool>,
    pub skip_unchanged: Option<bool>,
    pub log_file: Option<PathBuf>,
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct PushSettings {
    pub timeouts: StageTimeouts,
    pub repeat: RepeatPlan,
    pub message_prefix: String,
    pub stop_on_failure: bool,
    pub skip_unchanged: bool,
    pub log_file: Option<PathBuf>,
}

impl PushSettings {
    pub fn resolve(
        repo: &Path,
        config: &PushConfig,
        overrides: &PushOverrides,
    ) -> AutopushResult<Self> {
        let defaults = StageTimeouts::default();
        let file_timeouts = config.timeouts.clone().unwrap_or_default();
        let timeouts = StageTimeouts {
            add: secs_or("addSecs", file_timeouts.add_secs, defaults.add)?,
            commit: secs_or("commitSecs", file_timeouts.commit_secs, defaults.commit)?,
            push: secs_or("pushSecs", file_timeouts.push_secs, defaults.push)?,
            overall: secs_or("overallSecs", file_timeouts.overall_secs, defaults.overall)?,
        };

        let file_repeat = config.repeat.clone().unwrap_or_default();
        let count = overrides.count.or(file_repeat.count).unwrap_or(1);
        if count == 0 {
            return Err(AutopushError::Config(
                "repeat count must be at least 1".to_string(),
            ));
        }
        let repeat = RepeatPlan {
            count,
            interval: Duration::from_secs(
                overrides
                    .interval_secs
                    .or(file_repeat.interval_secs)
                    .unwrap_or(60),
            ),
            jitter: overrides.jitter.or(file_repeat.jitter).unwrap_or(0),
        };

        let message_prefix = overrides
            .message_prefix
            .clone()
            .or_else(|| config.message_prefix.clone())
            .unwrap_or_else(|| DEFAULT_MESSAGE_PREFIX.to_string());
        if message_prefix.trim().is_empty() {
            return Err(AutopushError::Config(
                "message prefix must not be empty".to_string(),
            ));
        }

        let log_file = overrides
            .log_file
            .clone()
            .or_else(|| config.log_file.clone())
            .map(|path| if path.is_relative() { repo.join(path) } else { path });

        Ok(Self {
            timeouts,
            repeat,
            message_prefix,
            stop_on_failure: overrides
                .stop_on_failure
                .or(config.stop_on_failure)
                .unwrap_or(false),
            skip_unchanged: overrides
                .skip_unchanged
                .or(config.skip_unchanged)
                .unwrap_or(false),
            log_file,
        })
    }
}

fn secs_or(key: &str, value: Option<u64>, default: Duration) -> AutopushResult<Duration> {
    match value {
        Some(0) => Err(AutopushError::Config(format!(
            "timeouts.{} must be greater than zero",
            key
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
