use thiserror::Error;

/// The main error type for autopush operations
#[derive(Debug, Error)]
pub enum AutopushError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command error: {0}")]
    Command(String),
}

/// Result type alias for autopush operations
pub type AutopushResult<T> = Result<T, AutopushError>;
