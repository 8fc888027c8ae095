//! Structured run records
//!
//! The sequencer does not configure any process-wide logger. It writes records
//! to a [`RunLog`] handed to it by the caller: one record per stage attempt and
//! one summary record per sequence run. Sinks forward records to `tracing`,
//! append them to a JSON-lines file, or keep them in memory.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::AutopushResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        f.write_str(name)
    }
}

/// One structured record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Append-only sink for run records
pub trait RunLog: Send + Sync {
    fn record(&self, record: LogRecord);
}

impl<T: RunLog + ?Sized> RunLog for Arc<T> {
    fn record(&self, record: LogRecord) {
        (**self).record(record)
    }
}

/// Forwards records to `tracing` at the matching level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl RunLog for TracingLog {
    fn record(&self, record: LogRecord) {
        let fields = Value::Object(record.fields);
        match record.level {
            Level::Debug => tracing::debug!(%fields, "{}", record.message),
            Level::Info => tracing::info!(%fields, "{}", record.message),
            Level::Warn => tracing::warn!(%fields, "{}", record.message),
            Level::Error => tracing::error!(%fields, "{}", record.message),
        }
    }
}

/// Appends one JSON object per line to a file
pub struct JsonFileLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonFileLog {
    pub fn open(path: impl AsRef<Path>) -> AutopushResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLog for JsonFileLog {
    fn record(&self, record: LogRecord) {
        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize run record");
                return;
            }
        };
        line.push('\n');

        let Ok(mut file) = self.file.lock() else {
            tracing::warn!(path = %self.path.display(), "run log file lock poisoned");
            return;
        };
        // Single write per record so each line lands whole
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append run record");
        }
    }
}

/// Sends every record to each inner sink
#[derive(Default)]
pub struct TeeLog {
    sinks: Vec<Box<dyn RunLog>>,
}

impl TeeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl RunLog + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl RunLog for TeeLog {
    fn record(&self, record: LogRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(record.clone());
            }
            last.record(record);
        }
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl RunLog for MemoryLog {
    fn record(&self, record: LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
