//! Append-only JSONL request log.
//!
//! Every entry is also mirrored to `tracing`, so the file is an optional
//! machine-readable companion to the console output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            request_id: None,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }

    fn trace(&self) {
        let rid = self.request_id.as_deref().unwrap_or("-");
        match self.level {
            LogLevel::Debug => {
                tracing::debug!(component = %self.component, request_id = rid, "{}", self.message)
            }
            LogLevel::Info => {
                tracing::info!(component = %self.component, request_id = rid, "{}", self.message)
            }
            LogLevel::Warn => {
                tracing::warn!(component = %self.component, request_id = rid, "{}", self.message)
            }
            LogLevel::Error => {
                tracing::error!(component = %self.component, request_id = rid, "{}", self.message)
            }
        }
    }
}

struct JsonlWriter {
    writer: BufWriter<File>,
}

impl JsonlWriter {
    fn open(file_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, entry: &LogEntry) {
        if let Ok(json) = serde_json::to_string(entry) {
            let _ = writeln!(self.writer, "{}", json);
            let _ = self.writer.flush();
        }
    }
}

/// Cloneable handle to the request log. A disabled logger only mirrors to `tracing`.
#[derive(Clone)]
pub struct SharedLogger(Option<Arc<Mutex<JsonlWriter>>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let writer = JsonlWriter::open(file_path.as_ref())?;
        Ok(Self(Some(Arc::new(Mutex::new(writer)))))
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn log(&self, entry: LogEntry) {
        entry.trace();
        if let Some(ref inner) = self.0 {
            if let Ok(mut writer) = inner.lock() {
                writer.write(&entry);
            }
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    /// Log an entry tagged with the request it belongs to.
    pub fn request(
        &self,
        level: LogLevel,
        component: impl Into<String>,
        request_id: &str,
        message: impl Into<String>,
    ) {
        self.log(LogEntry::new(level, component, message).with_request_id(request_id));
    }
}
