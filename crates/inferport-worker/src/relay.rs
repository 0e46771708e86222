//! Structured log relay.
//!
//! Workers write one JSON [`LogRecord`] per line. The host parses each line
//! and re-emits it through `tracing` at the mapped level; anything that is
//! not a record is passed through at debug level.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};

use crate::engine::LogStream;

/// A file-generation event attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub status: String,
    pub path: String,
}

/// One structured log line on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    #[serde(rename = "msg", alias = "message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_event: Option<FileEvent>,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            file_event: None,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::from_level_name(&self.level)
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

/// Host-side severity of a relayed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Map a worker level name. Unknown names map to `Info`.
    pub fn from_level_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Severity::Trace,
            "DEBUG" => Severity::Debug,
            "INFO" => Severity::Info,
            "WARN" | "WARNING" => Severity::Warn,
            "ERROR" | "CRITICAL" | "FATAL" => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Wire name, as written by the worker runtime.
    pub fn level_name(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        if level == Level::ERROR {
            Severity::Error
        } else if level == Level::WARN {
            Severity::Warn
        } else if level == Level::INFO {
            Severity::Info
        } else if level == Level::DEBUG {
            Severity::Debug
        } else {
            Severity::Trace
        }
    }
}

/// A parsed output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relayed {
    Record(LogRecord),
    Raw(String),
}

pub fn parse_line(line: &str) -> Relayed {
    let line = line.trim();
    match serde_json::from_str::<LogRecord>(line) {
        Ok(record) => Relayed::Record(record),
        Err(_) => Relayed::Raw(line.to_string()),
    }
}

macro_rules! relay_at {
    ($level:expr, $worker:expr, $record:expr) => {{
        let event = $record.file_event.as_ref();
        tracing::event!(
            $level,
            worker = %$worker,
            file_status = event.map(|e| e.status.as_str()),
            file_path = event.map(|e| e.path.as_str()),
            "{}",
            $record.message
        )
    }};
}

/// Re-emit a worker record on the host.
pub fn emit_record(record: &LogRecord, worker: &str) {
    match record.severity() {
        Severity::Trace => relay_at!(Level::TRACE, worker, record),
        Severity::Debug => relay_at!(Level::DEBUG, worker, record),
        Severity::Info => relay_at!(Level::INFO, worker, record),
        Severity::Warn => relay_at!(Level::WARN, worker, record),
        Severity::Error => relay_at!(Level::ERROR, worker, record),
    }
}

/// Relay one raw output line. Returns the record if it was one.
pub fn relay_line(line: &str, worker: &str) -> Option<LogRecord> {
    match parse_line(line) {
        Relayed::Record(record) => {
            emit_record(&record, worker);
            Some(record)
        }
        Relayed::Raw(text) => {
            debug!(worker = %worker, "{text}");
            None
        }
    }
}

/// Relay a stream to its end, stopping at the first error-level record.
///
/// Returns the message of that record.
pub async fn relay_until_error(stream: &mut LogStream, worker: &str) -> Option<String> {
    while let Some(line) = stream.next_line().await {
        if let Some(record) = relay_line(&line, worker) {
            if record.is_error() {
                return Some(record.message);
            }
        }
    }
    None
}

/// Background task relaying a worker's output for the life of a session.
pub struct LogDrain {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl LogDrain {
    pub fn spawn(mut stream: LogStream, worker: impl Into<String>) -> Self {
        let worker = worker.into();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    line = stream.next_line() => match line {
                        Some(line) => {
                            relay_line(&line, &worker);
                        }
                        None => return,
                    },
                }
            }
            // Lines already read are still relayed.
            while let Some(line) = stream.try_next_line() {
                relay_line(&line, &worker);
            }
        });
        Self { token, handle }
    }

    /// Signal the task and wait for it up to `join_timeout`.
    ///
    /// A task that does not finish in time is aborted.
    pub async fn stop(mut self, join_timeout: Duration) {
        self.token.cancel();
        match tokio::time::timeout(join_timeout, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("log drain task failed: {e}"),
            Err(_) => {
                warn!("log drain did not stop within {join_timeout:?}, aborting it");
                self.handle.abort();
            }
        }
    }
}

impl Drop for LogDrain {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
