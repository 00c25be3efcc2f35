//! Structured event log with threshold-triggered alerts.
//!
//! `log` appends one JSONL line per entry and is synchronous: the line is
//! on disk before the transition it describes is considered complete.
//! Entries at or above the alert threshold additionally append an alert
//! record, deduplicated per (job, severity) within a short window so a
//! retry storm does not flood operators.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One append-only log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub job_id: String,
    pub task_id: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub context: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(job_id: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_id: None,
            severity,
            message: message.into(),
            context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Operator-facing alert record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub job_id: String,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

pub struct EventLog {
    log_path: PathBuf,
    alert_path: PathBuf,
    alert_threshold: Severity,
    dedup_window: Duration,
    recent_alerts: Mutex<HashMap<(String, Severity), DateTime<Utc>>>,
}

impl EventLog {
    pub fn open(root: &Path, alert_threshold: Severity) -> Result<Self, EngineError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            log_path: root.join("events.jsonl"),
            alert_path: root.join("alerts.jsonl"),
            alert_threshold,
            dedup_window: Duration::from_secs(60),
            recent_alerts: Mutex::new(HashMap::new()),
        })
    }

    /// Append one entry; raise an alert if the severity warrants it.
    pub fn log(&self, entry: LogEntry) -> Result<(), EngineError> {
        append_line(&self.log_path, &serde_json::to_string(&entry)?)?;

        if entry.severity >= self.alert_threshold {
            self.maybe_alert(&entry)?;
        }
        Ok(())
    }

    pub fn info(&self, job_id: &str, message: impl Into<String>) -> Result<(), EngineError> {
        self.log(LogEntry::new(job_id, Severity::Info, message))
    }

    pub fn warning(&self, job_id: &str, message: impl Into<String>) -> Result<(), EngineError> {
        self.log(LogEntry::new(job_id, Severity::Warning, message))
    }

    pub fn error(&self, job_id: &str, message: impl Into<String>) -> Result<(), EngineError> {
        self.log(LogEntry::new(job_id, Severity::Error, message))
    }

    fn maybe_alert(&self, entry: &LogEntry) -> Result<(), EngineError> {
        let key = (entry.job_id.clone(), entry.severity);
        let now = Utc::now();
        {
            let mut recent = self.recent_alerts.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(last) = recent.get(&key) {
                let elapsed = now.signed_duration_since(*last);
                if elapsed.num_milliseconds() < self.dedup_window.as_millis() as i64 {
                    return Ok(());
                }
            }
            recent.insert(key, now);
        }

        let alert = Alert {
            job_id: entry.job_id.clone(),
            severity: entry.severity,
            message: entry.message.clone(),
            created_at: now,
        };
        append_line(&self.alert_path, &serde_json::to_string(&alert)?)
    }

    /// All alerts raised so far, oldest first.
    pub fn alerts(&self) -> Result<Vec<Alert>, EngineError> {
        if !self.alert_path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.alert_path)?;
        contents
            .lines()
            .map(|line| serde_json::from_str(line).map_err(EngineError::from))
            .collect()
    }

    #[cfg(test)]
    fn entries(&self) -> Vec<LogEntry> {
        let contents = std::fs::read_to_string(&self.log_path).unwrap_or_default();
        contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), EngineError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    file.sync_data()?;
    Ok(())
}
