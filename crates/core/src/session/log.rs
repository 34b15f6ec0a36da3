use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default number of events retained per run.
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

/// Number of trailing events returned by status snapshots.
pub const STATUS_LOG_TAIL: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Success,
}

/// One line of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// Bounded, append-only progress log shared by all workers of a run.
///
/// Cheaply cloneable. Once `capacity` is reached the oldest events are
/// dropped. Every append is mirrored to `tracing`.
#[derive(Clone)]
pub struct LogSink {
    events: Arc<Mutex<VecDeque<LogEvent>>>,
    capacity: usize,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Success => tracing::info!(?severity, "{}", message),
            Severity::Warn => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }

        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(LogEvent {
            timestamp: Utc::now(),
            severity,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(Severity::Success, message);
    }

    /// The last `max` events, oldest first.
    pub fn snapshot(&self, max: usize) -> Vec<LogEvent> {
        let events = self.lock();
        let skip = events.len().saturating_sub(max);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A view that prefixes every message with the worker index.
    pub fn for_worker(&self, worker: usize) -> WorkerLog {
        WorkerLog {
            sink: self.clone(),
            worker,
        }
    }
}

/// Worker-scoped handle onto a [`LogSink`].
#[derive(Debug, Clone)]
pub struct WorkerLog {
    sink: LogSink,
    worker: usize,
}

impl WorkerLog {
    pub fn worker(&self) -> usize {
        self.worker
    }

    fn push(&self, severity: Severity, message: impl AsRef<str>) {
        self.sink
            .push(severity, format!("[worker {}] {}", self.worker, message.as_ref()));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.push(Severity::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.push(Severity::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.push(Severity::Error, message);
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.push(Severity::Success, message);
    }
}
