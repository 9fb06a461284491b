//! Operation state and status snapshots.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of an operation.
///
/// `initializing -> running -> {completed | failed}`, with `cancelled`
/// reachable from both `initializing` and `running`. Terminal states are
/// never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Registered, no task started yet.
    Initializing,
    /// Task body is executing.
    Running,
    /// Task body returned a result.
    Completed,
    /// Cancelled before the task body finished.
    Cancelled,
    /// Task body returned an error or panicked.
    Failed,
}

impl OperationState {
    /// The state name as serialized.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tag on an operation log message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    /// Diagnostic detail.
    Debug,
    /// Normal progress information.
    #[default]
    Info,
    /// Something unexpected that did not stop the task.
    Warning,
    /// A failure.
    Error,
}

/// A timestamped log entry recorded on an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMessage {
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
    /// Message severity.
    #[serde(rename = "type")]
    pub severity: MessageSeverity,
    /// Message text.
    pub message: String,
}

/// Structured error recorded on a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Top-level error message.
    pub message: String,
    /// Failure kind: `task_failure` or `panic`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Full diagnostic trace.
    pub trace: String,
}

impl OperationError {
    pub(crate) const TASK_FAILURE: &'static str = "task_failure";
    pub(crate) const PANIC: &'static str = "panic";

    pub(crate) fn from_task_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            kind: Self::TASK_FAILURE.to_string(),
            trace: format!("{error:?}"),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string());

        Self {
            trace: format!("panic: {message}"),
            message,
            kind: Self::PANIC.to_string(),
        }
    }
}

impl From<OperationError> for Error {
    fn from(error: OperationError) -> Self {
        Error::TaskFailure {
            message: error.message,
            trace: error.trace,
        }
    }
}

/// Point-in-time copy of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    /// Operation id.
    pub operation_id: String,
    /// Correlation id for log tracing.
    pub correlation_id: String,
    /// Current state.
    pub status: OperationState,
    /// Progress fraction in `[0.0, 1.0]`.
    pub progress: f64,
    /// Seconds since start (or creation), frozen once terminal.
    pub elapsed_time: f64,
    /// Bumped on every recorded change.
    pub revision: u64,
    /// Log messages in recording order.
    pub messages: Vec<OperationMessage>,
    /// Task result, only when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details, only when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl OperationStatus {
    /// Whether the operation has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The task outcome: the result if completed, [`Error::TaskFailure`] if
    /// failed, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailure`] when the operation failed.
    pub fn into_result(self) -> Result<Option<Value>> {
        match (self.status, self.error) {
            (OperationState::Failed, Some(error)) => Err(error.into()),
            (OperationState::Completed, _) => Ok(self.result),
            _ => Ok(None),
        }
    }
}

/// Registry-owned mutable operation record.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) id: String,
    pub(crate) correlation_id: String,
    pub(crate) state: OperationState,
    progress: f64,
    messages: Vec<OperationMessage>,
    result: Option<Value>,
    error: Option<OperationError>,
    revision: u64,
    pub(crate) sequence: u64,
    created_at: Instant,
    started_at: Option<Instant>,
    pub(crate) finished_at: Option<Instant>,
}

impl Operation {
    pub(crate) fn new(id: String, correlation_id: String, sequence: u64) -> Self {
        Self {
            id,
            correlation_id,
            state: OperationState::Initializing,
            progress: 0.0,
            messages: Vec::new(),
            result: None,
            error: None,
            revision: 0,
            sequence,
            created_at: Instant::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn push_message(&mut self, severity: MessageSeverity, text: &str) {
        self.messages.push(OperationMessage {
            timestamp: Utc::now(),
            severity,
            message: text.to_string(),
        });
        self.touch();
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress = progress;
        self.touch();
    }

    pub(crate) fn start(&mut self) {
        self.state = OperationState::Running;
        self.started_at = Some(Instant::now());
        self.touch();
    }

    fn finish(&mut self, state: OperationState) {
        self.state = state;
        self.finished_at = Some(Instant::now());
        self.touch();
    }

    pub(crate) fn complete(&mut self, result: Value) {
        self.progress = 1.0;
        self.result = Some(result);
        self.finish(OperationState::Completed);
    }

    pub(crate) fn fail(&mut self, error: OperationError) {
        self.error = Some(error);
        self.finish(OperationState::Failed);
    }

    pub(crate) fn cancel(&mut self) {
        self.push_message(MessageSeverity::Warning, "Operation cancelled");
        self.finish(OperationState::Cancelled);
    }

    /// Time spent terminal, or `None` while still live.
    pub(crate) fn terminal_age(&self, now: Instant) -> Option<Duration> {
        self.finished_at
            .map(|finished| now.saturating_duration_since(finished))
    }

    fn elapsed(&self) -> Duration {
        let start = self.started_at.unwrap_or(self.created_at);
        let end = self.finished_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(start)
    }

    pub(crate) fn snapshot(&self) -> OperationStatus {
        OperationStatus {
            operation_id: self.id.clone(),
            correlation_id: self.correlation_id.clone(),
            status: self.state,
            progress: self.progress,
            elapsed_time: self.elapsed().as_secs_f64(),
            revision: self.revision,
            messages: self.messages.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}
