//! Task bodies and the handle they use to report progress.

use super::OperationManager;
use super::operation::{MessageSeverity, OperationStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// A unit of background work tracked by an [`OperationManager`].
///
/// The returned value becomes the operation's result; an error marks it
/// failed. Any `FnOnce(OperationHandle) -> impl Future` closure is a task.
#[async_trait]
pub trait OperationTask: Send + 'static {
    /// Run the task to completion.
    async fn run(self, handle: OperationHandle) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> OperationTask for F
where
    F: FnOnce(OperationHandle) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(self, handle: OperationHandle) -> anyhow::Result<Value> {
        self(handle).await
    }
}

/// A task's view of its own operation.
///
/// Updates after cancellation are accepted and discarded, so a task body
/// only needs to poll [`is_cancelled`](Self::is_cancelled) to stop early.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    manager: OperationManager,
    id: String,
    correlation_id: String,
}

impl OperationHandle {
    pub(crate) fn new(manager: OperationManager, id: String, correlation_id: String) -> Self {
        Self {
            manager,
            id,
            correlation_id,
        }
    }

    /// The operation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Record progress, optionally with a log message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `progress` is outside `[0.0, 1.0]`, or
    /// `OperationNotFound` if the operation was evicted.
    pub fn update_progress(&self, progress: f64, message: Option<&str>) -> Result<()> {
        self.manager.update_progress(&self.id, progress, message)
    }

    /// Append a log message.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if the operation was evicted.
    pub fn add_message(&self, text: &str, severity: MessageSeverity) -> Result<()> {
        self.manager.add_message(&self.id, text, severity)
    }

    /// Append an info-level log message.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if the operation was evicted.
    pub fn info(&self, text: &str) -> Result<()> {
        self.add_message(text, MessageSeverity::Info)
    }

    /// Whether the task should stop.
    ///
    /// An operation that can no longer be read (evicted, or the registry
    /// lock poisoned) also counts as cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.manager.is_cancelled(&self.id)
    }

    /// Current status snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if the operation was evicted.
    pub fn status(&self) -> Result<OperationStatus> {
        self.manager.get_status(&self.id)
    }

    /// Cancel this operation.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if the operation was evicted.
    pub fn cancel(&self) -> Result<bool> {
        self.manager.cancel(&self.id)
    }
}
