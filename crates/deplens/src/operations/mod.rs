//! Long-running operation tracking.
//!
//! An [`OperationManager`] owns a registry of operations, each wrapping one
//! background task. Tasks report progress and log messages through an
//! [`OperationHandle`]; callers poll [`OperationManager::get_status`] or
//! follow [`OperationManager::watch`].
//!
//! Cancellation is cooperative and sticky. Cancelling marks the operation
//! `cancelled` immediately; the task body keeps running until it notices,
//! and anything it records or returns afterwards is discarded.
//!
//! ```no_run
//! use deplens::operations::OperationManager;
//! use serde_json::json;
//!
//! # async fn example() -> deplens::Result<()> {
//! let manager = OperationManager::new();
//! let op = manager.create_operation(None, None)?;
//! manager.start_task(op.id(), |handle: deplens::operations::OperationHandle| async move {
//!     handle.update_progress(0.5, Some("Halfway"))?;
//!     Ok::<_, anyhow::Error>(json!({"done": true}))
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! Terminal operations are evicted once they have been terminal for longer
//! than the retention window, either by [`OperationManager::sweep_now`] or
//! by the background [`Sweeper`].

mod operation;
mod stream;
mod sweeper;
mod task;

pub use operation::{
    MessageSeverity, OperationError, OperationMessage, OperationState, OperationStatus,
};
pub use stream::StreamUpdate;
pub use sweeper::Sweeper;
pub use task::{OperationHandle, OperationTask};

use crate::config::OperationsConfig;
use crate::error::{Error, Result};
use futures::FutureExt;
use operation::Operation;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// What a task run produced: its own result, or a caught panic payload.
type TaskOutcome = std::result::Result<anyhow::Result<serde_json::Value>, Box<dyn Any + Send>>;

#[derive(Debug, Default)]
struct Registry {
    operations: HashMap<String, Operation>,
    next_sequence: u64,
}

#[derive(Debug)]
struct Shared {
    registry: Mutex<Registry>,
    sweep_interval: Duration,
    retention: Duration,
}

/// Registry of long-running operations.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone)]
pub struct OperationManager {
    shared: Arc<Shared>,
}

impl Default for OperationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationManager {
    /// Create a manager with a 5 minute sweep interval and 1 hour retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timings(DEFAULT_SWEEP_INTERVAL, DEFAULT_RETENTION)
    }

    /// Create a manager from configured timings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sweep interval is zero.
    pub fn from_config(config: &OperationsConfig) -> Result<Self> {
        if config.sweep_interval_secs == 0 {
            return Err(Error::invalid(
                "sweep interval",
                "must be greater than zero",
            ));
        }
        Ok(Self::with_timings(
            config.sweep_interval(),
            config.retention(),
        ))
    }

    fn with_timings(sweep_interval: Duration, retention: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                sweep_interval,
                retention,
            }),
        }
    }

    /// How long terminal operations are kept before eviction.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.shared.retention
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>> {
        self.shared.registry.lock().map_err(|_| Error::LockPoisoned)
    }

    fn with_operation<T>(&self, id: &str, f: impl FnOnce(&mut Operation) -> T) -> Result<T> {
        let mut registry = self.lock()?;
        let operation = registry
            .operations
            .get_mut(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        Ok(f(operation))
    }

    /// Register a new operation in the `initializing` state.
    ///
    /// Missing ids are generated as random UUIDs. The correlation id
    /// defaults to a fresh UUID as well.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOperation` if `id` is already registered.
    pub fn create_operation(
        &self,
        id: Option<String>,
        correlation_id: Option<String>,
    ) -> Result<OperationHandle> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let correlation_id = correlation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut registry = self.lock()?;
        if registry.operations.contains_key(&id) {
            return Err(Error::DuplicateOperation(id));
        }

        let sequence = registry.next_sequence;
        registry.next_sequence += 1;
        registry.operations.insert(
            id.clone(),
            Operation::new(id.clone(), correlation_id.clone(), sequence),
        );
        drop(registry);

        tracing::debug!(operation_id = %id, correlation_id = %correlation_id, "Operation created");
        Ok(OperationHandle::new(self.clone(), id, correlation_id))
    }

    /// Start `task` for operation `id` on the tokio runtime.
    ///
    /// Returns as soon as the task is spawned. The task's outcome is
    /// recorded on the operation: a result completes it, an error or panic
    /// fails it. An operation cancelled before start is left cancelled and
    /// the task is never run.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` for an unknown id, or
    /// `OperationAlreadyStarted` if the operation is running or finished.
    pub fn start_task<T: OperationTask>(&self, id: &str, task: T) -> Result<()> {
        let correlation_id = self.with_operation(id, |op| match op.state {
            OperationState::Initializing => {
                op.start();
                Ok(Some(op.correlation_id.clone()))
            }
            OperationState::Cancelled => Ok(None),
            state => Err(Error::OperationAlreadyStarted {
                id: op.id.clone(),
                status: state.as_str(),
            }),
        })??;

        let Some(correlation_id) = correlation_id else {
            tracing::debug!(operation_id = %id, "Operation cancelled before start, task skipped");
            return Ok(());
        };

        let span = tracing::info_span!(
            "operation",
            operation_id = %id,
            correlation_id = %correlation_id
        );
        let handle = OperationHandle::new(self.clone(), id.to_string(), correlation_id);
        let manager = self.clone();
        let id = id.to_string();

        tokio::spawn(
            async move {
                tracing::debug!("Task started");
                let outcome = AssertUnwindSafe(task.run(handle)).catch_unwind().await;
                manager.record_outcome(&id, outcome);
            }
            .instrument(span),
        );
        Ok(())
    }

    fn record_outcome(&self, id: &str, outcome: TaskOutcome) {
        let recorded = self.with_operation(id, |op| {
            if op.state.is_terminal() {
                tracing::debug!(status = %op.state, "Discarding task outcome for finished operation");
                return;
            }
            match outcome {
                Ok(Ok(value)) => {
                    op.complete(value);
                    tracing::info!("Operation completed");
                }
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, "Operation failed");
                    op.fail(OperationError::from_task_error(&error));
                }
                Err(payload) => {
                    let error = OperationError::from_panic(payload.as_ref());
                    tracing::error!(error = %error.message, "Operation task panicked");
                    op.fail(error);
                }
            }
        });

        if let Err(e) = recorded {
            tracing::warn!(error = %e, "Could not record task outcome");
        }
    }

    /// Record progress for operation `id`, optionally with a log message.
    ///
    /// No-op once the operation is terminal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `progress` is outside `[0.0, 1.0]`, or
    /// `OperationNotFound` for an unknown id.
    pub fn update_progress(&self, id: &str, progress: f64, message: Option<&str>) -> Result<()> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(Error::invalid(
                "progress",
                format!("{progress} is outside [0.0, 1.0]"),
            ));
        }

        self.with_operation(id, |op| {
            if op.state.is_terminal() {
                return;
            }
            op.set_progress(progress);
            if let Some(text) = message {
                op.push_message(MessageSeverity::Info, text);
            }
        })
    }

    /// Append a timestamped log message to operation `id`.
    ///
    /// No-op once the operation is terminal.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` for an unknown id.
    pub fn add_message(&self, id: &str, text: &str, severity: MessageSeverity) -> Result<()> {
        self.with_operation(id, |op| {
            if !op.state.is_terminal() {
                op.push_message(severity, text);
            }
        })
    }

    /// Cancel operation `id`.
    ///
    /// Returns `false` if the operation was already terminal.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` for an unknown id.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let cancelled = self.with_operation(id, |op| {
            if op.state.is_terminal() {
                return false;
            }
            op.cancel();
            true
        })?;

        if cancelled {
            tracing::info!(operation_id = %id, "Operation cancelled");
        }
        Ok(cancelled)
    }

    /// Cancel operation `id`, treating an unknown id as "nothing to cancel".
    #[must_use]
    pub fn cancel_operation(&self, id: &str) -> bool {
        match self.cancel(id) {
            Ok(cancelled) => cancelled,
            Err(Error::OperationNotFound(_)) => false,
            Err(e) => {
                tracing::warn!(operation_id = %id, error = %e, "Cancel failed");
                false
            }
        }
    }

    pub(crate) fn is_cancelled(&self, id: &str) -> bool {
        self.with_operation(id, |op| op.state == OperationState::Cancelled)
            .unwrap_or(true)
    }

    /// Snapshot operation `id`.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` for an unknown or evicted id.
    pub fn get_status(&self, id: &str) -> Result<OperationStatus> {
        self.with_operation(id, |op| op.snapshot())
    }

    /// A handle to operation `id`.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` for an unknown or evicted id.
    pub fn get_operation(&self, id: &str) -> Result<OperationHandle> {
        let correlation_id = self.with_operation(id, |op| op.correlation_id.clone())?;
        Ok(OperationHandle::new(
            self.clone(),
            id.to_string(),
            correlation_id,
        ))
    }

    /// Snapshots of every registered operation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `LockPoisoned` if the registry is unusable.
    pub fn list_operations(&self) -> Result<Vec<OperationStatus>> {
        let registry = self.lock()?;
        let mut operations: Vec<&Operation> = registry.operations.values().collect();
        operations.sort_by_key(|op| op.sequence);
        Ok(operations.into_iter().map(Operation::snapshot).collect())
    }

    /// Evict operations terminal for longer than the retention window.
    ///
    /// Returns the number evicted.
    ///
    /// # Errors
    ///
    /// Returns `LockPoisoned` if the registry is unusable.
    pub fn sweep_now(&self) -> Result<usize> {
        let mut registry = self.lock()?;
        Ok(self.evict(&mut registry))
    }

    /// One sweeper tick. Never blocks on the registry lock.
    pub(crate) fn sweep(&self) -> Option<usize> {
        match self.shared.registry.try_lock() {
            Ok(mut registry) => Some(self.evict(&mut registry)),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("Operation registry busy, sweep deferred to next tick");
                None
            }
            Err(TryLockError::Poisoned(_)) => {
                tracing::error!("Operation registry lock poisoned, sweep skipped");
                None
            }
        }
    }

    fn evict(&self, registry: &mut Registry) -> usize {
        let now = Instant::now();
        let retention = self.shared.retention;
        let before = registry.operations.len();

        registry
            .operations
            .retain(|_, op| op.terminal_age(now).is_none_or(|age| age <= retention));

        let evicted = before - registry.operations.len();
        if evicted > 0 {
            tracing::info!(
                evicted,
                remaining = registry.operations.len(),
                "Evicted finished operations"
            );
        }
        evicted
    }

    /// Start the periodic eviction sweep.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the Sweeper stops the sweep"]
    pub fn spawn_sweeper(&self) -> Sweeper {
        Sweeper::spawn(self.clone(), self.shared.sweep_interval)
    }
}
