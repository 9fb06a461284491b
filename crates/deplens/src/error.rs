//! Error types for deplens operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for deplens operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested file or component has no exact or matching entry in the graph.
    #[error("Not found in dependency graph: {0}")]
    NotFound(String),

    /// An argument was outside its valid range or could not be parsed.
    #[error("Invalid {field}: {reason}")]
    InvalidArgument {
        /// The argument that was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// No operation with the given id is registered.
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// An operation with the given id is already registered.
    #[error("Operation already exists: {0}")]
    DuplicateOperation(String),

    /// The operation has already been started or has finished.
    #[error("Operation {id} cannot be started from state '{status}'")]
    OperationAlreadyStarted {
        /// The operation id.
        id: String,
        /// The state the operation was in.
        status: &'static str,
    },

    /// A task body returned an error.
    ///
    /// This is never returned from `start_task`; it is the shape recorded on
    /// the operation and surfaced through its status snapshot.
    #[error("Task failed: {message}")]
    TaskFailure {
        /// The error message.
        message: String,
        /// The full error chain for diagnostics.
        trace: String,
    },

    /// The operation registry lock was poisoned by a panicking holder.
    #[error("Operation registry lock poisoned")]
    LockPoisoned,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A dependency graph or report file could not be parsed.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// The file being read, or `<memory>` for in-memory input.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for deplens operations.
pub type Result<T> = std::result::Result<T, Error>;
