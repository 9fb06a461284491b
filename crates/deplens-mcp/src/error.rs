//! Error types for the deplens MCP server.

use rmcp::ErrorData as McpError;
use thiserror::Error;

/// Errors that can occur in the deplens MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// No project with the given id is registered.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// The project directory does not exist or is not a directory.
    #[error("Project path not found: {path}")]
    ProjectPathNotFound {
        /// The path that was not found.
        path: String,
        /// The underlying IO error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// The project has not been analyzed yet.
    #[error("No analysis for project {project_id}. Run analyze_dependencies first.")]
    NoAnalysis {
        /// The project id.
        project_id: String,
    },

    /// Invalid argument value provided.
    #[error("Invalid {field}: '{value}'. Valid values: {valid_values}")]
    InvalidArgument {
        /// The field name that had an invalid value.
        field: &'static str,
        /// The invalid value that was provided.
        value: String,
        /// Description of valid values.
        valid_values: &'static str,
    },

    /// The resource URI is malformed or names no known resource.
    #[error("Unsupported resource URI: {0}")]
    InvalidResourceUri(String),

    /// An error from the deplens analysis core.
    #[error(transparent)]
    Core(#[from] deplens::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for deplens MCP operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for McpError {
    fn from(error: Error) -> Self {
        let message = error.to_string();
        match error {
            Error::ProjectNotFound(_)
            | Error::NoAnalysis { .. }
            | Error::Core(deplens::Error::NotFound(_) | deplens::Error::OperationNotFound(_)) => {
                McpError::resource_not_found(message, None)
            }
            Error::ProjectPathNotFound { .. }
            | Error::InvalidArgument { .. }
            | Error::InvalidResourceUri(_)
            | Error::Core(deplens::Error::InvalidArgument { .. }) => {
                McpError::invalid_params(message, None)
            }
            _ => McpError::internal_error(message, None),
        }
    }
}
