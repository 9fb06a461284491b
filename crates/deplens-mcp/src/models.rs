//! MCP request and response models.
//!
//! Parameter types derive `JsonSchema` so rmcp can advertise tool input
//! schemas. Responses wrap or transform deplens types for MCP transport.

use crate::context::Project;
use crate::error::{Error, Result};
use deplens::graph::CycleEntry;
use deplens::operations::StreamUpdate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ========== Parameters ==========

/// Parameters for `add_project`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddProjectParams {
    /// Display name for the project.
    pub name: String,
    /// Path to the project root directory.
    pub path: String,
}

/// Parameters for tools that take only a project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectParams {
    /// Project id, e.g. `project1`.
    pub project_id: String,
}

/// Parameters for `analyze_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeParams {
    /// Project id.
    pub project_id: String,
    /// Paths or patterns the scanner should skip.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

/// Parameters for `get_dependency_graph`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphParams {
    /// Project id.
    pub project_id: String,
    /// Output format: `json` (default) or `d3`.
    #[serde(default)]
    pub format: Option<String>,
}

/// Parameters for `find_orphaned_files`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OrphanedFilesParams {
    /// Project id.
    pub project_id: String,
    /// Glob patterns for files that are never reported, e.g. `**/*.test.js`.
    #[serde(default)]
    pub exclude_patterns: Option<Vec<String>>,
}

/// Parameters for `check_circular_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CircularDependenciesParams {
    /// Project id.
    pub project_id: String,
    /// Only consider files whose path contains this substring.
    #[serde(default)]
    pub module: Option<String>,
}

/// Parameters for `get_file_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileDependenciesParams {
    /// Project id.
    pub project_id: String,
    /// File path as reported by the scanner, or a unique suffix of it.
    pub file_path: String,
}

/// Parameters for `get_component_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentDependenciesParams {
    /// Project id.
    pub project_id: String,
    /// Component name: the file name without extension.
    pub component_name: String,
}

/// Parameters for tools that take an operation id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationParams {
    /// Operation id returned by `analyze_dependencies`.
    pub operation_id: String,
}

/// Parameters for `watch_operation`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WatchOperationParams {
    /// Operation id returned by `analyze_dependencies`.
    pub operation_id: String,
    /// Give up after this many seconds (default 30).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// ========== Responses ==========

/// Project representation for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpProject {
    /// Project id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Canonical project root.
    pub path: String,
    /// Analysis output directory.
    pub analysis_dir: String,
    /// Registration timestamp (ISO 8601).
    pub added_at: String,
}

impl From<&Project> for McpProject {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            path: project.path.display().to_string(),
            analysis_dir: project.analysis_dir.display().to_string(),
            added_at: project.added_at.to_rfc3339(),
        }
    }
}

/// Response from `forget_project`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForgetProjectResponse {
    /// The removed project.
    pub project: McpProject,
    /// Status message.
    pub message: String,
    /// Running analyses that were cancelled.
    pub cancelled_operations: Vec<String>,
}

/// Response from `analyze_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisStartedResponse {
    /// Poll this with `operation_status`.
    pub operation_id: String,
    /// Correlation id attached to the analysis logs.
    pub correlation_id: String,
    /// The project being analyzed.
    pub project_id: String,
}

/// Response from `find_orphaned_files`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OrphanedFilesResponse {
    /// Files no other file imports, sorted.
    pub orphaned_files: Vec<String>,
    /// Number of orphaned files.
    pub count: usize,
    /// Number of files in the graph.
    pub total_files: usize,
}

/// Response from `check_circular_dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularDependenciesResponse {
    /// Detected cycles.
    pub circular_dependencies: Vec<CycleEntry>,
    /// Number of cycles.
    pub count: usize,
    /// The module filter that was applied.
    pub module_filter: Option<String>,
}

/// Response from `cancel_operation`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelOperationResponse {
    /// The operation id.
    pub operation_id: String,
    /// Whether this call cancelled the operation.
    pub cancelled: bool,
}

/// Response from `watch_operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchOperationResponse {
    /// Status updates in the order observed.
    pub updates: Vec<StreamUpdate>,
    /// Whether the timeout hit before the operation finished.
    pub timed_out: bool,
}

// ========== Parsing ==========

/// Output format for `get_dependency_graph`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphFormat {
    /// The scanner's file -> imports map.
    #[default]
    Json,
    /// D3 force-graph nodes and links.
    D3,
}

/// Parse a graph format string, defaulting to JSON.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` for an unknown format.
pub fn parse_graph_format(s: Option<&str>) -> Result<GraphFormat> {
    match s.map(str::to_lowercase).as_deref() {
        None | Some("json") => Ok(GraphFormat::Json),
        Some("d3") => Ok(GraphFormat::D3),
        Some(_) => Err(Error::InvalidArgument {
            field: "format",
            value: s.unwrap_or_default().to_string(),
            valid_values: "json, d3",
        }),
    }
}
