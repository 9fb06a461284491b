//! MCP tool implementations.
//!
//! This module contains the implementations for all MCP tools exposed by the
//! server. Query tools read the graph left by the last analysis of a project;
//! they never run the scanner themselves.

use crate::analysis::{Scanner, run_analysis};
use crate::context::{Project, ProjectRegistry};
use crate::error::{Error, Result};
use crate::models::{
    AnalysisStartedResponse, CancelOperationResponse, CircularDependenciesResponse,
    ForgetProjectResponse, GraphFormat, McpProject, OrphanedFilesResponse, WatchOperationResponse,
    parse_graph_format,
};
use crate::resources::{ProjectResource, StructureNode, project_structure};
use deplens::graph::{
    CircularDependencyReport, CycleEntry, D3Graph, DependencyGraph, FileDependencies, FileLookup,
    GraphAnalyzer, OrphanedFilesReport,
};
use deplens::operations::{OperationHandle, OperationManager, OperationStatus, StreamUpdate};
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Default `watch_operation` timeout.
const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Tool implementations for the deplens MCP server.
pub struct Tools {
    projects: Arc<RwLock<ProjectRegistry>>,
    operations: OperationManager,
    scanner: Arc<Scanner>,
    poll_interval: Duration,
    /// Analysis operations started per project id.
    analyses: Mutex<HashMap<String, Vec<String>>>,
}

impl Tools {
    /// Create a new Tools instance.
    pub fn new(
        projects: Arc<RwLock<ProjectRegistry>>,
        operations: OperationManager,
        scanner: Scanner,
        poll_interval: Duration,
    ) -> Self {
        Self {
            projects,
            operations,
            scanner: Arc::new(scanner),
            poll_interval,
            analyses: Mutex::new(HashMap::new()),
        }
    }

    async fn project(&self, project_id: &str) -> Result<Project> {
        self.projects.read().await.get(project_id).cloned()
    }

    /// Load the analyzed graph for a project.
    async fn load_graph(&self, project_id: &str) -> Result<(Project, DependencyGraph)> {
        let project = self.project(project_id).await?;
        let path = self.scanner.graph_path(&project);

        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NoAnalysis {
                project_id: project.id,
            });
        }

        let graph = DependencyGraph::load(&path).await?;
        Ok((project, graph))
    }

    // ========== Projects ==========

    /// List registered projects.
    pub async fn list_projects(&self) -> Vec<McpProject> {
        let projects = self.projects.read().await;
        projects.projects().iter().map(McpProject::from).collect()
    }

    /// Register a project directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not an existing directory.
    pub async fn add_project(&self, name: &str, path: &str) -> Result<McpProject> {
        let mut projects = self.projects.write().await;
        let project = projects.add_project(name, Path::new(path)).await?;
        Ok(McpProject::from(&project))
    }

    /// Unregister a project and delete its analysis output.
    ///
    /// Analyses of the project that are still running are cancelled first.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown.
    pub async fn forget_project(&self, project_id: &str) -> Result<ForgetProjectResponse> {
        let mut projects = self.projects.write().await;
        projects.get(project_id)?;

        let started = self
            .analyses
            .lock()
            .await
            .remove(project_id)
            .unwrap_or_default();
        let cancelled_operations: Vec<String> = started
            .into_iter()
            .filter(|id| self.operations.cancel_operation(id))
            .collect();
        if !cancelled_operations.is_empty() {
            tracing::info!(
                project_id,
                cancelled = cancelled_operations.len(),
                "Cancelled running analyses of forgotten project"
            );
        }

        let project = projects.forget_project(project_id).await?;
        Ok(ForgetProjectResponse {
            project: McpProject::from(&project),
            message: format!("Project {} removed", project.id),
            cancelled_operations,
        })
    }

    // ========== Analysis ==========

    /// Start a background analysis of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown or the operation cannot be
    /// registered.
    pub async fn analyze_dependencies(
        &self,
        project_id: &str,
        exclude: Option<Vec<String>>,
    ) -> Result<AnalysisStartedResponse> {
        // Held until the operation is recorded, so forget_project sees it
        let projects = self.projects.read().await;
        let project = projects.get(project_id)?.clone();
        let operation = self.operations.create_operation(None, None)?;

        let scanner = Arc::clone(&self.scanner);
        let exclude = exclude.unwrap_or_default();
        let task_project = project.clone();
        self.operations
            .start_task(operation.id(), move |handle: OperationHandle| {
                run_analysis(scanner, task_project, exclude, handle)
            })?;

        {
            let mut analyses = self.analyses.lock().await;
            let started = analyses.entry(project.id.clone()).or_default();
            started.retain(|id| {
                self.operations
                    .get_status(id)
                    .is_ok_and(|status| !status.is_terminal())
            });
            started.push(operation.id().to_string());
        }
        drop(projects);

        tracing::info!(
            project_id = %project.id,
            operation_id = %operation.id(),
            "Analysis requested"
        );
        Ok(AnalysisStartedResponse {
            operation_id: operation.id().to_string(),
            correlation_id: operation.correlation_id().to_string(),
            project_id: project.id,
        })
    }

    /// The analyzed graph, as the raw map or D3 nodes and links.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown project or format, or when the
    /// project has not been analyzed.
    pub async fn get_dependency_graph(
        &self,
        project_id: &str,
        format: Option<&str>,
    ) -> Result<Value> {
        let format = parse_graph_format(format)?;
        let (_, graph) = self.load_graph(project_id).await?;

        let value = match format {
            GraphFormat::Json => serde_json::to_value(&graph)?,
            GraphFormat::D3 => serde_json::to_value(D3Graph::from(&graph))?,
        };
        Ok(value)
    }

    /// Find orphaned files and write `orphaned_files.json`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unanalyzed project, an invalid
    /// pattern, or a failed report write.
    pub async fn find_orphaned_files(
        &self,
        project_id: &str,
        exclude_patterns: Option<Vec<String>>,
    ) -> Result<OrphanedFilesResponse> {
        let (project, graph) = self.load_graph(project_id).await?;
        let orphans =
            GraphAnalyzer::new(&graph).orphaned_files(&exclude_patterns.unwrap_or_default())?;

        let report = OrphanedFilesReport::new(&orphans);
        report.write_to(&project.analysis_dir).await?;

        Ok(OrphanedFilesResponse {
            count: report.orphaned_files.len(),
            total_files: graph.len(),
            orphaned_files: report.orphaned_files,
        })
    }

    /// Detect circular dependencies and write `circular_dependencies.json`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unanalyzed project, a blank module
    /// filter, or a failed report write.
    pub async fn check_circular_dependencies(
        &self,
        project_id: &str,
        module: Option<String>,
    ) -> Result<CircularDependenciesResponse> {
        let (project, graph) = self.load_graph(project_id).await?;
        let cycles = GraphAnalyzer::new(&graph).detect_cycles(module.as_deref())?;

        let report = CircularDependencyReport::new(&cycles);
        report.write_to(&project.analysis_dir).await?;

        let circular_dependencies: Vec<CycleEntry> = report.circular_dependencies;
        Ok(CircularDependenciesResponse {
            count: circular_dependencies.len(),
            circular_dependencies,
            module_filter: module,
        })
    }

    /// Imports and importers of one file.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unanalyzed project, or a path that
    /// matches no file.
    pub async fn get_file_dependencies(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<FileLookup> {
        let (_, graph) = self.load_graph(project_id).await?;
        Ok(GraphAnalyzer::new(&graph).file_dependencies(file_path)?)
    }

    /// Imports and importers of every file named `component_name`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unanalyzed project, or a name that
    /// matches no file.
    pub async fn get_component_dependencies(
        &self,
        project_id: &str,
        component_name: &str,
    ) -> Result<Vec<FileDependencies>> {
        let (_, graph) = self.load_graph(project_id).await?;
        Ok(GraphAnalyzer::new(&graph).component_dependencies(component_name)?)
    }

    /// Directory tree of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown.
    pub async fn project_structure(&self, project_id: &str) -> Result<StructureNode> {
        let project = self.project(project_id).await?;
        tokio::task::spawn_blocking(move || project_structure(&project.path, &project.id))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    // ========== Resources ==========

    /// Read a `project://` resource as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed URI, or whatever the underlying
    /// query returns.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let value = match ProjectResource::parse(uri)? {
            ProjectResource::Structure { project_id } => {
                let structure = self.project_structure(&project_id).await?;
                json!({ "structure": structure })
            }
            ProjectResource::Dependencies { project_id } => {
                self.get_dependency_graph(&project_id, None).await?
            }
            ProjectResource::FileDependencies {
                project_id,
                file_path,
            } => serde_json::to_value(self.get_file_dependencies(&project_id, &file_path).await?)?,
            ProjectResource::ComponentDependencies {
                project_id,
                component_name,
            } => serde_json::to_value(
                self.get_component_dependencies(&project_id, &component_name)
                    .await?,
            )?,
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Registered projects, for resource listing.
    pub async fn projects(&self) -> Vec<Project> {
        self.projects.read().await.projects().to_vec()
    }

    // ========== Operations ==========

    /// Status of one operation.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or evicted operation.
    pub fn operation_status(&self, operation_id: &str) -> Result<OperationStatus> {
        Ok(self.operations.get_status(operation_id)?)
    }

    /// Cancel an operation. Unknown ids report `cancelled: false`.
    #[must_use]
    pub fn cancel_operation(&self, operation_id: &str) -> CancelOperationResponse {
        CancelOperationResponse {
            operation_id: operation_id.to_string(),
            cancelled: self.operations.cancel_operation(operation_id),
        }
    }

    /// All tracked operations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation registry is unusable.
    pub fn list_operations(&self) -> Result<Vec<OperationStatus>> {
        Ok(self.operations.list_operations()?)
    }

    /// Collect status updates until the operation finishes or `timeout_secs`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or evicted operation.
    pub async fn watch_operation(
        &self,
        operation_id: &str,
        timeout_secs: Option<u64>,
    ) -> Result<WatchOperationResponse> {
        // Fail fast on unknown ids instead of returning an empty update list
        self.operations.get_status(operation_id)?;

        let timeout = timeout_secs.map_or(DEFAULT_WATCH_TIMEOUT, Duration::from_secs);
        let mut stream = Box::pin(self.operations.stream_updates(operation_id, self.poll_interval));
        let mut updates: Vec<StreamUpdate> = Vec::new();

        let finished = tokio::time::timeout(timeout, async {
            while let Some(update) = stream.next().await {
                updates.push(update);
            }
        })
        .await;

        Ok(WatchOperationResponse {
            timed_out: finished.is_err(),
            updates,
        })
    }
}
