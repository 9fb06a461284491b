//! MCP server implementation.
//!
//! This module contains the main server setup using rmcp.

use crate::analysis::Scanner;
use crate::context::ProjectRegistry;
use crate::models::{
    AddProjectParams, AnalyzeParams, CircularDependenciesParams, ComponentDependenciesParams,
    FileDependenciesParams, GraphParams, OperationParams, OrphanedFilesParams, ProjectParams,
    WatchOperationParams,
};
use crate::resources::{project_resources, resource_templates};
use crate::tools::Tools;
use deplens::config::DeplensConfig;
use deplens::operations::OperationManager;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ListResourceTemplatesResult, ListResourcesResult,
    PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
    ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{
    ErrorData as McpError, handler::server::ServerHandler, tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Wrap a tool outcome as a JSON tool result.
fn json_result<T: Serialize>(
    result: crate::error::Result<T>,
) -> Result<CallToolResult, McpError> {
    let value = result.map_err(McpError::from)?;
    Ok(CallToolResult::success(vec![Content::json(value)?]))
}

/// The deplens MCP server.
///
/// Provides MCP protocol handling over stdio transport.
#[derive(Clone)]
pub struct DeplensMcpServer {
    /// Shared project registry.
    projects: Arc<RwLock<ProjectRegistry>>,
    /// Background operation registry.
    operations: OperationManager,
    /// Tool implementations.
    tools: Arc<Tools>,
    /// Tool router for MCP dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DeplensMcpServer {
    /// List registered projects.
    #[tool(description = "List all registered projects with their ids and paths.")]
    async fn list_projects(&self) -> Result<CallToolResult, McpError> {
        json_result(Ok(self.tools.list_projects().await))
    }

    /// Register a project.
    #[tool(
        description = "Register a JavaScript/TypeScript project directory for dependency analysis. Returns the project id used by every other tool."
    )]
    async fn add_project(
        &self,
        Parameters(params): Parameters<AddProjectParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(self.tools.add_project(&params.name, &params.path).await)
    }

    /// Unregister a project.
    #[tool(description = "Remove a project and delete its analysis output.")]
    async fn forget_project(
        &self,
        Parameters(params): Parameters<ProjectParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(self.tools.forget_project(&params.project_id).await)
    }

    /// Start a full analysis.
    #[tool(
        description = "Scan a project's imports and build its dependency graph in the background. Returns an operation id; poll it with operation_status or watch_operation. Run this before the other analysis tools."
    )]
    async fn analyze_dependencies(
        &self,
        Parameters(params): Parameters<AnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .analyze_dependencies(&params.project_id, params.exclude)
                .await,
        )
    }

    /// Get the dependency graph.
    #[tool(
        description = "Get a project's dependency graph, either as the raw file-to-imports map (format 'json') or as D3 nodes and links (format 'd3')."
    )]
    async fn get_dependency_graph(
        &self,
        Parameters(params): Parameters<GraphParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .get_dependency_graph(&params.project_id, params.format.as_deref())
                .await,
        )
    }

    /// Find orphaned files.
    #[tool(
        description = "Find files that no other file imports. Optional glob patterns exclude entry points, tests, and the like."
    )]
    async fn find_orphaned_files(
        &self,
        Parameters(params): Parameters<OrphanedFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .find_orphaned_files(&params.project_id, params.exclude_patterns)
                .await,
        )
    }

    /// Check for circular dependencies.
    #[tool(
        description = "Find circular import chains. Cycles of more than two files are 'high' severity, mutual imports 'medium'. Optionally restrict to paths containing a module substring."
    )]
    async fn check_circular_dependencies(
        &self,
        Parameters(params): Parameters<CircularDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .check_circular_dependencies(&params.project_id, params.module)
                .await,
        )
    }

    /// Get dependencies of a file.
    #[tool(
        description = "Show what a file imports and what imports it. A partial path that matches several files returns the candidates instead."
    )]
    async fn get_file_dependencies(
        &self,
        Parameters(params): Parameters<FileDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .get_file_dependencies(&params.project_id, &params.file_path)
                .await,
        )
    }

    /// Get dependencies of a component.
    #[tool(
        description = "Show imports and importers for every file whose name without extension equals the component name."
    )]
    async fn get_component_dependencies(
        &self,
        Parameters(params): Parameters<ComponentDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .get_component_dependencies(&params.project_id, &params.component_name)
                .await,
        )
    }

    /// Get operation status.
    #[tool(
        description = "Get the status, progress, log messages, and (when finished) result or error of a background analysis."
    )]
    async fn operation_status(
        &self,
        Parameters(params): Parameters<OperationParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(self.tools.operation_status(&params.operation_id))
    }

    /// Watch an operation.
    #[tool(
        description = "Wait for a background analysis, returning every status change observed until it finishes or the timeout expires."
    )]
    async fn watch_operation(
        &self,
        Parameters(params): Parameters<WatchOperationParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(
            self.tools
                .watch_operation(&params.operation_id, params.timeout_secs)
                .await,
        )
    }

    /// Cancel an operation.
    #[tool(
        description = "Cancel a running background analysis. The scanner process is stopped."
    )]
    async fn cancel_operation(
        &self,
        Parameters(params): Parameters<OperationParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(Ok(self.tools.cancel_operation(&params.operation_id)))
    }

    /// List operations.
    #[tool(description = "List all tracked background analyses, oldest first.")]
    async fn list_operations(&self) -> Result<CallToolResult, McpError> {
        json_result(self.tools.list_operations())
    }
}

impl DeplensMcpServer {
    /// Create a new deplens MCP server.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation timings are invalid.
    pub fn new(config: &DeplensConfig) -> crate::error::Result<Self> {
        let projects = Arc::new(RwLock::new(ProjectRegistry::new(&config.data_dir)));
        let operations = OperationManager::from_config(&config.operations)?;
        let scanner = Scanner::new(config.scanner.clone(), config.operations.poll_interval());
        let tools = Arc::new(Tools::new(
            Arc::clone(&projects),
            operations.clone(),
            scanner,
            config.operations.poll_interval(),
        ));

        Ok(Self {
            projects,
            operations,
            tools,
            tool_router: Self::tool_router(),
        })
    }

    /// Get a reference to the project registry.
    #[must_use]
    pub fn projects(&self) -> &Arc<RwLock<ProjectRegistry>> {
        &self.projects
    }

    /// Get the operation manager.
    #[must_use]
    pub fn operations(&self) -> &OperationManager {
        &self.operations
    }
}

#[tool_handler]
impl ServerHandler for DeplensMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "deplens-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Deplens MCP server for JavaScript/TypeScript dependency analysis. Register a project with add_project, run analyze_dependencies, then query the graph. Resources: project://{project_id}/structure, project://{project_id}/dependencies, project://{project_id}/file/{path}/dependencies, project://{project_id}/component/{name}/dependencies."
                    .into(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let projects = self.tools.projects().await;
        Ok(ListResourcesResult::with_all_items(project_resources(
            &projects,
        )))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult::with_all_items(
            resource_templates(),
        ))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let text = self.tools.read_resource(&request.uri).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}
