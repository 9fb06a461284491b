//! MCP server for deplens dependency analysis.
//!
//! This crate exposes the [`deplens`] analyzer to AI assistants over the
//! Model Context Protocol.
//!
//! # Architecture
//!
//! The server uses the `rmcp` crate for protocol handling. Projects live in
//! an in-memory [`context::ProjectRegistry`]; full analyses run the external
//! import scanner as a tracked [`deplens::operations`] operation, while the
//! query tools read the graph file that analysis left behind.
//!
//! # Tools
//!
//! ## Projects
//! - `list_projects` - List registered projects
//! - `add_project` - Register a project directory
//! - `forget_project` - Unregister a project and delete its analysis output
//!
//! ## Analysis
//! - `analyze_dependencies` - Run the scanner in the background
//! - `get_dependency_graph` - Raw graph or D3 nodes/links
//! - `find_orphaned_files` - Files nothing imports
//! - `check_circular_dependencies` - Import cycles
//! - `get_file_dependencies` - Imports and importers of one file
//! - `get_component_dependencies` - Same, for every file with a given stem
//!
//! ## Operations
//! - `operation_status` - Poll a background analysis
//! - `watch_operation` - Collect status updates until done or timeout
//! - `cancel_operation` - Cancel a background analysis
//! - `list_operations` - All tracked operations
//!
//! # Resources
//!
//! Projects are also readable as `project://` resources; see
//! [`resources`].

pub mod analysis;
pub mod context;
pub mod error;
pub mod models;
pub mod resources;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
pub use server::DeplensMcpServer;
