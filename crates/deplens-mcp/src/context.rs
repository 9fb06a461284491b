//! Project registry for the MCP server.
//!
//! This module handles:
//! - Project registration with path canonicalization
//! - Sequential `project<N>` id allocation
//! - Per-project analysis output directories under the data dir
//!
//! The registry is memory-resident; projects are lost on restart.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Registry id, `project<N>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Canonical project root.
    pub path: PathBuf,
    /// Where analysis output for this project is written.
    pub analysis_dir: PathBuf,
    /// When the project was registered.
    pub added_at: DateTime<Utc>,
}

/// In-memory registry of projects.
#[derive(Debug)]
pub struct ProjectRegistry {
    data_dir: PathBuf,
    projects: Vec<Project>,
    next_id: u64,
}

impl ProjectRegistry {
    /// Create an empty registry writing analysis output under `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            projects: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a project directory.
    ///
    /// This will:
    /// 1. Canonicalize the path (resolves `..`, symlinks, validates existence)
    /// 2. Validate the path is a safe, absolute directory
    /// 3. Create `<data_dir>/<project_id>/` for analysis output
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, is not a directory, or
    /// the analysis directory cannot be created.
    pub async fn add_project(&mut self, name: &str, path: &Path) -> Result<Project> {
        debug!(path = %path.display(), "Adding project");

        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::ProjectPathNotFound {
                path: path.display().to_string(),
                source: Some(e),
            })?;
        validate_path(&canonical)?;

        if !tokio::fs::metadata(&canonical).await?.is_dir() {
            return Err(Error::ProjectPathNotFound {
                path: canonical.display().to_string(),
                source: None,
            });
        }

        let id = format!("project{}", self.next_id);
        let analysis_dir = self.data_dir.join(&id);
        tokio::fs::create_dir_all(&analysis_dir).await?;
        self.next_id += 1;

        let project = Project {
            id,
            name: name.to_string(),
            path: canonical,
            analysis_dir,
            added_at: Utc::now(),
        };
        tracing::info!(project_id = %project.id, path = %project.path.display(), "Project added");

        self.projects.push(project.clone());
        Ok(project)
    }

    /// Unregister a project and delete its analysis output.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProjectNotFound` for an unknown id, or an IO error if
    /// the analysis directory cannot be removed.
    pub async fn forget_project(&mut self, project_id: &str) -> Result<Project> {
        let position = self
            .projects
            .iter()
            .position(|p| p.id == project_id)
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
        let project = self.projects.remove(position);

        match tokio::fs::remove_dir_all(&project.analysis_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(project_id = %project.id, "Project forgotten");
        Ok(project)
    }

    /// Look up a project.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProjectNotFound` for an unknown id.
    pub fn get(&self, project_id: &str) -> Result<&Project> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))
    }

    /// All projects in registration order.
    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Root directory for analysis output.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Validate that a canonical path is safe to use as a project root.
///
/// # Security Checks
///
/// - Path must be absolute (canonicalization ensures this)
/// - Path must not contain null bytes
/// - Path must not contain `..` components after canonicalization
fn validate_path(path: &Path) -> Result<()> {
    let invalid = |reason: &str| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            reason.to_string(),
        ))
    };

    if !path.is_absolute() {
        return Err(invalid("Project path must be absolute"));
    }
    if path.to_string_lossy().contains('\0') {
        return Err(invalid("Project path contains invalid characters"));
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(invalid("Project path contains parent directory references"));
    }

    Ok(())
}
