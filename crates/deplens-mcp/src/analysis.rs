//! Full project analysis.
//!
//! Runs the external import scanner for a project, then loads the graph it
//! wrote, computes orphans and cycles, and persists both reports next to the
//! graph. Runs as a tracked operation; see [`run_analysis`].

use crate::context::Project;
use anyhow::{Context as _, bail};
use deplens::config::ScannerConfig;
use deplens::graph::{
    CircularDependencyReport, DependencyGraph, GraphAnalyzer, OrphanedFilesReport,
};
use deplens::operations::{MessageSeverity, OperationHandle};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Invokes the external dependency scanner.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: ScannerConfig,
    poll_interval: Duration,
}

impl Scanner {
    /// Create a scanner. `poll_interval` bounds how long a cancelled scan
    /// keeps running before the child is killed.
    #[must_use]
    pub fn new(config: ScannerConfig, poll_interval: Duration) -> Self {
        Self {
            config,
            poll_interval,
        }
    }

    /// Where the graph file for `project` lives once analyzed.
    #[must_use]
    pub fn graph_path(&self, project: &Project) -> PathBuf {
        project.analysis_dir.join(&self.config.graph_file)
    }

    /// Scanner arguments:
    /// `<script> --root-dir <path> --output-dir <dir> [--exclude=a,b] <extra_args>`.
    #[must_use]
    pub fn args(&self, project: &Project, exclude: &[String]) -> Vec<String> {
        let mut args = Vec::new();
        if !self.config.script.is_empty() {
            args.push(self.config.script.clone());
        }
        args.extend([
            "--root-dir".to_string(),
            project.path.display().to_string(),
            "--output-dir".to_string(),
            project.analysis_dir.display().to_string(),
        ]);
        if !exclude.is_empty() {
            args.push(format!("--exclude={}", exclude.join(",")));
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Run the scanner to completion.
    ///
    /// Each stdout line is recorded as an operation message. The child is
    /// killed once the operation is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner cannot be started, exits with a
    /// failure status, or the operation is cancelled.
    pub async fn run(
        &self,
        project: &Project,
        exclude: &[String],
        handle: &OperationHandle,
    ) -> anyhow::Result<()> {
        let args = self.args(project, exclude);
        tracing::debug!(program = %self.config.program, ?args, "Starting scanner");

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start scanner '{}'", self.config.program))?;

        let stdout = child.stdout.take();
        let output_handle = handle.clone();
        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if !line.is_empty() && output_handle.info(line).is_err() {
                    break;
                }
            }
        });

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut output).await;
            }
            output
        });

        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.context("Failed to wait for scanner")?;
                    // Scanner output is recorded before the next step starts
                    let _ = stdout_task.await;
                    let stderr = stderr_task.await.unwrap_or_default();
                    if !status.success() {
                        bail!("Scanner exited with {status}: {}", stderr.trim());
                    }
                    tracing::debug!("Scanner finished");
                    return Ok(());
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    if handle.is_cancelled() {
                        child.kill().await.context("Failed to stop scanner")?;
                        tracing::info!("Scanner killed after cancellation");
                        bail!("Analysis cancelled");
                    }
                }
            }
        }
    }

    /// Find the graph the scanner wrote, copying `<project>/<graph_file>`
    /// into the analysis directory if the scanner left it in the project.
    async fn locate_graph(
        &self,
        project: &Project,
        handle: &OperationHandle,
    ) -> anyhow::Result<PathBuf> {
        let target = self.graph_path(project);
        if tokio::fs::try_exists(&target).await? {
            return Ok(target);
        }

        let fallback = project.path.join(&self.config.graph_file);
        if tokio::fs::try_exists(&fallback).await? {
            tokio::fs::copy(&fallback, &target)
                .await
                .with_context(|| format!("Failed to copy {}", fallback.display()))?;
            handle.add_message(
                &format!("Using {} from the project directory", self.config.graph_file),
                MessageSeverity::Warning,
            )?;
            return Ok(target);
        }

        bail!(
            "Scanner produced no {} in {} or {}",
            self.config.graph_file,
            project.analysis_dir.display(),
            project.path.display()
        )
    }
}

fn checkpoint(handle: &OperationHandle, progress: f64, message: &str) -> anyhow::Result<()> {
    if handle.is_cancelled() {
        bail!("Analysis cancelled");
    }
    handle.update_progress(progress, Some(message))?;
    Ok(())
}

/// Analyze `project` end to end, reporting progress through `handle`.
///
/// Completes with `{project_id, graph_file, summary, reports}`.
///
/// # Errors
///
/// Returns an error if scanning fails, no graph is produced, or a report
/// cannot be written.
pub async fn run_analysis(
    scanner: Arc<Scanner>,
    project: Project,
    exclude: Vec<String>,
    handle: OperationHandle,
) -> anyhow::Result<Value> {
    tracing::info!(project_id = %project.id, "Analysis started");

    checkpoint(
        &handle,
        0.05,
        &format!("Scanning {} ({})", project.name, project.path.display()),
    )?;
    scanner.run(&project, &exclude, &handle).await?;

    checkpoint(&handle, 0.6, "Loading dependency graph")?;
    let graph_path = scanner.locate_graph(&project, &handle).await?;
    let graph = DependencyGraph::load(&graph_path).await?;
    let analyzer = GraphAnalyzer::new(&graph);

    checkpoint(&handle, 0.7, "Finding orphaned files")?;
    let orphans = analyzer.orphaned_files(&[])?;
    let orphaned_report = OrphanedFilesReport::new(&orphans)
        .write_to(&project.analysis_dir)
        .await?;

    checkpoint(&handle, 0.85, "Detecting circular dependencies")?;
    let cycles = analyzer.detect_cycles(None)?;
    let circular_report = CircularDependencyReport::new(&cycles)
        .write_to(&project.analysis_dir)
        .await?;

    let summary = analyzer.summary()?;
    tracing::info!(
        project_id = %project.id,
        files = summary.files,
        orphaned = summary.orphaned,
        cycles = summary.cycles,
        "Analysis finished"
    );

    Ok(json!({
        "project_id": project.id,
        "graph_file": graph_path.display().to_string(),
        "summary": summary,
        "reports": {
            "orphaned_files": orphaned_report.display().to_string(),
            "circular_dependencies": circular_report.display().to_string(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn project() -> Project {
        Project {
            id: "project1".to_string(),
            name: "web".to_string(),
            path: PathBuf::from("/srv/web"),
            analysis_dir: PathBuf::from("/data/project1"),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_scanner_args() {
        let scanner = Scanner::new(
            ScannerConfig {
                extra_args: vec!["--verbose".to_string()],
                ..ScannerConfig::default()
            },
            Duration::from_millis(100),
        );

        let args = scanner.args(&project(), &["node_modules".into(), "dist".into()]);
        assert_eq!(
            args,
            vec![
                "scripts/dependency-workflow.cjs",
                "--root-dir",
                "/srv/web",
                "--output-dir",
                "/data/project1",
                "--exclude=node_modules,dist",
                "--verbose",
            ]
        );
    }

    #[test]
    fn test_scanner_args_without_script() {
        let scanner = Scanner::new(
            ScannerConfig {
                program: "depscan".to_string(),
                script: String::new(),
                ..ScannerConfig::default()
            },
            Duration::from_millis(100),
        );

        let args = scanner.args(&project(), &[]);
        assert_eq!(args[0], "--root-dir");
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_graph_path() {
        let scanner = Scanner::new(ScannerConfig::default(), Duration::from_millis(100));
        assert_eq!(
            scanner.graph_path(&project()),
            PathBuf::from("/data/project1/dependency-graph.json")
        );
    }
}
