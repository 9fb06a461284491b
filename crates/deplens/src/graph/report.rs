//! Persisted analysis reports.
//!
//! Dashboards read these files directly, so the field names are fixed:
//!
//! ```json
//! {"circular_dependencies": [{"cycle": ["a.js", "b.js", "a.js"], "severity": "medium"}]}
//! {"orphaned_files": ["unused.js"]}
//! ```

use super::cycles::{Cycle, Severity};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// File name of the circular dependency report.
pub const CIRCULAR_REPORT_FILE: &str = "circular_dependencies.json";

/// File name of the orphaned files report.
pub const ORPHANED_REPORT_FILE: &str = "orphaned_files.json";

/// One circular dependency as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEntry {
    /// The closed walk, first file repeated at the end.
    pub cycle: Vec<String>,
    /// Severity of the cycle.
    pub severity: Severity,
}

impl From<&Cycle> for CycleEntry {
    fn from(cycle: &Cycle) -> Self {
        Self {
            cycle: cycle.closed_path(),
            severity: cycle.severity(),
        }
    }
}

/// `{circular_dependencies: [...]}` report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularDependencyReport {
    /// Detected cycles.
    pub circular_dependencies: Vec<CycleEntry>,
}

impl CircularDependencyReport {
    /// Build the report from detected cycles.
    #[must_use]
    pub fn new(cycles: &[Cycle]) -> Self {
        Self {
            circular_dependencies: cycles.iter().map(CycleEntry::from).collect(),
        }
    }

    /// Write the report into `dir` as [`CIRCULAR_REPORT_FILE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        write_json(self, &dir.join(CIRCULAR_REPORT_FILE)).await
    }

    /// Read the report from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub async fn read_from(dir: &Path) -> Result<Self> {
        read_json(&dir.join(CIRCULAR_REPORT_FILE)).await
    }
}

/// `{orphaned_files: [...]}` report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedFilesReport {
    /// Orphaned file paths, sorted.
    pub orphaned_files: Vec<String>,
}

impl OrphanedFilesReport {
    /// Build the report from an orphan set.
    #[must_use]
    pub fn new(orphans: &BTreeSet<String>) -> Self {
        Self {
            orphaned_files: orphans.iter().cloned().collect(),
        }
    }

    /// Write the report into `dir` as [`ORPHANED_REPORT_FILE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        write_json(self, &dir.join(ORPHANED_REPORT_FILE)).await
    }

    /// Read the report from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub async fn read_from(dir: &Path) -> Result<Self> {
        read_json(&dir.join(ORPHANED_REPORT_FILE)).await
    }
}

/// Write pretty JSON via a temp file and rename, so readers never see a
/// half-written report.
async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = temp_path(path);
    let written = match tokio::fs::write(&tmp, json).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    tracing::debug!(path = %path.display(), "Wrote report");
    Ok(path.to_path_buf())
}

/// A sibling temp path unique to this write, so concurrent writers of the
/// same report never share one.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "report".into(), |name| name.to_string_lossy());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read(path).await?;
    serde_json::from_slice(&content).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_circular_report_shape() {
        let report = CircularDependencyReport::new(&[
            Cycle::new(vec!["b.js".into(), "a.js".into()]),
            Cycle::new(vec!["a.js".into(), "b.js".into(), "c.js".into()]),
        ]);

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "circular_dependencies": [
                    {"cycle": ["a.js", "b.js", "a.js"], "severity": "medium"},
                    {"cycle": ["a.js", "b.js", "c.js", "a.js"], "severity": "high"}
                ]
            })
        );
    }

    #[test]
    fn test_orphaned_report_shape() {
        let orphans: BTreeSet<String> = ["z.js".to_string(), "a.js".to_string()].into();
        let report = OrphanedFilesReport::new(&orphans);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"orphaned_files": ["a.js", "z.js"]})
        );
    }

    #[tokio::test]
    async fn test_reports_written_and_read_back() {
        let dir = tempfile::TempDir::new().unwrap();

        let circular = CircularDependencyReport::new(&[Cycle::new(vec!["x.js".into()])]);
        let path = circular.write_to(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(CIRCULAR_REPORT_FILE));
        assert_eq!(
            CircularDependencyReport::read_from(dir.path()).await.unwrap(),
            circular
        );

        let orphaned = OrphanedFilesReport {
            orphaned_files: vec!["unused.js".to_string()],
        };
        orphaned.write_to(dir.path()).await.unwrap();
        assert_eq!(
            OrphanedFilesReport::read_from(dir.path()).await.unwrap(),
            orphaned
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_all_succeed() {
        let dir = tempfile::TempDir::new().unwrap();

        let writers: Vec<_> = (0..32)
            .map(|i| {
                let dir = dir.path().to_path_buf();
                tokio::spawn(async move {
                    OrphanedFilesReport {
                        orphaned_files: vec![format!("file{i}.js")],
                    }
                    .write_to(&dir)
                    .await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let report = OrphanedFilesReport::read_from(dir.path()).await.unwrap();
        assert_eq!(report.orphaned_files.len(), 1);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec![ORPHANED_REPORT_FILE]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory in the report's place makes the final rename fail
        std::fs::create_dir(dir.path().join(ORPHANED_REPORT_FILE)).unwrap();
        std::fs::write(dir.path().join(ORPHANED_REPORT_FILE).join("keep"), "x").unwrap();

        let result = OrphanedFilesReport::default().write_to(dir.path()).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_report_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = OrphanedFilesReport::read_from(dir.path()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
