//! File import graph produced by the external dependency scanner.
//!
//! The scanner writes `dependency-graph.json`, a JSON object mapping each
//! file path to a record with (at least) an `imports` list:
//!
//! ```json
//! {
//!   "src/a.js": { "imports": ["src/b.js"] },
//!   "src/b.js": { "imports": [] }
//! }
//! ```
//!
//! Paths are opaque strings. Imports may name files that are not keys of the
//! map (external or unresolved imports). Key order is preserved, because
//! reverse-dependency queries report results in the graph's natural order.
//!
//! A [`DependencyGraph`] is an immutable snapshot for the duration of a
//! query; a new analysis run replaces it wholesale.

mod analyzer;
mod cycles;
mod d3;
mod report;

pub use analyzer::{FileDependencies, FileLookup, GraphAnalyzer, GraphSummary};
pub use cycles::{Cycle, Severity};
pub use d3::{D3Graph, D3Link, D3Node, file_group};
pub use report::{
    CIRCULAR_REPORT_FILE, CircularDependencyReport, CycleEntry, ORPHANED_REPORT_FILE,
    OrphanedFilesReport,
};

use crate::error::{Error, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single file and the files it imports, in scanner order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The file path, exactly as the scanner reported it.
    pub path: String,
    /// Imported file paths, exactly as the scanner reported them.
    pub imports: Vec<String>,
}

/// Mapping from file path to its imported file paths.
///
/// Entries keep their insertion order. Lookups by path are O(1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    entries: Vec<FileEntry>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(path, imports)` pairs.
    ///
    /// A repeated path replaces the earlier import list but keeps the
    /// position of its first occurrence.
    pub fn from_entries<P, I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<S>)>,
        P: Into<String>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for (path, imports) in entries {
            graph.insert(path.into(), imports.into_iter().map(Into::into).collect());
        }
        graph
    }

    /// Parse scanner output held in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is not a JSON object of
    /// import records.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|source| Error::Json {
            path: PathBuf::from("<memory>"),
            source,
        })
    }

    /// Load scanner output from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Json`]
    /// naming the file if it cannot be parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let graph: Self = serde_json::from_str(&content).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            files = graph.len(),
            edges = graph.edge_count(),
            "Loaded dependency graph"
        );
        Ok(graph)
    }

    fn insert(&mut self, path: String, imports: Vec<String>) {
        if let Some(&position) = self.index.get(&path) {
            self.entries[position].imports = imports;
        } else {
            self.index.insert(path.clone(), self.entries.len());
            self.entries.push(FileEntry { path, imports });
        }
    }

    /// Number of declared files (keys).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the graph declares no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of import edges, counting duplicates.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.imports.len()).sum()
    }

    /// Whether `path` is a declared file.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// The imports of a declared file.
    #[must_use]
    pub fn imports(&self, path: &str) -> Option<&[String]> {
        self.index
            .get(path)
            .map(|&position| self.entries[position].imports.as_slice())
    }

    /// Insertion position of a declared file.
    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        self.index.get(path).copied()
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// All declared file paths in insertion order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }
}

#[derive(Deserialize)]
struct ImportRecord {
    #[serde(default)]
    imports: Option<Vec<String>>,
}

impl<'de> Deserialize<'de> for DependencyGraph {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DependencyGraph;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file paths to import records")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut graph = DependencyGraph::new();
                while let Some((path, record)) = map.next_entry::<String, ImportRecord>()? {
                    graph.insert(path, record.imports.unwrap_or_default());
                }
                Ok(graph)
            }
        }

        deserializer.deserialize_map(GraphVisitor)
    }
}

#[derive(Serialize)]
struct ImportRecordRef<'a> {
    imports: &'a [String],
}

impl Serialize for DependencyGraph {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(
                &entry.path,
                &ImportRecordRef {
                    imports: &entry.imports,
                },
            )?;
        }
        map.end()
    }
}
