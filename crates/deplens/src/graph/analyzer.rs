//! Pure queries over a loaded [`DependencyGraph`].
//!
//! [`GraphAnalyzer`] borrows a graph snapshot and builds a reverse index
//! (file -> importers) once, so per-file queries do not rescan every import
//! list.

use super::cycles::{self, Cycle};
use super::DependencyGraph;
use crate::error::{Error, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Message attached to an ambiguous file lookup.
const AMBIGUOUS_MESSAGE: &str = "Multiple files match this path. Please specify a more precise path.";

/// Imports and importers of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependencies {
    /// The declared file path.
    pub file: String,
    /// Files this file imports.
    pub imports: Vec<String>,
    /// Files that import this file, in graph order.
    pub imported_by: Vec<String>,
}

/// Outcome of a file dependency lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileLookup {
    /// The path matched a declared file exactly.
    Exact(FileDependencies),
    /// The path only matched as a suffix; the caller must pick one.
    Ambiguous {
        /// Every declared file ending with the requested path.
        matching_files: Vec<String>,
        /// Guidance for the caller.
        message: String,
    },
}

/// Headline numbers for an analyzed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Declared files.
    pub files: usize,
    /// Import edges.
    pub edges: usize,
    /// Distinct imported paths that are not declared files.
    pub external_imports: usize,
    /// Orphaned files (no exclusions applied).
    pub orphaned: usize,
    /// Distinct cycles.
    pub cycles: usize,
}

/// Read-only analyzer over a dependency graph snapshot.
#[derive(Debug)]
pub struct GraphAnalyzer<'g> {
    graph: &'g DependencyGraph,
    /// Importers of each path, excluding self-imports, in graph order.
    importers: HashMap<&'g str, Vec<&'g str>>,
}

impl<'g> GraphAnalyzer<'g> {
    /// Create an analyzer for the given graph.
    #[must_use]
    pub fn new(graph: &'g DependencyGraph) -> Self {
        let mut importers: HashMap<&'g str, Vec<&'g str>> = HashMap::new();
        for entry in graph.entries() {
            for import in &entry.imports {
                if import == &entry.path {
                    continue;
                }
                let list = importers.entry(import.as_str()).or_default();
                // An entry importing the same file twice is still one importer
                if list.last() != Some(&entry.path.as_str()) {
                    list.push(entry.path.as_str());
                }
            }
        }

        Self { graph, importers }
    }

    /// The graph being analyzed.
    #[must_use]
    pub fn graph(&self) -> &'g DependencyGraph {
        self.graph
    }

    /// Declared files that no other file imports.
    ///
    /// Orphans matching any of `exclude_patterns` (shell globs) are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a pattern cannot be parsed.
    pub fn orphaned_files(&self, exclude_patterns: &[String]) -> Result<BTreeSet<String>> {
        let patterns = exclude_patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw)
                    .map_err(|e| Error::invalid("exclude pattern", format!("'{raw}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let orphans: BTreeSet<String> = self
            .graph
            .files()
            .filter(|file| !self.importers.contains_key(file))
            .filter(|file| !patterns.iter().any(|pattern| pattern.matches(file)))
            .map(str::to_string)
            .collect();

        tracing::debug!(
            total_files = self.graph.len(),
            orphaned = orphans.len(),
            patterns = patterns.len(),
            "Computed orphaned files"
        );
        Ok(orphans)
    }

    /// Declared files whose import list contains `file_path`, in graph order.
    ///
    /// `file_path` does not need to be a declared file.
    #[must_use]
    pub fn reverse_dependencies(&self, file_path: &str) -> Vec<String> {
        let mut result: Vec<String> = self
            .importers
            .get(file_path)
            .map(|list| list.iter().map(|s| (*s).to_string()).collect())
            .unwrap_or_default();

        // Self-imports are left out of the index but still count here
        if self
            .graph
            .imports(file_path)
            .is_some_and(|imports| imports.iter().any(|i| i == file_path))
        {
            let position = self.position(file_path);
            let insert_at = result
                .iter()
                .position(|other| self.position(other) > position)
                .unwrap_or(result.len());
            result.insert(insert_at, file_path.to_string());
        }

        result
    }

    /// Imports and importers of a file.
    ///
    /// A single leading `/` is ignored. An exact key match wins; otherwise
    /// every declared file ending with the path is returned as an ambiguous
    /// candidate list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no declared file matches.
    pub fn file_dependencies(&self, file_path: &str) -> Result<FileLookup> {
        let normalized = file_path.strip_prefix('/').unwrap_or(file_path);

        if let Some(imports) = self.graph.imports(normalized) {
            return Ok(FileLookup::Exact(FileDependencies {
                file: normalized.to_string(),
                imports: imports.to_vec(),
                imported_by: self.reverse_dependencies(normalized),
            }));
        }

        let matching_files: Vec<String> = self
            .graph
            .files()
            .filter(|file| !normalized.is_empty() && file.ends_with(normalized))
            .map(str::to_string)
            .collect();

        if matching_files.is_empty() {
            return Err(Error::NotFound(file_path.to_string()));
        }

        tracing::debug!(
            path = normalized,
            candidates = matching_files.len(),
            "File lookup is ambiguous"
        );
        Ok(FileLookup::Ambiguous {
            matching_files,
            message: AMBIGUOUS_MESSAGE.to_string(),
        })
    }

    /// Dependencies of every declared file whose stem equals `component_name`.
    ///
    /// `Button` matches `src/components/Button.tsx` and `lib/Button.js`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no file stem matches.
    pub fn component_dependencies(&self, component_name: &str) -> Result<Vec<FileDependencies>> {
        let matches: Vec<FileDependencies> = self
            .graph
            .entries()
            .iter()
            .filter(|entry| {
                Path::new(&entry.path)
                    .file_stem()
                    .is_some_and(|stem| stem == component_name)
            })
            .map(|entry| FileDependencies {
                file: entry.path.clone(),
                imports: entry.imports.clone(),
                imported_by: self.reverse_dependencies(&entry.path),
            })
            .collect();

        if matches.is_empty() {
            return Err(Error::NotFound(format!("component {component_name}")));
        }
        Ok(matches)
    }

    /// Circular dependencies, optionally restricted to paths containing
    /// `module_filter`. See [`cycles::detect_cycles`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty or blank filter.
    pub fn detect_cycles(&self, module_filter: Option<&str>) -> Result<Vec<Cycle>> {
        cycles::detect_cycles(self.graph, module_filter)
    }

    /// Headline numbers for the graph.
    ///
    /// # Errors
    ///
    /// Propagates errors from cycle detection (none occur without a filter).
    pub fn summary(&self) -> Result<GraphSummary> {
        let external: BTreeSet<&str> = self
            .graph
            .entries()
            .iter()
            .flat_map(|entry| entry.imports.iter())
            .map(String::as_str)
            .filter(|import| !self.graph.contains(import))
            .collect();

        Ok(GraphSummary {
            files: self.graph.len(),
            edges: self.graph.edge_count(),
            external_imports: external.len(),
            orphaned: self.orphaned_files(&[])?.len(),
            cycles: self.detect_cycles(None)?.len(),
        })
    }

    fn position(&self, path: &str) -> usize {
        self.graph.position(path).unwrap_or(usize::MAX)
    }
}
