//! Circular dependency detection.
//!
//! The import graph is loaded into a petgraph `DiGraph` so nodes get dense
//! indices; traversal state (visited, on-path) lives in plain vectors
//! indexed by node.
//!
//! # Algorithm
//!
//! A depth-first search runs from every declared file. Each traversal root
//! gets a fresh visited set, so a node explored from one root is explored
//! again from the next; this finds cycles that a single shared visited set
//! would hide behind an earlier traversal. When an edge reaches a node
//! that is still on the current path, the path slice from that node to the
//! current node is recorded as a cycle.
//!
//! Cycles are normalized by rotating the lexicographically smallest path
//! to the front, and deduplicated on that form. Direction is kept:
//! `a -> b -> c -> a` and `a -> c -> b -> a` are distinct cycles.

use super::DependencyGraph;
use crate::error::{Error, Result};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex, Neighbors};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How serious a circular dependency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Three or more files involved.
    High,
    /// A self-import or a mutual import between two files.
    Medium,
}

impl Severity {
    /// The lowercase name used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

/// A circular import chain, normalized so the smallest path comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cycle {
    nodes: Vec<String>,
}

impl Cycle {
    /// Build a cycle from its members in edge order, normalizing the rotation.
    ///
    /// The closing repeat of the first node must not be included.
    #[must_use]
    pub fn new(mut nodes: Vec<String>) -> Self {
        if let Some(min_idx) = nodes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(idx, _)| idx)
        {
            nodes.rotate_left(min_idx);
        }
        Self { nodes }
    }

    /// Members of the cycle, smallest first, without the closing repeat.
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// The cycle as a closed walk: `v0, v1, ..., vk-1, v0`.
    #[must_use]
    pub fn closed_path(&self) -> Vec<String> {
        let mut path = self.nodes.clone();
        if let Some(first) = self.nodes.first() {
            path.push(first.clone());
        }
        path
    }

    /// Number of files in the cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cycle has no members (never produced by detection).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `path` participates in the cycle.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.iter().any(|node| node == path)
    }

    /// `High` when more than two distinct files are involved.
    #[must_use]
    pub fn severity(&self) -> Severity {
        let distinct: HashSet<&str> = self.nodes.iter().map(String::as_str).collect();
        if distinct.len() > 2 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Detect all circular dependencies reachable in `graph`.
///
/// With a `module_filter`, traversal starts only at declared files whose
/// path contains the filter and never enters a file that does not.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the filter is empty or blank.
pub fn detect_cycles(graph: &DependencyGraph, module_filter: Option<&str>) -> Result<Vec<Cycle>> {
    if let Some(filter) = module_filter {
        if filter.trim().is_empty() {
            return Err(Error::invalid(
                "module filter",
                "must not be empty; omit it to scan every module",
            ));
        }
    }

    let import_graph = ImportGraph::build(graph);
    if !algo::is_cyclic_directed(&import_graph.graph) {
        tracing::debug!(files = graph.len(), "Import graph is acyclic");
        return Ok(Vec::new());
    }

    let allowed: Vec<bool> = import_graph
        .graph
        .node_indices()
        .map(|idx| module_filter.is_none_or(|filter| import_graph.graph[idx].contains(filter)))
        .collect();

    let mut traversal = Traversal::new(import_graph.graph.node_count());
    let mut raw_cycles: Vec<Vec<NodeIndex>> = Vec::new();

    for root in graph.files() {
        let root_idx = import_graph.node_map[root];
        if allowed[root_idx.index()] {
            traversal.run(&import_graph.graph, root_idx, &allowed, &mut raw_cycles);
        }
    }

    let raw_count = raw_cycles.len();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut unique = Vec::new();
    for raw in raw_cycles {
        let cycle = Cycle::new(
            raw.into_iter()
                .map(|idx| import_graph.graph[idx].to_string())
                .collect(),
        );
        if seen.insert(cycle.nodes.clone()) {
            unique.push(cycle);
        }
    }

    tracing::debug!(
        raw_cycles = raw_count,
        unique_cycles = unique.len(),
        module_filter = module_filter.unwrap_or(""),
        "Cycle detection complete"
    );
    Ok(unique)
}

/// The dependency graph as a petgraph `DiGraph` over borrowed paths.
struct ImportGraph<'g> {
    graph: DiGraph<&'g str, ()>,
    node_map: HashMap<&'g str, NodeIndex>,
}

impl<'g> ImportGraph<'g> {
    fn build(source: &'g DependencyGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<&'g str, NodeIndex> = HashMap::new();

        for file in source.files() {
            node_map.insert(file, graph.add_node(file));
        }

        for entry in source.entries() {
            let from = node_map[entry.path.as_str()];
            // petgraph lists neighbors newest-first; add in reverse so
            // traversal follows the scanner's import order.
            for import in entry.imports.iter().rev() {
                let to = *node_map
                    .entry(import.as_str())
                    .or_insert_with(|| graph.add_node(import.as_str()));
                graph.add_edge(from, to, ());
            }
        }

        Self { graph, node_map }
    }
}

/// Reusable per-root DFS state, indexed by node.
struct Traversal {
    visited: Vec<bool>,
    on_path: Vec<bool>,
    path: Vec<NodeIndex>,
}

impl Traversal {
    fn new(node_count: usize) -> Self {
        Self {
            visited: vec![false; node_count],
            on_path: vec![false; node_count],
            path: Vec::new(),
        }
    }

    /// Explicit-stack DFS from `root`, appending every back-edge cycle.
    fn run(
        &mut self,
        graph: &DiGraph<&str, ()>,
        root: NodeIndex,
        allowed: &[bool],
        cycles: &mut Vec<Vec<NodeIndex>>,
    ) {
        self.visited.fill(false);
        self.on_path.fill(false);
        self.path.clear();

        let mut stack: Vec<Neighbors<'_, ()>> = Vec::new();
        self.enter(root);
        stack.push(graph.neighbors(root));

        while let Some(neighbors) = stack.last_mut() {
            let Some(next) = neighbors.next() else {
                stack.pop();
                if let Some(done) = self.path.pop() {
                    self.on_path[done.index()] = false;
                }
                continue;
            };

            if !allowed[next.index()] {
                continue;
            }

            if self.on_path[next.index()] {
                if let Some(start) = self.path.iter().position(|&idx| idx == next) {
                    cycles.push(self.path[start..].to_vec());
                }
            } else if !self.visited[next.index()] {
                self.enter(next);
                stack.push(graph.neighbors(next));
            }
        }
    }

    fn enter(&mut self, node: NodeIndex) {
        self.visited[node.index()] = true;
        self.on_path[node.index()] = true;
        self.path.push(node);
    }
}
