//! Property tests for graph analysis invariants.
//!
//! Graphs are generated over a small file universe so that cycles, shared
//! imports and external imports all occur often.

use deplens::graph::{DependencyGraph, GraphAnalyzer};
use proptest::prelude::*;
use std::collections::HashSet;

const UNIVERSE: usize = 8;

fn file_name(index: usize) -> String {
    format!("src/f{index}.js")
}

/// Declared files are a prefix of the universe; imports may name any file
/// in it, so higher indices act as external imports.
fn graph_strategy() -> impl Strategy<Value = DependencyGraph> {
    prop::collection::vec(prop::collection::vec(0..UNIVERSE, 0..4), 0..UNIVERSE).prop_map(
        |adjacency| {
            DependencyGraph::from_entries(adjacency.into_iter().enumerate().map(
                |(index, imports)| {
                    (
                        file_name(index),
                        imports.into_iter().map(file_name).collect::<Vec<_>>(),
                    )
                },
            ))
        },
    )
}

fn imported_by_others(graph: &DependencyGraph) -> HashSet<String> {
    graph
        .entries()
        .iter()
        .flat_map(|entry| {
            entry
                .imports
                .iter()
                .filter(move |import| **import != entry.path)
                .cloned()
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_cycles_are_unique_rotations(graph in graph_strategy()) {
        let cycles = GraphAnalyzer::new(&graph).detect_cycles(None).unwrap();

        let mut seen = HashSet::new();
        for cycle in &cycles {
            let nodes = cycle.nodes();
            prop_assert!(!nodes.is_empty());
            prop_assert_eq!(nodes.iter().min(), Some(&nodes[0]));
            prop_assert!(seen.insert(nodes.to_vec()), "duplicate cycle {:?}", nodes);
        }
    }

    #[test]
    fn prop_cycles_follow_import_edges(graph in graph_strategy()) {
        let cycles = GraphAnalyzer::new(&graph).detect_cycles(None).unwrap();

        for cycle in &cycles {
            let path = cycle.closed_path();
            for pair in path.windows(2) {
                let imports = graph.imports(&pair[0]).unwrap_or_default();
                prop_assert!(imports.contains(&pair[1]), "{} does not import {}", pair[0], pair[1]);
            }

            let distinct: HashSet<&String> = cycle.nodes().iter().collect();
            prop_assert_eq!(distinct.len(), cycle.len());
        }
    }

    #[test]
    fn prop_unimported_files_are_orphans(graph in graph_strategy()) {
        let orphans = GraphAnalyzer::new(&graph).orphaned_files(&[]).unwrap();
        let imported = imported_by_others(&graph);

        for file in graph.files() {
            prop_assert_eq!(orphans.contains(file), !imported.contains(file));
        }
    }

    #[test]
    fn prop_module_filter_confines_cycles(graph in graph_strategy(), index in 0..UNIVERSE) {
        let filter = format!("f{index}");
        let analyzer = GraphAnalyzer::new(&graph);
        let filtered = analyzer.detect_cycles(Some(filter.as_str())).unwrap();

        for cycle in &filtered {
            prop_assert!(cycle.nodes().iter().all(|node| node.contains(&filter)));
        }
    }

    #[test]
    fn prop_reverse_dependencies_in_graph_order(graph in graph_strategy(), index in 0..UNIVERSE) {
        let target = file_name(index);
        let importers = GraphAnalyzer::new(&graph).reverse_dependencies(&target);

        let expected: Vec<String> = graph
            .entries()
            .iter()
            .filter(|entry| entry.imports.contains(&target))
            .map(|entry| entry.path.clone())
            .collect();
        prop_assert_eq!(importers, expected);
    }
}
