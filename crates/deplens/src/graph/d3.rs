//! Node/link export for D3 force-directed visualizations.

use super::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A file node in the D3 export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D3Node {
    /// Dense node id, assigned in first-seen order.
    pub id: usize,
    /// The file path.
    pub name: String,
    /// Coloring group, see [`file_group`].
    pub group: u8,
}

/// An import edge in the D3 export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D3Link {
    /// Id of the importing file.
    pub source: usize,
    /// Id of the imported file.
    pub target: usize,
    /// Link weight (always 1).
    pub value: u32,
}

/// The dependency graph as D3 `nodes` and `links` arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct D3Graph {
    /// Every declared or imported file, each once.
    pub nodes: Vec<D3Node>,
    /// One link per import edge.
    pub links: Vec<D3Link>,
}

impl From<&DependencyGraph> for D3Graph {
    fn from(graph: &DependencyGraph) -> Self {
        let mut export = Self::default();
        let mut ids: HashMap<&str, usize> = HashMap::new();

        for entry in graph.entries() {
            let source = node_id(&mut ids, &entry.path, &mut export.nodes);
            for import in &entry.imports {
                let target = node_id(&mut ids, import, &mut export.nodes);
                export.links.push(D3Link {
                    source,
                    target,
                    value: 1,
                });
            }
        }

        export
    }
}

/// Id of `name`, adding a node the first time it is seen.
fn node_id<'a>(
    ids: &mut HashMap<&'a str, usize>,
    name: &'a str,
    nodes: &mut Vec<D3Node>,
) -> usize {
    *ids.entry(name).or_insert_with(|| {
        nodes.push(D3Node {
            id: nodes.len(),
            name: name.to_string(),
            group: file_group(name),
        });
        nodes.len() - 1
    })
}

/// Classify a file for visualization coloring.
///
/// Extensions are checked before directories:
///
/// | group | match |
/// |-------|-------|
/// | 1 | `.ts`, `.tsx` |
/// | 2 | `.js`, `.jsx` |
/// | 3 | `.css`, `.scss` |
/// | 4 | `/components/` |
/// | 5 | `/pages/`, `/views/` |
/// | 6 | `/utils/`, `/helpers/` |
/// | 0 | anything else |
#[must_use]
pub fn file_group(path: &str) -> u8 {
    let has_ext = |exts: &[&str]| exts.iter().any(|ext| path.ends_with(ext));

    if has_ext(&[".ts", ".tsx"]) {
        1
    } else if has_ext(&[".js", ".jsx"]) {
        2
    } else if has_ext(&[".css", ".scss"]) {
        3
    } else if path.contains("/components/") {
        4
    } else if path.contains("/pages/") || path.contains("/views/") {
        5
    } else if path.contains("/utils/") || path.contains("/helpers/") {
        6
    } else {
        0
    }
}
