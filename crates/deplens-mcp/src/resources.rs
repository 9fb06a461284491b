//! `project://` resources.
//!
//! Supported URIs:
//! - `project://{project_id}/structure` - directory tree of the project
//! - `project://{project_id}/dependencies` - the analyzed dependency graph
//! - `project://{project_id}/file/{path}/dependencies` - one file; `path`
//!   may span several segments and is percent-decoded
//! - `project://{project_id}/component/{name}/dependencies` - one component

use crate::context::Project;
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use rmcp::model::{AnnotateAble, RawResource, RawResourceTemplate, Resource, ResourceTemplate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// URI scheme of project resources.
pub const RESOURCE_SCHEME: &str = "project://";

/// Entries never listed in a project structure, besides dotfiles.
const SKIPPED_ENTRIES: &[&str] = &["node_modules", "dist", "build"];

const JSON_MIME: &str = "application/json";

/// A parsed `project://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectResource {
    /// `project://{id}/structure`
    Structure {
        /// Project id.
        project_id: String,
    },
    /// `project://{id}/dependencies`
    Dependencies {
        /// Project id.
        project_id: String,
    },
    /// `project://{id}/file/{path}/dependencies`
    FileDependencies {
        /// Project id.
        project_id: String,
        /// Decoded file path.
        file_path: String,
    },
    /// `project://{id}/component/{name}/dependencies`
    ComponentDependencies {
        /// Project id.
        project_id: String,
        /// Decoded component name.
        component_name: String,
    },
}

impl ProjectResource {
    /// Parse a resource URI.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResourceUri` for any other scheme or shape.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || Error::InvalidResourceUri(uri.to_string());

        let rest = uri.strip_prefix(RESOURCE_SCHEME).ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split('/').collect();
        let project_id = match parts.first() {
            Some(id) if !id.is_empty() => (*id).to_string(),
            _ => return Err(invalid()),
        };

        match parts.as_slice() {
            [_, "structure"] => Ok(Self::Structure { project_id }),
            [_, "dependencies"] => Ok(Self::Dependencies { project_id }),
            [_, "file", path @ .., "dependencies"] if !path.is_empty() => {
                let file_path = decode(&path.join("/")).ok_or_else(invalid)?;
                Ok(Self::FileDependencies {
                    project_id,
                    file_path,
                })
            }
            [_, "component", name, "dependencies"] if !name.is_empty() => {
                let component_name = decode(name).ok_or_else(invalid)?;
                Ok(Self::ComponentDependencies {
                    project_id,
                    component_name,
                })
            }
            _ => Err(invalid()),
        }
    }

    /// The project the resource belongs to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        match self {
            Self::Structure { project_id }
            | Self::Dependencies { project_id }
            | Self::FileDependencies { project_id, .. }
            | Self::ComponentDependencies { project_id, .. } => project_id,
        }
    }
}

fn decode(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}

/// The fixed resources of each registered project.
#[must_use]
pub fn project_resources(projects: &[Project]) -> Vec<Resource> {
    projects
        .iter()
        .flat_map(|project| {
            let mut structure = RawResource::new(
                format!("{RESOURCE_SCHEME}{}/structure", project.id),
                format!("{}-structure", project.id),
            );
            structure.description = Some(format!("Directory tree of {}", project.name));
            structure.mime_type = Some(JSON_MIME.into());

            let mut dependencies = RawResource::new(
                format!("{RESOURCE_SCHEME}{}/dependencies", project.id),
                format!("{}-dependencies", project.id),
            );
            dependencies.description =
                Some(format!("Analyzed dependency graph of {}", project.name));
            dependencies.mime_type = Some(JSON_MIME.into());

            [structure.no_annotation(), dependencies.no_annotation()]
        })
        .collect()
}

/// URI templates for every supported resource shape.
#[must_use]
pub fn resource_templates() -> Vec<ResourceTemplate> {
    [
        (
            "project://{project_id}/structure",
            "project-structure",
            "Directory tree of a project, without dotfiles, node_modules, dist and build",
        ),
        (
            "project://{project_id}/dependencies",
            "project-dependencies",
            "Analyzed dependency graph of a project",
        ),
        (
            "project://{project_id}/file/{path}/dependencies",
            "file-dependencies",
            "Imports and importers of one file; the path is percent-decoded",
        ),
        (
            "project://{project_id}/component/{name}/dependencies",
            "component-dependencies",
            "Imports and importers of every file with the given name",
        ),
    ]
    .into_iter()
    .map(|(uri_template, name, description)| {
        RawResourceTemplate {
            uri_template: uri_template.into(),
            name: name.into(),
            title: None,
            description: Some(description.into()),
            mime_type: Some(JSON_MIME.into()),
        }
        .no_annotation()
    })
    .collect()
}

/// A node of a project directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructureNode {
    /// A directory and its listed children, sorted by name.
    Directory {
        /// Directory name.
        name: String,
        /// Children.
        children: Vec<StructureNode>,
    },
    /// A file.
    File {
        /// File name.
        name: String,
        /// Path relative to the project root, `/`-separated.
        path: String,
        /// Extension without the dot.
        extension: Option<String>,
    },
}

/// Walk `root` into a tree named `root_name`.
///
/// Dotfiles, `node_modules`, `dist` and `build` are left out. Symlinks are
/// listed as files and never followed. Unreadable directories are logged
/// and listed with the children read so far.
#[must_use]
pub fn project_structure(root: &Path, root_name: &str) -> StructureNode {
    walk(root, "", root_name.to_string())
}

fn walk(dir: &Path, rel: &str, name: String) -> StructureNode {
    let mut entries = Vec::new();
    match std::fs::read_dir(dir) {
        Ok(read) => {
            for entry in read {
                match entry {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                    }
                }
            }
        }
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Cannot list directory"),
    }
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut children = Vec::new();
    for entry in entries {
        let child_name = entry.file_name().to_string_lossy().into_owned();
        if child_name.starts_with('.') || SKIPPED_ENTRIES.contains(&child_name.as_str()) {
            continue;
        }

        let child_rel = if rel.is_empty() {
            child_name.clone()
        } else {
            format!("{rel}/{child_name}")
        };

        if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            children.push(walk(&entry.path(), &child_rel, child_name));
        } else {
            let extension = Path::new(&child_name)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .filter(|ext| !ext.is_empty());
            children.push(StructureNode::File {
                name: child_name,
                path: child_rel,
                extension,
            });
        }
    }

    StructureNode::Directory { name, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    #[rstest]
    #[case::structure(
        "project://project1/structure",
        ProjectResource::Structure { project_id: "project1".into() }
    )]
    #[case::dependencies(
        "project://project2/dependencies",
        ProjectResource::Dependencies { project_id: "project2".into() }
    )]
    #[case::nested_file(
        "project://project1/file/src/utils/format.js/dependencies",
        ProjectResource::FileDependencies {
            project_id: "project1".into(),
            file_path: "src/utils/format.js".into(),
        }
    )]
    #[case::encoded_file(
        "project://project1/file/src%2Fmy%20file.js/dependencies",
        ProjectResource::FileDependencies {
            project_id: "project1".into(),
            file_path: "src/my file.js".into(),
        }
    )]
    #[case::component(
        "project://project1/component/Button/dependencies",
        ProjectResource::ComponentDependencies {
            project_id: "project1".into(),
            component_name: "Button".into(),
        }
    )]
    fn test_parse_resource_uri(#[case] uri: &str, #[case] expected: ProjectResource) {
        let parsed = ProjectResource::parse(uri).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.project_id(), expected.project_id());
    }

    #[rstest]
    #[case::other_scheme("file:///tmp/a.js")]
    #[case::no_type("project://project1")]
    #[case::empty_id("project:///structure")]
    #[case::unknown_type("project://project1/history")]
    #[case::trailing_segment("project://project1/structure/extra")]
    #[case::file_without_path("project://project1/file/dependencies")]
    #[case::file_without_suffix("project://project1/file/src/a.js")]
    #[case::component_with_slash("project://project1/component/a/b/dependencies")]
    #[case::bad_utf8("project://project1/file/%FF/dependencies")]
    fn test_parse_rejects_malformed_uri(#[case] uri: &str) {
        assert!(matches!(
            ProjectResource::parse(uri),
            Err(Error::InvalidResourceUri(reported)) if reported == uri
        ));
    }

    #[test]
    fn test_templates_cover_all_shapes() {
        let templates: Vec<String> = resource_templates()
            .into_iter()
            .map(|t| t.raw.uri_template)
            .collect();
        assert_eq!(templates.len(), 4);
        assert!(templates.iter().all(|t| t.starts_with(RESOURCE_SCHEME)));
    }

    #[test]
    fn test_structure_skips_hidden_and_build_output() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for sub in ["src/components", "node_modules/react", "dist", "build", ".git"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        for file in [
            "package.json",
            "Makefile",
            ".env",
            "src/index.ts",
            "src/components/Button.jsx",
            "node_modules/react/index.js",
        ] {
            std::fs::write(root.join(file), "").unwrap();
        }

        let tree = project_structure(root, "project1");
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "type": "directory",
                "name": "project1",
                "children": [
                    {"type": "file", "name": "Makefile", "path": "Makefile", "extension": null},
                    {"type": "file", "name": "package.json", "path": "package.json", "extension": "json"},
                    {
                        "type": "directory",
                        "name": "src",
                        "children": [
                            {
                                "type": "directory",
                                "name": "components",
                                "children": [
                                    {
                                        "type": "file",
                                        "name": "Button.jsx",
                                        "path": "src/components/Button.jsx",
                                        "extension": "jsx"
                                    }
                                ]
                            },
                            {"type": "file", "name": "index.ts", "path": "src/index.ts", "extension": "ts"}
                        ]
                    }
                ]
            })
        );
    }

    #[test]
    fn test_structure_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let tree = project_structure(&dir.path().join("gone"), "project1");
        assert_eq!(
            tree,
            StructureNode::Directory {
                name: "project1".into(),
                children: vec![]
            }
        );
    }
}
