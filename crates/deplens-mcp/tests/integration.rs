//! Integration tests for the deplens MCP tools.
//!
//! These tests drive the tools end to end with a stand-in scanner: a small
//! shell script run by `sh` that copies a fixture graph into the analysis
//! directory, verifying:
//! - Project lifecycle (add -> list -> forget)
//! - Background analysis, including the project-directory fallback,
//!   scanner failures and cancellation
//! - Graph queries and persisted reports after analysis
//! - `project://` resources
//! - Error responses

use deplens::config::{DeplensConfig, OperationsConfig, ScannerConfig};
use deplens::graph::FileLookup;
use deplens::operations::{OperationManager, OperationState, OperationStatus};
use deplens_mcp::analysis::Scanner;
use deplens_mcp::context::ProjectRegistry;
use deplens_mcp::error::Error;
use deplens_mcp::tools::Tools;
use rstest::rstest;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

const FIXTURE_GRAPH: &str = r#"{
    "src/index.js": {"imports": ["src/components/Button.jsx", "src/utils/format.js"]},
    "src/components/Button.jsx": {"imports": ["src/utils/format.js", "react"]},
    "src/utils/format.js": {"imports": ["src/utils/locale.js"]},
    "src/utils/locale.js": {"imports": ["src/utils/format.js"]},
    "lib/Button.js": {"imports": []},
    "scripts/unused.js": {}
}"#;

mod helpers {
    use super::*;

    pub struct Fixture {
        pub tools: Tools,
        pub data: TempDir,
        pub project_dir: TempDir,
        _scripts: TempDir,
    }

    /// Build tools whose scanner runs `sh <script_body>`.
    pub fn fixture(script_body: &str) -> Fixture {
        let data = TempDir::new().expect("Failed to create data dir");
        let project_dir = TempDir::new().expect("Failed to create project dir");
        let scripts = TempDir::new().expect("Failed to create scripts dir");

        let script = scripts.path().join("scan.sh");
        std::fs::write(&script, script_body).expect("Failed to write scanner script");

        let config = DeplensConfig {
            data_dir: data.path().to_path_buf(),
            scanner: ScannerConfig {
                program: "sh".to_string(),
                script: script.display().to_string(),
                ..ScannerConfig::default()
            },
            operations: OperationsConfig {
                poll_interval_ms: 20,
                ..OperationsConfig::default()
            },
            ..DeplensConfig::default()
        };

        let projects = Arc::new(RwLock::new(ProjectRegistry::new(&config.data_dir)));
        let operations = OperationManager::from_config(&config.operations).unwrap();
        let scanner = Scanner::new(config.scanner.clone(), config.operations.poll_interval());
        let tools = Tools::new(
            projects,
            operations,
            scanner,
            config.operations.poll_interval(),
        );

        Fixture {
            tools,
            data,
            project_dir,
            _scripts: scripts,
        }
    }

    /// Scanner that copies `graph-fixture.json` from the project root.
    pub const COPY_SCANNER: &str =
        "echo \"scanning $2\"\ncp \"$2/graph-fixture.json\" \"$4/dependency-graph.json\"\n";

    pub fn write_fixture_graph(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), FIXTURE_GRAPH).expect("Failed to write fixture graph");
    }

    pub async fn add_project(fixture: &Fixture) -> String {
        fixture
            .tools
            .add_project("web", &fixture.project_dir.path().display().to_string())
            .await
            .expect("add_project should succeed")
            .id
    }

    /// Read a resource and parse its JSON text.
    pub async fn read_json(fixture: &Fixture, uri: &str) -> serde_json::Value {
        let text = fixture
            .tools
            .read_resource(uri)
            .await
            .expect("read_resource should succeed");
        serde_json::from_str(&text).expect("resource text should be JSON")
    }

    /// Run a full analysis and return its final status.
    pub async fn analyze(fixture: &Fixture, project_id: &str) -> OperationStatus {
        let started = fixture
            .tools
            .analyze_dependencies(project_id, None)
            .await
            .expect("analyze_dependencies should start");

        let watched = fixture
            .tools
            .watch_operation(&started.operation_id, Some(20))
            .await
            .expect("watch_operation should succeed");
        assert!(!watched.timed_out, "analysis did not finish in time");

        watched
            .updates
            .last()
            .expect("at least one update")
            .data
            .clone()
    }
}

use helpers::*;

#[tokio::test]
async fn test_project_lifecycle() {
    let fixture = fixture(COPY_SCANNER);
    let id = add_project(&fixture).await;
    assert_eq!(id, "project1");

    let projects = fixture.tools.list_projects().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "web");
    assert!(fixture.data.path().join("project1").is_dir());

    let removed = fixture.tools.forget_project(&id).await.unwrap();
    assert_eq!(removed.project.id, "project1");
    assert!(fixture.tools.list_projects().await.is_empty());
    assert!(!fixture.data.path().join("project1").exists());
}

#[tokio::test]
async fn test_queries_before_analysis_report_no_analysis() {
    let fixture = fixture(COPY_SCANNER);
    let id = add_project(&fixture).await;

    let result = fixture.tools.find_orphaned_files(&id, None).await;
    assert!(matches!(result, Err(Error::NoAnalysis { .. })));

    let result = fixture.tools.get_dependency_graph(&id, None).await;
    assert!(matches!(result, Err(Error::NoAnalysis { .. })));
}

#[tokio::test]
async fn test_unknown_project() {
    let fixture = fixture(COPY_SCANNER);

    let result = fixture.tools.analyze_dependencies("project42", None).await;
    assert!(matches!(result, Err(Error::ProjectNotFound(_))));

    let result = fixture.tools.check_circular_dependencies("project42", None).await;
    assert!(matches!(result, Err(Error::ProjectNotFound(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_analysis_then_queries() {
    let fixture = fixture(COPY_SCANNER);
    write_fixture_graph(fixture.project_dir.path(), "graph-fixture.json");
    let id = add_project(&fixture).await;

    let status = analyze(&fixture, &id).await;
    assert_eq!(status.status, OperationState::Completed, "{status:?}");

    let result = status.result.unwrap();
    assert_eq!(result["project_id"], "project1");
    assert_eq!(result["summary"]["files"], 6);
    assert_eq!(result["summary"]["cycles"], 1);
    assert_eq!(result["summary"]["external_imports"], 1);
    assert!(
        status
            .messages
            .iter()
            .any(|m| m.message.starts_with("scanning "))
    );

    let analysis_dir = fixture.data.path().join("project1");
    assert!(analysis_dir.join("orphaned_files.json").exists());
    assert!(analysis_dir.join("circular_dependencies.json").exists());

    // Orphans
    let orphans = fixture.tools.find_orphaned_files(&id, None).await.unwrap();
    assert_eq!(
        orphans.orphaned_files,
        vec!["lib/Button.js", "scripts/unused.js", "src/index.js"]
    );
    assert_eq!(orphans.count, 3);
    assert_eq!(orphans.total_files, 6);

    let filtered = fixture
        .tools
        .find_orphaned_files(&id, Some(vec!["scripts/*".to_string()]))
        .await
        .unwrap();
    assert_eq!(filtered.count, 2);

    // Cycles
    let cycles = fixture
        .tools
        .check_circular_dependencies(&id, None)
        .await
        .unwrap();
    assert_eq!(cycles.count, 1);
    assert_eq!(
        cycles.circular_dependencies[0].cycle,
        vec!["src/utils/format.js", "src/utils/locale.js", "src/utils/format.js"]
    );

    let none = fixture
        .tools
        .check_circular_dependencies(&id, Some("components".to_string()))
        .await
        .unwrap();
    assert_eq!(none.count, 0);
    assert_eq!(none.module_filter.as_deref(), Some("components"));

    // File and component lookups
    match fixture
        .tools
        .get_file_dependencies(&id, "/src/utils/format.js")
        .await
        .unwrap()
    {
        FileLookup::Exact(deps) => {
            assert_eq!(deps.imports, vec!["src/utils/locale.js"]);
            assert_eq!(
                deps.imported_by,
                vec![
                    "src/index.js",
                    "src/components/Button.jsx",
                    "src/utils/locale.js"
                ]
            );
        }
        other => panic!("Expected exact match, got {other:?}"),
    }

    let components = fixture
        .tools
        .get_component_dependencies(&id, "Button")
        .await
        .unwrap();
    let files: Vec<&str> = components.iter().map(|c| c.file.as_str()).collect();
    assert_eq!(files, vec!["src/components/Button.jsx", "lib/Button.js"]);

    // Graph formats
    let raw = fixture.tools.get_dependency_graph(&id, None).await.unwrap();
    assert_eq!(raw["scripts/unused.js"]["imports"], serde_json::json!([]));

    let d3 = fixture
        .tools
        .get_dependency_graph(&id, Some("d3"))
        .await
        .unwrap();
    assert_eq!(d3["nodes"].as_array().unwrap().len(), 7);
    assert_eq!(d3["links"].as_array().unwrap().len(), 6);
}

#[cfg(unix)]
#[tokio::test]
async fn test_graph_in_project_dir_is_used_as_fallback() {
    let fixture = fixture("echo done\n");
    write_fixture_graph(fixture.project_dir.path(), "dependency-graph.json");
    let id = add_project(&fixture).await;

    let status = analyze(&fixture, &id).await;
    assert_eq!(status.status, OperationState::Completed, "{status:?}");
    assert!(
        fixture
            .data
            .path()
            .join("project1/dependency-graph.json")
            .exists()
    );
    assert!(
        status
            .messages
            .iter()
            .any(|m| m.message.contains("from the project directory"))
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_scanner_failure_fails_operation() {
    let fixture = fixture("echo 'cannot parse src/index.js' >&2\nexit 3\n");
    let id = add_project(&fixture).await;

    let status = analyze(&fixture, &id).await;
    assert_eq!(status.status, OperationState::Failed);

    let error = status.error.unwrap();
    assert_eq!(error.kind, "task_failure");
    assert!(error.message.contains("cannot parse src/index.js"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_graph_fails_operation() {
    let fixture = fixture("exit 0\n");
    let id = add_project(&fixture).await;

    let status = analyze(&fixture, &id).await;
    assert_eq!(status.status, OperationState::Failed);
    assert!(
        status
            .error
            .unwrap()
            .message
            .contains("Scanner produced no dependency-graph.json")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_running_analysis() {
    let fixture = fixture("exec sleep 30\n");
    let id = add_project(&fixture).await;

    let started = fixture.tools.analyze_dependencies(&id, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancelled = fixture.tools.cancel_operation(&started.operation_id);
    assert!(cancelled.cancelled);

    let watched = fixture
        .tools
        .watch_operation(&started.operation_id, Some(5))
        .await
        .unwrap();
    assert!(!watched.timed_out);
    assert_eq!(watched.updates.len(), 1);
    assert_eq!(watched.updates[0].data.status, OperationState::Cancelled);

    // Cancelling twice is a no-op
    assert!(!fixture.tools.cancel_operation(&started.operation_id).cancelled);

    let listed = fixture.tools.list_operations().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, OperationState::Cancelled);
}

#[rstest]
#[case::unknown_format(Some("svg"))]
#[case::empty_format(Some(""))]
#[tokio::test]
async fn test_invalid_graph_format(#[case] format: Option<&str>) {
    let fixture = fixture(COPY_SCANNER);
    let id = add_project(&fixture).await;

    let result = fixture.tools.get_dependency_graph(&id, format).await;
    assert!(matches!(result, Err(Error::InvalidArgument { field: "format", .. })));
}

#[tokio::test]
async fn test_unknown_operation() {
    let fixture = fixture(COPY_SCANNER);

    assert!(matches!(
        fixture.tools.operation_status("missing"),
        Err(Error::Core(deplens::Error::OperationNotFound(_)))
    ));
    assert!(matches!(
        fixture.tools.watch_operation("missing", Some(1)).await,
        Err(Error::Core(deplens::Error::OperationNotFound(_)))
    ));
    assert!(!fixture.tools.cancel_operation("missing").cancelled);
}

#[cfg(unix)]
#[tokio::test]
async fn test_forget_project_cancels_running_analysis() {
    let fixture = fixture("exec sleep 30\n");
    let id = add_project(&fixture).await;

    let started = fixture.tools.analyze_dependencies(&id, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let removed = fixture.tools.forget_project(&id).await.unwrap();
    assert_eq!(removed.cancelled_operations, vec![started.operation_id.clone()]);
    assert!(!fixture.data.path().join("project1").exists());

    // The killed scanner must not turn the cancellation into a failure
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = fixture.tools.operation_status(&started.operation_id).unwrap();
    assert_eq!(status.status, OperationState::Cancelled);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_forget_project_without_analyses_cancels_nothing() {
    let fixture = fixture(COPY_SCANNER);
    let id = add_project(&fixture).await;

    let removed = fixture.tools.forget_project(&id).await.unwrap();
    assert!(removed.cancelled_operations.is_empty());
    assert!(matches!(
        fixture.tools.forget_project(&id).await,
        Err(Error::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn test_structure_resource() {
    let fixture = fixture(COPY_SCANNER);
    let root = fixture.project_dir.path();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("node_modules/react")).unwrap();
    std::fs::write(root.join("src/index.js"), "").unwrap();
    std::fs::write(root.join(".gitignore"), "").unwrap();
    let id = add_project(&fixture).await;

    let text = fixture
        .tools
        .read_resource(&format!("project://{id}/structure"))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["structure"]["type"], "directory");
    assert_eq!(value["structure"]["name"], "project1");
    let children = value["structure"]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["name"], "src");
    assert_eq!(children[0]["children"][0]["path"], "src/index.js");
    assert_eq!(children[0]["children"][0]["extension"], "js");
}

#[cfg(unix)]
#[tokio::test]
async fn test_dependency_resources_after_analysis() {
    let fixture = fixture(COPY_SCANNER);
    write_fixture_graph(fixture.project_dir.path(), "graph-fixture.json");
    let id = add_project(&fixture).await;

    // Nothing to read before analysis
    assert!(matches!(
        fixture
            .tools
            .read_resource(&format!("project://{id}/dependencies"))
            .await,
        Err(Error::NoAnalysis { .. })
    ));

    let status = analyze(&fixture, &id).await;
    assert_eq!(status.status, OperationState::Completed, "{status:?}");

    let graph = read_json(&fixture, &format!("project://{id}/dependencies")).await;
    assert_eq!(graph.as_object().unwrap().len(), 6);

    let file = read_json(
        &fixture,
        &format!("project://{id}/file/src%2Futils%2Fformat.js/dependencies"),
    )
    .await;
    assert_eq!(file["file"], "src/utils/format.js");
    assert_eq!(file["imports"], serde_json::json!(["src/utils/locale.js"]));

    let nested = read_json(
        &fixture,
        &format!("project://{id}/file/src/utils/format.js/dependencies"),
    )
    .await;
    assert_eq!(nested, file);

    let component =
        read_json(&fixture, &format!("project://{id}/component/Button/dependencies")).await;
    assert_eq!(component.as_array().unwrap().len(), 2);
}

#[rstest]
#[case::unknown_shape("project://project1/history")]
#[case::other_scheme("file:///etc/passwd")]
#[tokio::test]
async fn test_invalid_resource_uri(#[case] uri: &str) {
    let fixture = fixture(COPY_SCANNER);
    add_project(&fixture).await;

    assert!(matches!(
        fixture.tools.read_resource(uri).await,
        Err(Error::InvalidResourceUri(_))
    ));
}

#[tokio::test]
async fn test_resource_for_unknown_project() {
    let fixture = fixture(COPY_SCANNER);
    assert!(matches!(
        fixture.tools.read_resource("project://project7/structure").await,
        Err(Error::ProjectNotFound(_))
    ));
}
