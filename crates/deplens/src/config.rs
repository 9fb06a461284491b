//! Configuration for deplens.
//!
//! Configuration is YAML:
//!
//! ```yaml
//! data_dir: ./deplens-data
//! scanner:
//!   program: node
//!   script: scripts/dependency-workflow.cjs
//!   extra_args: []
//!   graph_file: dependency-graph.json
//! operations:
//!   sweep_interval_secs: 300
//!   retention_secs: 3600
//!   poll_interval_ms: 500
//! log_level: info
//! ```
//!
//! Every field is optional. The file is found at an explicit path, else at
//! `$DEPLENS_CONFIG`, else defaults are used. The `DEPLENS_DATA_DIR`,
//! `DEPLENS_SCANNER_PROGRAM`, `DEPLENS_SCANNER_SCRIPT` and
//! `DEPLENS_LOG_LEVEL` environment variables override the loaded values.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "DEPLENS_CONFIG";

/// Top-level deplens configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeplensConfig {
    /// Root directory for per-project analysis output.
    pub data_dir: PathBuf,

    /// External dependency scanner invocation.
    pub scanner: ScannerConfig,

    /// Operation manager timings.
    pub operations: OperationsConfig,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

/// How the external scanner is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Executable to run.
    pub program: String,

    /// Script passed as the first argument.
    pub script: String,

    /// Extra arguments appended after the generated ones.
    pub extra_args: Vec<String>,

    /// Name of the graph file the scanner produces.
    pub graph_file: String,
}

/// Operation registry timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OperationsConfig {
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,

    /// Seconds a terminal operation is retained.
    pub retention_secs: u64,

    /// Milliseconds between status polls when streaming.
    pub poll_interval_ms: u64,
}

impl Default for DeplensConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./deplens-data"),
            scanner: ScannerConfig::default(),
            operations: OperationsConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            script: "scripts/dependency-workflow.cjs".to_string(),
            extra_args: Vec::new(),
            graph_file: "dependency-graph.json".to_string(),
        }
    }
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            retention_secs: 3600,
            poll_interval_ms: 500,
        }
    }
}

impl OperationsConfig {
    /// Interval between eviction sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// How long terminal operations are kept.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Interval between status polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl DeplensConfig {
    /// Parse configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the YAML is invalid or a value is out
    /// of range.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Resolve configuration for a process.
    ///
    /// Uses `explicit` if given, else `$DEPLENS_CONFIG`, else defaults, and
    /// applies environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a named config file cannot be loaded or the
    /// final configuration is invalid.
    pub async fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load(&path).await?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `DEPLENS_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(dir) = lookup("DEPLENS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(program) = lookup("DEPLENS_SCANNER_PROGRAM") {
            self.scanner.program = program;
        }
        if let Some(script) = lookup("DEPLENS_SCANNER_SCRIPT") {
            self.scanner.script = script;
        }
        if let Some(level) = lookup("DEPLENS_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero intervals or an empty scanner
    /// program or graph file name.
    pub fn validate(&self) -> Result<()> {
        let ops = &self.operations;
        if ops.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "operations.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if ops.poll_interval_ms == 0 {
            return Err(Error::Config(
                "operations.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.scanner.program.trim().is_empty() {
            return Err(Error::Config("scanner.program cannot be empty".to_string()));
        }
        if self.scanner.graph_file.trim().is_empty() {
            return Err(Error::Config("scanner.graph_file cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Serialize configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))
    }
}
