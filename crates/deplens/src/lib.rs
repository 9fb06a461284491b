//! Deplens - dependency graph analysis for JavaScript/TypeScript projects.
//!
//! This crate provides the analysis core behind the deplens MCP server:
//!
//! - [`graph`] - the file import graph produced by an external scanner,
//!   plus pure queries over it (orphaned files, reverse dependencies,
//!   circular dependency detection, D3 export, report payloads)
//! - [`operations`] - a registry of long-running, cancellable,
//!   progress-reporting background tasks
//! - [`config`] - YAML configuration with environment overrides
//!
//! The import scanner itself is an external program; deplens consumes the
//! `dependency-graph.json` it writes.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod graph;
pub mod operations;

pub use error::{Error, Result};
