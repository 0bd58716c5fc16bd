//! Include Gardener Core - concurrent include/import dependency scanning
//!
//! This crate provides the scanning engine:
//! - Per-language detection rules compiled from configuration data
//! - Depth-bounded, exclude-aware filesystem traversal feeding a worker pool
//! - Directive extraction and quoted/system path resolution
//! - A thread-safe dependency graph accumulator

pub mod detector;
pub mod exclude;
pub mod graph;
pub mod parser;
pub mod pool;
pub mod rules;

// Re-exports for convenience
pub use detector::{
    DetectorError, DetectorOptions, FileDetector, RecursionLimit, ScanReport, ScanStats,
};
pub use exclude::{ExcludeError, ExcludeFilter};
pub use graph::{
    DependencyGraph, EdgeSnapshot, EdgeView, FileNode, GraphSnapshot, IncludeEdge, IncludeGraph,
    NodeHandle, NodeKind, Occurrence,
};
pub use parser::{
    extract_directives, resolve_reference, Directive, IncludeParser, ParseError, Resolution,
};
pub use pool::{PoolError, WorkerPool};
pub use rules::{Config, DetectionRuleSet, DirectiveKind, RuleError, Statement};
