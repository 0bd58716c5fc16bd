//! Dependency Graph
//!
//! [`DependencyGraph`] is the thread-safe accumulator workers write into while
//! a scan runs. All mutation goes through one `parking_lot::Mutex`, and the
//! composite [`DependencyGraph::record_include`] performs node lookup/creation,
//! edge lookup/creation, the multiplicity increment and the occurrence append
//! under a single lock acquisition.
//!
//! Once every worker has joined, [`DependencyGraph::freeze`] hands out an
//! [`IncludeGraph`], which is read-only and iterated without locking.
//!
//! Both are backed by a petgraph `StableGraph`, so node handles stay valid for
//! the lifetime of the graph.

use std::collections::HashMap;

use parking_lot::Mutex;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::Serialize;

// ============================================================================
// Node and Edge Types
// ============================================================================

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A file found on disk, scanned or referenced under the given language
    Resolved { language: String },
    /// A reference that could not be located; keyed by its literal text
    Unresolved,
}

impl NodeKind {
    pub fn resolved(language: impl Into<String>) -> Self {
        NodeKind::Resolved {
            language: language.into(),
        }
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FileNode {
    /// Canonical absolute path, or the literal reference for unresolved nodes
    pub key: String,
    /// Language tag (absent for unresolved placeholders)
    pub language: Option<String>,
    /// Whether the node names a file on disk
    pub resolved: bool,
}

impl FileNode {
    fn new(key: &str, kind: NodeKind) -> Self {
        match kind {
            NodeKind::Resolved { language } => Self {
                key: key.to_string(),
                language: Some(language),
                resolved: true,
            },
            NodeKind::Unresolved => Self {
                key: key.to_string(),
                language: None,
                resolved: false,
            },
        }
    }
}

/// One detection of a directive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Occurrence {
    /// Raw statement text as matched
    pub statement: String,
    /// 1-based line number
    pub line: usize,
}

/// Edge weight: how often a source refers to a target, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeEdge {
    pub multiplicity: usize,
    pub occurrences: Vec<Occurrence>,
}

/// Opaque handle to a node of one [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(NodeIndex);

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug, Default)]
struct GraphState {
    graph: StableGraph<FileNode, IncludeEdge, petgraph::Directed>,
    /// O(1) key → NodeIndex lookup
    node_index: HashMap<String, NodeIndex>,
    /// O(1) (source, target) → EdgeIndex lookup
    edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
}

impl GraphState {
    /// Get or create a node by key.
    ///
    /// An unresolved node is upgraded in place when the same key later arrives
    /// resolved. Otherwise the first creation wins.
    fn ensure_node(&mut self, key: &str, kind: NodeKind) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(key) {
            if let NodeKind::Resolved { language } = kind {
                if let Some(node) = self.graph.node_weight_mut(idx) {
                    if !node.resolved {
                        node.language = Some(language);
                        node.resolved = true;
                    }
                }
            }
            return idx;
        }
        let idx = self.graph.add_node(FileNode::new(key, kind));
        self.node_index.insert(key.to_string(), idx);
        idx
    }

    /// Get or create the edge and record one occurrence. Returns the new multiplicity.
    fn bump_edge(&mut self, source: NodeIndex, target: NodeIndex, occurrence: Occurrence) -> usize {
        let edge_idx = match self.edge_index.get(&(source, target)) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_edge(source, target, IncludeEdge::default());
                self.edge_index.insert((source, target), idx);
                idx
            }
        };

        match self.graph.edge_weight_mut(edge_idx) {
            Some(edge) => {
                edge.multiplicity += 1;
                edge.occurrences.push(occurrence);
                edge.multiplicity
            }
            None => 0,
        }
    }
}

// ============================================================================
// DependencyGraph
// ============================================================================

/// Thread-safe, growth-only accumulator of file nodes and include edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    state: Mutex<GraphState>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node for `key`.
    ///
    /// Idempotent: the same key always yields the same handle, whichever
    /// thread asks first.
    pub fn get_or_create_node(&self, key: &str, kind: NodeKind) -> NodeHandle {
        NodeHandle(self.state.lock().ensure_node(key, kind))
    }

    /// Record one occurrence of `source` including `target`.
    ///
    /// Creates the edge with multiplicity 1 if absent, otherwise increments it.
    /// Returns the resulting multiplicity, or 0 if either handle does not
    /// belong to this graph.
    pub fn add_edge(
        &self,
        source: NodeHandle,
        target: NodeHandle,
        statement: &str,
        line: usize,
    ) -> usize {
        let mut state = self.state.lock();
        if !state.graph.contains_node(source.0) || !state.graph.contains_node(target.0) {
            return 0;
        }
        state.bump_edge(
            source.0,
            target.0,
            Occurrence {
                statement: statement.to_string(),
                line,
            },
        )
    }

    /// Find-or-create both nodes, then find-or-create the edge, increment it
    /// and append the occurrence, all as one indivisible step.
    pub fn record_include(
        &self,
        source_key: &str,
        source_kind: NodeKind,
        target_key: &str,
        target_kind: NodeKind,
        statement: &str,
        line: usize,
    ) -> usize {
        let mut state = self.state.lock();
        let source = state.ensure_node(source_key, source_kind);
        let target = state.ensure_node(target_key, target_kind);
        state.bump_edge(
            source,
            target,
            Occurrence {
                statement: statement.to_string(),
                line,
            },
        )
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().graph.edge_count()
    }

    /// Stop accepting writes and hand out the read-only graph.
    pub fn freeze(self) -> IncludeGraph {
        IncludeGraph {
            state: self.state.into_inner(),
        }
    }

    /// Move the accumulated content out, leaving this graph empty.
    ///
    /// For callers that cannot reclaim sole ownership to [`freeze`](Self::freeze).
    pub fn take(&self) -> IncludeGraph {
        IncludeGraph {
            state: std::mem::take(&mut *self.state.lock()),
        }
    }
}

// ============================================================================
// IncludeGraph (read-only)
// ============================================================================

/// A finished dependency graph.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    state: GraphState,
}

/// Borrowed view of one edge with its endpoints.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: &'a FileNode,
    pub target: &'a FileNode,
    pub edge: &'a IncludeEdge,
}

impl<'a> EdgeView<'a> {
    pub fn multiplicity(&self) -> usize {
        self.edge.multiplicity
    }

    pub fn occurrences(&self) -> &'a [Occurrence] {
        &self.edge.occurrences
    }

    /// At most `limit` occurrences, lowest line first.
    pub fn samples(&self, limit: usize) -> Vec<&'a Occurrence> {
        let mut all: Vec<&Occurrence> = self.edge.occurrences.iter().collect();
        all.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.statement.cmp(&b.statement)));
        all.truncate(limit);
        all
    }

    pub fn is_self_loop(&self) -> bool {
        self.source.key == self.target.key
    }
}

impl IncludeGraph {
    pub fn node_count(&self) -> usize {
        self.state.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.graph.edge_count()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.state
            .graph
            .node_indices()
            .filter_map(|idx| self.state.graph.node_weight(idx))
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.state
            .graph
            .edge_references()
            .filter_map(|e| self.view(e.source(), e.target(), e.weight()))
    }

    /// Get a node by key.
    pub fn node(&self, key: &str) -> Option<&FileNode> {
        self.state
            .node_index
            .get(key)
            .and_then(|&idx| self.state.graph.node_weight(idx))
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.state.node_index.contains_key(key)
    }

    /// Get the edge between two keys.
    pub fn edge(&self, source_key: &str, target_key: &str) -> Option<EdgeView<'_>> {
        let source = *self.state.node_index.get(source_key)?;
        let target = *self.state.node_index.get(target_key)?;
        let edge_idx = *self.state.edge_index.get(&(source, target))?;
        let weight = self.state.graph.edge_weight(edge_idx)?;
        self.view(source, target, weight)
    }

    /// Edges pointing at `key`.
    pub fn incoming_edges(&self, key: &str) -> Vec<EdgeView<'_>> {
        self.directed_edges(key, Direction::Incoming)
    }

    /// Edges leaving `key`.
    pub fn outgoing_edges(&self, key: &str) -> Vec<EdgeView<'_>> {
        self.directed_edges(key, Direction::Outgoing)
    }

    /// Placeholder nodes for references that could not be located.
    pub fn unresolved_nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes().filter(|n| !n.resolved)
    }

    /// Order-independent copy of the graph content.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<FileNode> = self.nodes().cloned().collect();
        nodes.sort();

        let mut edges: Vec<EdgeSnapshot> = self
            .edges()
            .map(|e| {
                let mut occurrences = e.edge.occurrences.clone();
                occurrences.sort_by(|a, b| {
                    a.line.cmp(&b.line).then_with(|| a.statement.cmp(&b.statement))
                });
                EdgeSnapshot {
                    source: e.source.key.clone(),
                    target: e.target.key.clone(),
                    multiplicity: e.edge.multiplicity,
                    occurrences,
                }
            })
            .collect();
        edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));

        GraphSnapshot { nodes, edges }
    }

    fn directed_edges(&self, key: &str, direction: Direction) -> Vec<EdgeView<'_>> {
        let Some(&idx) = self.state.node_index.get(key) else {
            return Vec::new();
        };
        self.state
            .graph
            .edges_directed(idx, direction)
            .filter_map(|e| self.view(e.source(), e.target(), e.weight()))
            .collect()
    }

    fn view<'a>(
        &'a self,
        source: NodeIndex,
        target: NodeIndex,
        edge: &'a IncludeEdge,
    ) -> Option<EdgeView<'a>> {
        Some(EdgeView {
            source: self.state.graph.node_weight(source)?,
            target: self.state.graph.node_weight(target)?,
            edge,
        })
    }
}

/// Sorted, owned graph content. Two runs over the same tree produce equal snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<FileNode>,
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSnapshot {
    pub source: String,
    pub target: String,
    pub multiplicity: usize,
    pub occurrences: Vec<Occurrence>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_or_create_node_is_idempotent() {
        let graph = DependencyGraph::new();
        let a = graph.get_or_create_node("/src/a.c", NodeKind::resolved("c"));
        let b = graph.get_or_create_node("/src/a.c", NodeKind::resolved("c"));
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_unresolved_node_upgraded_by_resolved_creation() {
        let graph = DependencyGraph::new();
        let first = graph.get_or_create_node("/inc/x.h", NodeKind::Unresolved);
        let second = graph.get_or_create_node("/inc/x.h", NodeKind::resolved("c"));
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);

        let frozen = graph.freeze();
        let node = frozen.node("/inc/x.h").unwrap();
        assert!(node.resolved);
        assert_eq!(node.language.as_deref(), Some("c"));
    }

    #[test]
    fn test_resolved_node_is_never_downgraded() {
        let graph = DependencyGraph::new();
        graph.get_or_create_node("/inc/x.h", NodeKind::resolved("c"));
        graph.get_or_create_node("/inc/x.h", NodeKind::Unresolved);
        graph.get_or_create_node("/inc/x.h", NodeKind::resolved("python"));

        let frozen = graph.freeze();
        let node = frozen.node("/inc/x.h").unwrap();
        assert!(node.resolved);
        assert_eq!(node.language.as_deref(), Some("c"));
    }

    #[test]
    fn test_upgrade_is_order_independent() {
        let build = |unresolved_first: bool| {
            let graph = DependencyGraph::new();
            let c = || NodeKind::resolved("c");
            let include = |graph: &DependencyGraph| {
                let stmt = "#include </z.h>";
                graph.record_include("/a.c", c(), "/z.h", NodeKind::Unresolved, stmt, 1);
            };
            if unresolved_first {
                include(&graph);
                graph.get_or_create_node("/z.h", c());
            } else {
                graph.get_or_create_node("/z.h", c());
                include(&graph);
            }
            graph.freeze().snapshot()
        };

        assert_eq!(build(true), build(false));
    }

    #[test]
    fn test_add_edge_increments_multiplicity() {
        let graph = DependencyGraph::new();
        let a = graph.get_or_create_node("/a.c", NodeKind::resolved("c"));
        let b = graph.get_or_create_node("/b.h", NodeKind::resolved("c"));

        assert_eq!(graph.add_edge(a, b, "#include \"b.h\"", 1), 1);
        assert_eq!(graph.add_edge(a, b, "#include \"b.h\"", 7), 2);
        assert_eq!(graph.edge_count(), 1);

        let frozen = graph.freeze();
        let edge = frozen.edge("/a.c", "/b.h").unwrap();
        assert_eq!(edge.multiplicity(), 2);
        let lines: Vec<usize> = edge.occurrences().iter().map(|o| o.line).collect();
        assert_eq!(lines, vec![1, 7]);
    }

    #[test]
    fn test_add_edge_with_foreign_handle() {
        let other = DependencyGraph::new();
        other.get_or_create_node("a", NodeKind::Unresolved);
        let foreign = other.get_or_create_node("b", NodeKind::Unresolved);

        let graph = DependencyGraph::new();
        let a = graph.get_or_create_node("a", NodeKind::Unresolved);
        assert_eq!(graph.add_edge(a, foreign, "x", 1), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_self_loop() {
        let graph = DependencyGraph::new();
        let m = graph.record_include(
            "/a.h",
            NodeKind::resolved("c"),
            "/a.h",
            NodeKind::resolved("c"),
            "#include \"a.h\"",
            3,
        );
        assert_eq!(m, 1);

        let frozen = graph.freeze();
        assert_eq!(frozen.node_count(), 1);
        let edge = frozen.edge("/a.h", "/a.h").unwrap();
        assert!(edge.is_self_loop());
        assert_eq!(edge.multiplicity(), 1);
    }

    #[test]
    fn test_incoming_and_outgoing() {
        let graph = DependencyGraph::new();
        for src in ["/a.c", "/b.c"] {
            graph.record_include(
                src,
                NodeKind::resolved("c"),
                "missing.h",
                NodeKind::Unresolved,
                "#include \"missing.h\"",
                1,
            );
        }
        let frozen = graph.freeze();

        assert_eq!(frozen.incoming_edges("missing.h").len(), 2);
        assert_eq!(frozen.outgoing_edges("/a.c").len(), 1);
        assert!(frozen.incoming_edges("nope").is_empty());
        assert_eq!(frozen.unresolved_nodes().count(), 1);
    }

    #[test]
    fn test_samples_are_bounded_and_sorted() {
        let graph = DependencyGraph::new();
        for line in [9, 2, 5] {
            graph.record_include(
                "/a.c",
                NodeKind::resolved("c"),
                "/b.h",
                NodeKind::resolved("c"),
                "#include \"b.h\"",
                line,
            );
        }
        let frozen = graph.freeze();
        let edge = frozen.edge("/a.c", "/b.h").unwrap();
        let samples: Vec<usize> = edge.samples(2).iter().map(|o| o.line).collect();
        assert_eq!(samples, vec![2, 5]);
    }

    #[test]
    fn test_concurrent_record_include() {
        let graph = Arc::new(DependencyGraph::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let graph = Arc::clone(&graph);
                thread::spawn(move || {
                    let source = format!("/src/file{}.c", t);
                    for line in 0..100 {
                        graph.record_include(
                            &source,
                            NodeKind::resolved("c"),
                            "common.h",
                            NodeKind::Unresolved,
                            "#include \"common.h\"",
                            line,
                        );
                        graph.record_include(
                            "/shared.c",
                            NodeKind::resolved("c"),
                            "common.h",
                            NodeKind::Unresolved,
                            "#include \"common.h\"",
                            line,
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let graph = Arc::try_unwrap(graph).unwrap().freeze();
        // 8 sources + shared.c + common.h
        assert_eq!(graph.node_count(), 10);
        assert_eq!(graph.edge_count(), 9);
        assert_eq!(graph.edge("/shared.c", "common.h").unwrap().multiplicity(), 800);
        assert_eq!(graph.edge("/src/file3.c", "common.h").unwrap().multiplicity(), 100);
    }

    #[test]
    fn test_snapshot_is_order_independent() {
        fn build(order: &[(&str, usize)]) -> GraphSnapshot {
            let graph = DependencyGraph::new();
            for (src, line) in order {
                graph.record_include(
                    src,
                    NodeKind::resolved("c"),
                    "x.h",
                    NodeKind::Unresolved,
                    "#include <x.h>",
                    *line,
                );
            }
            graph.freeze().snapshot()
        }

        let a = build(&[("/a.c", 1), ("/b.c", 2), ("/a.c", 3)]);
        let b = build(&[("/b.c", 2), ("/a.c", 3), ("/a.c", 1)]);
        assert_eq!(a, b);
        assert_eq!(a.nodes.len(), 3);
        assert_eq!(a.edges[0].source, "/a.c");
        assert_eq!(a.edges[0].multiplicity, 2);
    }

    #[test]
    fn test_take_leaves_graph_empty() {
        let graph = DependencyGraph::new();
        graph.record_include(
            "/a.c",
            NodeKind::resolved("c"),
            "b.h",
            NodeKind::Unresolved,
            "#include \"b.h\"",
            1,
        );

        let taken = graph.take();
        assert_eq!(taken.node_count(), 2);
        assert_eq!(graph.node_count(), 0);
        assert!(taken.contains_node("b.h"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let graph = DependencyGraph::new();
        graph.record_include(
            "/a.c",
            NodeKind::resolved("c"),
            "b.h",
            NodeKind::Unresolved,
            "#include \"b.h\"",
            7,
        );

        let value = serde_json::to_value(graph.freeze().snapshot()).unwrap();
        assert_eq!(value["nodes"][0]["key"], "/a.c");
        assert_eq!(value["nodes"][1]["resolved"], false);
        assert_eq!(value["edges"][0]["occurrences"][0]["line"], 7);
    }
}
