//! Graph serialization: Graphviz dot, GraphML and JSON.
//!
//! Every writer works from the sorted [`GraphSnapshot`], so output is stable
//! across runs and thread counts.

use std::collections::HashMap;
use std::io::{self, Write};

use clap::ValueEnum;
use gardener_core::graph::{EdgeSnapshot, GraphSnapshot, IncludeGraph};
use serde::Serialize;

/// Maximum number of occurrences written per edge.
pub const MAX_EDGE_SAMPLES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Graphviz dot
    Dot,
    /// GraphML XML
    #[value(alias = "xml")]
    Graphml,
    /// Pretty-printed JSON
    Json,
}

/// Write `graph` in the requested format.
pub fn write_graph<W: Write>(
    graph: &IncludeGraph,
    format: OutputFormat,
    out: &mut W,
) -> io::Result<()> {
    let snapshot = graph.snapshot();
    match format {
        OutputFormat::Dot => write_dot(&snapshot, out),
        OutputFormat::Graphml => write_graphml(&snapshot, out),
        OutputFormat::Json => write_json(&snapshot, out),
    }
}

fn node_ids(snapshot: &GraphSnapshot) -> HashMap<&str, usize> {
    snapshot
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.key.as_str(), i))
        .collect()
}

fn edge_endpoints(ids: &HashMap<&str, usize>, edge: &EdgeSnapshot) -> Option<(usize, usize)> {
    Some((*ids.get(edge.source.as_str())?, *ids.get(edge.target.as_str())?))
}

fn sample_lines(edge: &EdgeSnapshot) -> String {
    edge.occurrences
        .iter()
        .take(MAX_EDGE_SAMPLES)
        .map(|o| o.line.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Graphviz
// ============================================================================

fn dot_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render with `dot -Tsvg graph.dot > graph.svg`.
pub fn write_dot<W: Write>(snapshot: &GraphSnapshot, out: &mut W) -> io::Result<()> {
    let ids = node_ids(snapshot);

    writeln!(out, "digraph G {{")?;
    for (i, node) in snapshot.nodes.iter().enumerate() {
        if node.resolved {
            writeln!(out, "  {} [label=\"{}\"];", i, dot_escape(&node.key))?;
        } else {
            writeln!(out, "  {} [label=\"{}\", style=dashed];", i, dot_escape(&node.key))?;
        }
    }
    for edge in &snapshot.edges {
        let Some((source, target)) = edge_endpoints(&ids, edge) else {
            continue;
        };
        if edge.multiplicity > 1 {
            writeln!(out, "  {} -> {} [label=\"{}\"];", source, target, edge.multiplicity)?;
        } else {
            writeln!(out, "  {} -> {};", source, target)?;
        }
    }
    writeln!(out, "}}")
}

// ============================================================================
// GraphML
// ============================================================================

const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn write_graphml<W: Write>(snapshot: &GraphSnapshot, out: &mut W) -> io::Result<()> {
    let ids = node_ids(snapshot);

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    write!(out, r#"<graphml xmlns="{}" xmlns:xsi="{}""#, GRAPHML_NS, XSI_NS)?;
    writeln!(out, r#" xsi:schemaLocation="{0} {0}/1.0/graphml.xsd">"#, GRAPHML_NS)?;
    writeln!(out, r#"  <key id="d0" for="node" attr.name="label" attr.type="string"/>"#)?;
    writeln!(out, r#"  <key id="d1" for="node" attr.name="resolved" attr.type="boolean"/>"#)?;
    writeln!(out, r#"  <key id="d2" for="node" attr.name="language" attr.type="string"/>"#)?;
    writeln!(out, r#"  <key id="d3" for="edge" attr.name="multiplicity" attr.type="int"/>"#)?;
    writeln!(out, r#"  <key id="d4" for="edge" attr.name="lines" attr.type="string"/>"#)?;
    writeln!(out, r#"  <graph id="G" edgedefault="directed">"#)?;

    for (i, node) in snapshot.nodes.iter().enumerate() {
        writeln!(out, r#"    <node id="n{}">"#, i)?;
        writeln!(out, r#"      <data key="d0">{}</data>"#, xml_escape(&node.key))?;
        writeln!(out, r#"      <data key="d1">{}</data>"#, node.resolved)?;
        if let Some(language) = &node.language {
            writeln!(out, r#"      <data key="d2">{}</data>"#, xml_escape(language))?;
        }
        writeln!(out, "    </node>")?;
    }

    for (i, edge) in snapshot.edges.iter().enumerate() {
        let Some((source, target)) = edge_endpoints(&ids, edge) else {
            continue;
        };
        writeln!(
            out,
            r#"    <edge id="e{}" source="n{}" target="n{}">"#,
            i, source, target
        )?;
        writeln!(out, r#"      <data key="d3">{}</data>"#, edge.multiplicity)?;
        writeln!(out, r#"      <data key="d4">{}</data>"#, sample_lines(edge))?;
        writeln!(out, "    </edge>")?;
    }

    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Serialize)]
struct JsonGraph<'a> {
    nodes: &'a [gardener_core::graph::FileNode],
    edges: Vec<JsonEdge<'a>>,
}

#[derive(Serialize)]
struct JsonEdge<'a> {
    source: &'a str,
    target: &'a str,
    multiplicity: usize,
    samples: &'a [gardener_core::graph::Occurrence],
}

pub fn write_json<W: Write>(snapshot: &GraphSnapshot, out: &mut W) -> io::Result<()> {
    let graph = JsonGraph {
        nodes: &snapshot.nodes,
        edges: snapshot
            .edges
            .iter()
            .map(|e| JsonEdge {
                source: &e.source,
                target: &e.target,
                multiplicity: e.multiplicity,
                samples: &e.occurrences[..e.occurrences.len().min(MAX_EDGE_SAMPLES)],
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &graph)?;
    writeln!(out)
}
