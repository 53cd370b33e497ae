//! Diagram adapters: one `parse` / `generate` / `clean` triple per category.
//!
//! Every adapter converts between its category's text grammar and the
//! shared [`DiagramGraph`]. The provided [`DiagramAdapter::parse`] runs the
//! same pipeline for all categories: clean → statement parse → lint → grid
//! placement. Generation is deterministic: header, ungrouped declarations,
//! groups with their nested contents, then relationships.

pub mod c4;
pub mod er;
pub mod flowchart;
pub mod sequence;
pub(crate) mod syntax;

pub use c4::C4Adapter;
pub use er::ErAdapter;
pub use flowchart::FlowchartAdapter;
pub use sequence::SequenceAdapter;

use crate::category::DiagramCategory;
use crate::clean::{extract_diagram, first_token_is};
use crate::error::ParseError;
use crate::id::NodeId;
use crate::layout::{GridConfig, place_in_grid};
use crate::lint::ensure_valid;
use crate::model::{AttrValue, DiagramGraph, EdgeStyle, Node, NodeKind};
use std::collections::HashSet;

/// Indentation unit for generated text.
pub const INDENT: &str = "    ";

/// The contract every diagram category implements.
pub trait DiagramAdapter: Send + Sync {
    fn category(&self) -> DiagramCategory;

    /// Header keywords that open a diagram of this category.
    fn keywords(&self) -> &'static [&'static str];

    /// Does this (trimmed) line open a diagram of this category?
    fn is_header(&self, line: &str) -> bool {
        first_token_is(line, self.keywords())
    }

    /// Does this (trimmed, non-empty) line look like a statement of this grammar?
    /// Used by [`clean`](Self::clean) to cut trailing prose.
    fn is_statement(&self, line: &str) -> bool;

    /// Node kinds this category can express. The first one is the default
    /// for nodes added from the canvas.
    fn supported_kinds(&self) -> &'static [NodeKind];

    /// Parse already-cleaned text (header on the first line).
    fn parse_cleaned(&self, cleaned: &str) -> Result<DiagramGraph, ParseError>;

    /// Emit text for a graph. Must be byte-deterministic.
    fn generate(&self, graph: &DiagramGraph) -> String;

    /// Suggested file extension for export.
    fn file_extension(&self) -> &'static str {
        "mmd"
    }

    fn supports_kind(&self, kind: NodeKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    /// Non-default line styles the grammar can express.
    fn supported_edge_styles(&self) -> &'static [EdgeStyle] {
        &[]
    }

    /// Can a grouping node sit inside another grouping node?
    fn allows_nested_groups(&self) -> bool {
        true
    }

    /// Can a node of `kind` be the source or target of an edge?
    fn can_connect(&self, _kind: NodeKind) -> bool {
        true
    }

    /// Attribute keys the grammar can write on a node of `kind`.
    fn supported_attributes(&self, _kind: NodeKind) -> &'static [&'static str] {
        &[]
    }

    /// Check that every attribute of `node` is written by [`generate`](Self::generate)
    /// and read back unchanged by [`parse`](Self::parse).
    fn check_attributes(&self, node: &Node) -> Result<(), String> {
        for (key, value) in node.attributes.iter() {
            supported_key(self, node, key)?;
            plain_text(key, value)?;
        }
        Ok(())
    }

    /// Id for a node added from the canvas.
    fn fresh_id(&self, graph: &DiagramGraph, kind: NodeKind) -> NodeId {
        graph.fresh_id(kind)
    }

    /// Rewrite an edited graph into the form a re-parse of its text yields:
    /// derived attributes, positional ids, normalized values.
    fn canonicalize(&self, _graph: &mut DiagramGraph) {}

    /// Strip narrative prose, fences and stray comments around the diagram.
    fn clean(&self, text: &str) -> String {
        extract_diagram(text, |l| self.is_header(l), |l| self.is_statement(l))
    }

    /// Parse with the default placement grid.
    ///
    /// Returns an empty graph when the text holds no diagram of this
    /// category; returns `Err` only for malformed, non-empty input.
    fn parse(&self, text: &str) -> Result<DiagramGraph, ParseError> {
        self.parse_with(text, GridConfig::default())
    }

    fn parse_with(&self, text: &str, grid: GridConfig) -> Result<DiagramGraph, ParseError> {
        let cleaned = self.clean(text);
        if cleaned.is_empty() {
            log::debug!("{}: no diagram header found", self.category());
            return Ok(DiagramGraph::new());
        }
        let mut graph = self.parse_cleaned(&cleaned)?;
        ensure_valid(&graph)?;
        place_in_grid(&mut graph, grid);
        for skipped in &graph.meta.skipped {
            log::warn!("{}: statement not modelled: {skipped}", self.category());
        }
        log::debug!(
            "{}: parsed {} nodes, {} edges",
            self.category(),
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }
}

// ─── Attribute checks ────────────────────────────────────────────────────

/// Reject `key` unless the adapter lists it for the node's kind.
pub(crate) fn supported_key<A: DiagramAdapter + ?Sized>(
    adapter: &A,
    node: &Node,
    key: &str,
) -> Result<(), String> {
    if adapter.supported_attributes(node.kind).contains(&key) {
        Ok(())
    } else {
        Err(format!(
            "{} text cannot hold `{key}` on a {} node",
            adapter.category(),
            node.kind.as_str()
        ))
    }
}

/// A non-empty, single-line text value.
pub(crate) fn plain_text<'a>(key: &str, value: &'a AttrValue) -> Result<&'a str, String> {
    match value {
        AttrValue::Text(text) if text.trim().is_empty() => {
            Err(format!("`{key}` cannot be empty; remove it instead"))
        }
        AttrValue::Text(text) if text.chars().any(char::is_control) => {
            Err(format!("`{key}` value {text:?} cannot be written on one line"))
        }
        AttrValue::Text(text) => Ok(text),
        AttrValue::List(_) => Err(format!("`{key}` takes text, not a list")),
    }
}

// ─── Grouped emission ────────────────────────────────────────────────────

/// Category-specific pieces of the shared declaration walk.
pub(crate) trait GroupWriter {
    fn element(&mut self, out: &mut String, graph: &DiagramGraph, node: &Node, depth: usize);
    fn open_group(&mut self, out: &mut String, node: &Node, depth: usize);
    fn close_group(&mut self, out: &mut String, node: &Node, depth: usize);
}

/// Walk declarations: ungrouped elements first, then each group with its
/// nested contents. Nodes whose parent is missing or not a group are
/// treated as top level so nothing is dropped.
pub(crate) fn write_grouped(
    out: &mut String,
    graph: &DiagramGraph,
    depth: usize,
    writer: &mut impl GroupWriter,
) {
    let mut visited = HashSet::new();
    let top: Vec<&Node> = graph
        .nodes
        .iter()
        .filter(|n| effective_parent(graph, n).is_none())
        .collect();
    write_level(out, graph, &top, depth, writer, &mut visited);
}

fn write_level(
    out: &mut String,
    graph: &DiagramGraph,
    level: &[&Node],
    depth: usize,
    writer: &mut impl GroupWriter,
    visited: &mut HashSet<NodeId>,
) {
    for node in level.iter().filter(|n| !n.kind.is_grouping()) {
        if visited.insert(node.id) {
            writer.element(out, graph, node, depth);
        }
    }
    for group in level.iter().filter(|n| n.kind.is_grouping()) {
        if !visited.insert(group.id) {
            continue;
        }
        writer.open_group(out, group, depth);
        let inner: Vec<&Node> = graph
            .nodes
            .iter()
            .filter(|n| effective_parent(graph, n) == Some(group.id))
            .collect();
        write_level(out, graph, &inner, depth + 1, writer, visited);
        writer.close_group(out, group, depth);
    }
}

fn effective_parent(graph: &DiagramGraph, node: &Node) -> Option<NodeId> {
    let parent = node.parent?;
    graph
        .get(parent)
        .filter(|p| p.kind.is_grouping())
        .map(|p| p.id)
}

pub(crate) fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Quote a label for emission; `"` has no escape in these grammars.
pub(crate) fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "#quot;"))
}

/// Reverse of [`quote`]'s escaping.
pub(crate) fn unescape(s: &str) -> String {
    s.replace("#quot;", "\"")
}
