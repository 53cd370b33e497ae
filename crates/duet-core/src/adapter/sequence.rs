//! Interaction diagrams (`sequenceDiagram`).
//!
//! Participants and actors are nodes; messages are edges in message order.
//! `box ... end` groups become `Boundary` nodes named `box_1`, `box_2`, ...
//! in declaration order. A `--` arrow body maps to [`EdgeStyle::Dashed`];
//! the arrowhead is kept in the `arrow` attribute when it is not the
//! default `>>`.
//!
//! Control blocks (`loop`, `alt`, `opt`, ...), notes and activations are
//! recognized and reported as skipped. Messages inside control blocks are
//! still modelled; the block structure itself is not.

use super::syntax::{body_lines, identifier, skip_space, title_text};
use super::{DiagramAdapter, GroupWriter, INDENT, indent, write_grouped};
use crate::category::DiagramCategory;
use crate::error::ParseError;
use crate::id::NodeId;
use crate::model::{DiagramGraph, Edge, EdgeStyle, Node, NodeKind, attr};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use winnow::combinator::opt;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::one_of;

const KEYWORDS: &[&str] = &["sequenceDiagram"];

/// Longest first so `-->>` is not read as `-->`.
const ARROWS: &[&str] = &[
    "<<-->>", "<<->>", "-->>", "--)", "--x", "-->", "->>", "-)", "-x", "->",
];
const DEFAULT_HEAD: &str = ">>";

const CONTROL_BLOCKS: &[&str] = &["loop", "alt", "opt", "par", "critical", "break", "rect"];
const SKIPPED_KEYWORDS: &[&str] = &[
    "else",
    "and",
    "option",
    "note",
    "Note",
    "activate",
    "deactivate",
    "autonumber",
    "create",
    "destroy",
    "link",
    "links",
    "properties",
    "details",
    "accTitle",
    "accDescr",
];

/// Attribute holding the `+` / `-` activation marker of a message.
const ACTIVATION: &str = "activation";

#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceAdapter;

#[derive(Debug, Clone, Copy)]
enum Block {
    Box(usize, NodeId),
    Control(usize),
}

impl DiagramAdapter for SequenceAdapter {
    fn category(&self) -> DiagramCategory {
        DiagramCategory::Sequence
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    fn is_statement(&self, line: &str) -> bool {
        let keyword = line.split_whitespace().next().unwrap_or_default();
        matches!(keyword, "participant" | "actor" | "box" | "end")
            || title_text(line).is_some()
            || CONTROL_BLOCKS.contains(&keyword)
            || SKIPPED_KEYWORDS.contains(&keyword)
            || message.parse(line).is_ok()
    }

    fn supported_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Participant, NodeKind::Actor, NodeKind::Boundary]
    }

    fn supported_edge_styles(&self) -> &'static [EdgeStyle] {
        &[EdgeStyle::Dashed]
    }

    fn allows_nested_groups(&self) -> bool {
        false
    }

    /// Messages run between participants; a box is not a lifeline.
    fn can_connect(&self, kind: NodeKind) -> bool {
        !kind.is_grouping()
    }

    fn fresh_id(&self, graph: &DiagramGraph, kind: NodeKind) -> NodeId {
        if kind.is_grouping() {
            let id = box_id(graph.nodes.iter().filter(|n| n.kind.is_grouping()).count() + 1);
            if !graph.contains(id) {
                return id;
            }
        }
        graph.fresh_id(kind)
    }

    /// Box ids are positional: the n-th box in declaration order is `box_n`.
    fn canonicalize(&self, graph: &mut DiagramGraph) {
        let renames: HashMap<NodeId, NodeId> = graph
            .nodes
            .iter()
            .filter(|n| n.kind.is_grouping())
            .enumerate()
            .map(|(i, n)| (n.id, box_id(i + 1)))
            .filter(|(old, new)| old != new)
            .collect();
        if renames.is_empty() {
            return;
        }
        for node in &mut graph.nodes {
            if let Some(&new) = renames.get(&node.id) {
                if node.label == node.id.as_str() {
                    node.label = new.as_str().to_string();
                }
                node.id = new;
            }
            if let Some(parent) = node.parent
                && let Some(&new) = renames.get(&parent)
            {
                node.parent = Some(new);
            }
        }
    }

    fn parse_cleaned(&self, cleaned: &str) -> Result<DiagramGraph, ParseError> {
        let mut graph = DiagramGraph::new();
        let mut blocks: Vec<Block> = Vec::new();
        let mut declared: HashSet<NodeId> = HashSet::new();
        let mut boxes = 0usize;

        for (line_no, line) in body_lines(cleaned) {
            if let Some(title) = title_text(line) {
                graph.meta.title = Some(title.to_string()).filter(|t| !t.is_empty());
                continue;
            }
            let (keyword, rest) = line
                .split_once(char::is_whitespace)
                .map_or((line, ""), |(k, r)| (k, r.trim()));
            let current_box = blocks.iter().rev().find_map(|b| match b {
                Block::Box(_, id) => Some(*id),
                Block::Control(_) => None,
            });

            match keyword {
                "participant" | "actor" => {
                    let kind = if keyword == "actor" {
                        NodeKind::Actor
                    } else {
                        NodeKind::Participant
                    };
                    let id = declare_participant(&mut graph, kind, rest, current_box, line_no)?;
                    if !declared.insert(id) {
                        return Err(ParseError::DuplicateNode {
                            line: line_no,
                            id: id.to_string(),
                        });
                    }
                }
                "box" => {
                    if !blocks.is_empty() {
                        return Err(ParseError::syntax(line_no, "`box` cannot be nested"));
                    }
                    boxes += 1;
                    let id = box_id(boxes);
                    if !graph.insert_node(Node::new(id, NodeKind::Boundary, rest)) {
                        return Err(ParseError::DuplicateNode {
                            line: line_no,
                            id: id.to_string(),
                        });
                    }
                    blocks.push(Block::Box(line_no, id));
                }
                "end" => {
                    let closed = blocks
                        .pop()
                        .ok_or(ParseError::UnexpectedClose { line: line_no })?;
                    if matches!(closed, Block::Control(_)) {
                        graph.meta.skipped.push(line.to_string());
                    }
                }
                k if CONTROL_BLOCKS.contains(&k) => {
                    blocks.push(Block::Control(line_no));
                    graph.meta.skipped.push(line.to_string());
                }
                k if SKIPPED_KEYWORDS.contains(&k) => {
                    graph.meta.skipped.push(line.to_string());
                }
                _ => {
                    let msg = message.parse(line).map_err(|_| {
                        ParseError::syntax(line_no, format!("malformed statement `{line}`"))
                    })?;
                    add_message(&mut graph, msg);
                }
            }
        }

        if let Some(block) = blocks.pop() {
            let (line, id) = match block {
                Block::Box(line, id) => (line, id.to_string()),
                Block::Control(line) => (line, "control block".to_string()),
            };
            return Err(ParseError::UnclosedBlock { line, id });
        }
        Ok(graph)
    }

    fn generate(&self, graph: &DiagramGraph) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(KEYWORDS[0]);
        out.push('\n');
        if let Some(title) = &graph.meta.title {
            let _ = writeln!(out, "{INDENT}title {title}");
        }

        write_grouped(&mut out, graph, 1, &mut SequenceWriter);

        for edge in &graph.edges {
            let _ = write!(
                out,
                "{INDENT}{}{}{}{}:",
                edge.source,
                arrow_token(edge),
                edge.attributes.text(ACTIVATION).unwrap_or_default(),
                edge.target
            );
            if let Some(label) = &edge.label {
                let _ = write!(out, " {label}");
            }
            out.push('\n');
        }
        out
    }
}

struct SequenceWriter;

impl GroupWriter for SequenceWriter {
    fn element(&mut self, out: &mut String, _graph: &DiagramGraph, node: &Node, depth: usize) {
        indent(out, depth);
        let keyword = if node.kind == NodeKind::Actor {
            "actor"
        } else {
            "participant"
        };
        if node.label == node.id.as_str() {
            let _ = writeln!(out, "{keyword} {}", node.id);
        } else {
            let _ = writeln!(out, "{keyword} {} as {}", node.id, node.label);
        }
    }

    fn open_group(&mut self, out: &mut String, node: &Node, depth: usize) {
        indent(out, depth);
        if node.label.is_empty() {
            out.push_str("box\n");
        } else {
            let _ = writeln!(out, "box {}", node.label);
        }
    }

    fn close_group(&mut self, out: &mut String, _node: &Node, depth: usize) {
        indent(out, depth);
        out.push_str("end\n");
    }
}

fn box_id(n: usize) -> NodeId {
    NodeId::intern(&format!("box_{n}"))
}

/// Arrow body from the style, head from the `arrow` attribute.
fn arrow_token(edge: &Edge) -> String {
    let dash = if edge.style == Some(EdgeStyle::Dashed) {
        "--"
    } else {
        "-"
    };
    let head = edge.attributes.text(attr::ARROW).unwrap_or(DEFAULT_HEAD);
    match head.strip_prefix("<<") {
        Some(right) => format!("<<{dash}{right}"),
        None => format!("{dash}{head}"),
    }
}

/// `ID`, `ID as Label`. A participant first mentioned by a message is refined in place.
fn declare_participant(
    graph: &mut DiagramGraph,
    kind: NodeKind,
    header: &str,
    parent: Option<NodeId>,
    line: usize,
) -> Result<NodeId, ParseError> {
    let (raw_id, label) = match header.split_once(" as ") {
        Some((id, label)) => (id.trim(), label.trim()),
        None => (header.trim(), header.trim()),
    };
    if raw_id.is_empty() || raw_id.contains(char::is_whitespace) {
        return Err(ParseError::syntax(line, format!("invalid participant `{header}`")));
    }
    let id = NodeId::intern(raw_id);
    match graph.get_mut(id) {
        Some(existing) => {
            existing.kind = kind;
            existing.label = label.to_string();
            existing.parent = parent;
        }
        None => {
            graph.insert_node(Node::new(id, kind, label).with_parent(parent));
        }
    }
    Ok(id)
}

fn add_message(graph: &mut DiagramGraph, msg: Message<'_>) {
    let mut ends = [NodeId::intern(msg.from), NodeId::intern(msg.to)];
    for (end, raw) in ends.iter_mut().zip([msg.from, msg.to]) {
        if !graph.contains(*end) {
            graph.insert_node(Node::new(*end, NodeKind::Participant, raw));
        }
    }
    let [source, target] = ends;
    let id = graph.next_edge_id(source, target);
    let dashed = msg.arrow.contains("--");
    let head = msg.arrow.replace('-', "");
    let mut edge = Edge::new(id, source, target)
        .with_label(msg.text)
        .with_style(dashed.then_some(EdgeStyle::Dashed));
    if head != DEFAULT_HEAD {
        edge.attributes.set_text(attr::ARROW, head);
    }
    if let Some(activation) = msg.activation {
        edge.attributes.set_text(ACTIVATION, activation.to_string());
    }
    graph.edges.push(edge);
}

// ─── Statement parsers ───────────────────────────────────────────────────

#[derive(Debug)]
struct Message<'a> {
    from: &'a str,
    arrow: &'static str,
    activation: Option<char>,
    to: &'a str,
    text: Option<String>,
}

/// `A->>B: text`, `A-->>-B: text`, `A-)B`
fn message<'a>(input: &mut &'a str) -> ModalResult<Message<'a>> {
    let from = identifier.parse_next(input)?;
    skip_space(input);
    let Some(&arrow) = ARROWS.iter().find(|a| input.starts_with(**a)) else {
        return Err(ErrMode::Backtrack(ContextError::new()));
    };
    *input = &input[arrow.len()..];
    let activation = opt(one_of(['+', '-'])).parse_next(input)?;
    skip_space(input);
    let to = identifier.parse_next(input)?;
    skip_space(input);
    let text = if input.starts_with(':') {
        let rest = std::mem::take(input);
        Some(rest[1..].trim().to_string())
    } else if input.is_empty() {
        None
    } else {
        return Err(ErrMode::Backtrack(ContextError::new()));
    };
    Ok(Message {
        from,
        arrow,
        activation,
        to,
        text,
    })
}
