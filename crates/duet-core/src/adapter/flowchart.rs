//! Process flows (`flowchart` / `graph`).
//!
//! ```text
//! flowchart LR
//!     start(["Start"])
//!     check{"Valid?"}
//!     subgraph backend["Backend"]
//!         api["API"]
//!     end
//!     start --> check
//!     check -->|yes| api
//!     check -.->|no| start
//! ```
//!
//! Shapes are kept in the `shape` attribute (plain rectangles carry none).
//! Dotted links map to [`EdgeStyle::Dashed`], `=` links to
//! [`EdgeStyle::Thick`], and arrowheads other than `>` to the `arrow`
//! attribute. Subgraphs become `Boundary` nodes.

use super::syntax::{body_lines, identifier, quoted, skip_space};
use super::{
    DiagramAdapter, GroupWriter, INDENT, indent, plain_text, quote, supported_key, unescape,
    write_grouped,
};
use crate::category::DiagramCategory;
use crate::error::ParseError;
use crate::id::NodeId;
use crate::model::{DiagramGraph, Edge, EdgeStyle, Node, NodeKind, attr};
use std::fmt::Write;
use winnow::ascii::space0;
use winnow::combinator::{delimited, opt, preceded, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{literal, take_till, take_while};

const KEYWORDS: &[&str] = &["flowchart", "graph"];
const DIRECTIONS: &[&str] = &["TB", "TD", "BT", "RL", "LR"];
const DEFAULT_DIRECTIVE: &str = "flowchart TD";

/// Styling and interaction statements: recognized, reported, not modelled.
const SKIPPED_KEYWORDS: &[&str] = &[
    "classDef",
    "class",
    "style",
    "linkStyle",
    "click",
    "direction",
    "accTitle",
    "accDescr",
];

/// `(open, close, shape)`; longer delimiters first so `([` wins over `(`.
const SHAPES: &[(&str, &str, &str)] = &[
    ("([", "])", "stadium"),
    ("((", "))", "circle"),
    ("[(", ")]", "cylinder"),
    ("[[", "]]", "subroutine"),
    ("{{", "}}", "hexagon"),
    ("[/", "/]", "parallelogram"),
    ("[\\", "\\]", "parallelogram_alt"),
    ("[", "]", "rect"),
    ("(", ")", "round"),
    ("{", "}", "diamond"),
    (">", "]", "asymmetric"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct FlowchartAdapter;

impl DiagramAdapter for FlowchartAdapter {
    fn category(&self) -> DiagramCategory {
        DiagramCategory::Flowchart
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    /// `flowchart`, `graph`, optionally followed by a direction. Prose such
    /// as "graph of the services" is not a header.
    fn is_header(&self, line: &str) -> bool {
        let mut tokens = line.trim_end_matches(';').split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(keyword), direction, None) => {
                KEYWORDS.contains(&keyword) && direction.is_none_or(|d| DIRECTIONS.contains(&d))
            }
            _ => false,
        }
    }

    fn is_statement(&self, line: &str) -> bool {
        line == "end"
            || line.starts_with("subgraph ")
            || is_skipped(line)
            || chain.parse(line.trim_end_matches(';').trim_end()).is_ok()
    }

    fn supported_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Generic, NodeKind::Boundary]
    }

    fn supported_edge_styles(&self) -> &'static [EdgeStyle] {
        &[EdgeStyle::Dashed, EdgeStyle::Thick]
    }

    fn supported_attributes(&self, kind: NodeKind) -> &'static [&'static str] {
        match kind {
            NodeKind::Generic => &[attr::SHAPE],
            _ => &[],
        }
    }

    fn check_attributes(&self, node: &Node) -> Result<(), String> {
        for (key, value) in node.attributes.iter() {
            supported_key(self, node, key)?;
            let shape = plain_text(key, value)?;
            if !SHAPES.iter().any(|(_, _, name)| *name == shape) {
                return Err(format!("unknown node shape `{shape}`"));
            }
        }
        Ok(())
    }

    /// Plain rectangles carry no `shape`.
    fn canonicalize(&self, graph: &mut DiagramGraph) {
        for node in &mut graph.nodes {
            if node.attributes.text(attr::SHAPE) == Some("rect") {
                node.attributes.remove(attr::SHAPE);
            }
        }
    }

    fn parse_cleaned(&self, cleaned: &str) -> Result<DiagramGraph, ParseError> {
        let mut graph = DiagramGraph::new();
        let header = cleaned.lines().next().unwrap_or_default();
        graph.meta.directive = Some(header.trim_end_matches(';').trim().to_string());

        let mut open: Vec<(usize, NodeId)> = Vec::new();

        for (line_no, line) in body_lines(cleaned) {
            let line = line.trim_end_matches(';').trim_end();
            if line == "end" {
                open.pop()
                    .ok_or(ParseError::UnexpectedClose { line: line_no })?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("subgraph ") {
                let parent = open.last().map(|(_, id)| *id);
                let id = declare_subgraph(&mut graph, rest.trim(), parent, line_no)?;
                open.push((line_no, id));
                continue;
            }
            if is_skipped(line) {
                graph.meta.skipped.push(line.to_string());
                continue;
            }

            let statement = chain
                .parse(line)
                .map_err(|_| ParseError::syntax(line_no, format!("malformed statement `{line}`")))?;
            let parent = open.last().map(|(_, id)| *id);
            apply_chain(&mut graph, statement, parent);
        }

        if let Some((line, id)) = open.pop() {
            return Err(ParseError::UnclosedBlock {
                line,
                id: id.to_string(),
            });
        }
        Ok(graph)
    }

    fn generate(&self, graph: &DiagramGraph) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(graph.meta.directive.as_deref().unwrap_or(DEFAULT_DIRECTIVE));
        out.push('\n');

        write_grouped(&mut out, graph, 1, &mut FlowWriter);

        for edge in &graph.edges {
            let _ = write!(out, "{INDENT}{} {}", edge.source, connector(edge));
            if let Some(label) = &edge.label {
                let escaped = label.replace('|', "#124;");
                if label.contains('"') || label.trim() != label {
                    let _ = write!(out, "|{}|", quote(&escaped));
                } else {
                    let _ = write!(out, "|{escaped}|");
                }
            }
            let _ = writeln!(out, " {}", edge.target);
        }
        out
    }
}

struct FlowWriter;

impl GroupWriter for FlowWriter {
    fn element(&mut self, out: &mut String, _graph: &DiagramGraph, node: &Node, depth: usize) {
        indent(out, depth);
        let shape = node.attributes.text(attr::SHAPE).unwrap_or("rect");
        if shape == "rect" && node.label == node.id.as_str() {
            let _ = writeln!(out, "{}", node.id);
            return;
        }
        let (open, close, _) = SHAPES
            .iter()
            .find(|(_, _, name)| *name == shape)
            .unwrap_or(&SHAPES[7]);
        let _ = writeln!(out, "{}{open}{}{close}", node.id, quote(&node.label));
    }

    fn open_group(&mut self, out: &mut String, node: &Node, depth: usize) {
        indent(out, depth);
        if node.label == node.id.as_str() {
            let _ = writeln!(out, "subgraph {}", node.id);
        } else {
            let _ = writeln!(out, "subgraph {}[{}]", node.id, quote(&node.label));
        }
    }

    fn close_group(&mut self, out: &mut String, _node: &Node, depth: usize) {
        indent(out, depth);
        out.push_str("end\n");
    }
}

/// Link token for an edge: body from the style, head from the `arrow` attribute.
fn connector(edge: &Edge) -> String {
    let (left, head) = match edge.attributes.text(attr::ARROW) {
        Some("open") => ("", ""),
        Some("circle") => ("", "o"),
        Some("cross") => ("", "x"),
        Some("both") => ("<", ">"),
        _ => ("", ">"),
    };
    let body = match (edge.style, head.is_empty()) {
        (Some(EdgeStyle::Dashed), _) => "-.-",
        (Some(EdgeStyle::Thick), true) => "===",
        (Some(EdgeStyle::Thick), false) => "==",
        (_, true) => "---",
        (_, false) => "--",
    };
    format!("{left}{body}{head}")
}

fn is_skipped(line: &str) -> bool {
    let keyword = line.split_whitespace().next().unwrap_or_default();
    SKIPPED_KEYWORDS.contains(&keyword)
}

/// `id`, `id[Title]`, `id["Title"]` or a multi-word title (id = words joined by `_`).
fn declare_subgraph(
    graph: &mut DiagramGraph,
    header: &str,
    parent: Option<NodeId>,
    line: usize,
) -> Result<NodeId, ParseError> {
    let (raw_id, label) = match header.split_once('[') {
        Some((id, rest)) => {
            let title = rest.strip_suffix(']').ok_or_else(|| {
                ParseError::syntax(line, format!("unterminated subgraph title `{header}`"))
            })?;
            let title = title.trim();
            let title = match title.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                Some(inner) => unescape(inner),
                None => title.to_string(),
            };
            (id.trim().to_string(), title)
        }
        None => (header.split_whitespace().collect::<Vec<_>>().join("_"), header.to_string()),
    };
    if raw_id.is_empty() {
        return Err(ParseError::syntax(line, "subgraph needs an id"));
    }
    let id = NodeId::intern(&raw_id);

    match graph.get_mut(id) {
        // Referenced by a link before its declaration.
        Some(existing) if existing.kind == NodeKind::Generic && existing.attributes.is_empty() => {
            existing.kind = NodeKind::Boundary;
            existing.label = label;
            if existing.parent.is_none() {
                existing.parent = parent;
            }
        }
        Some(_) => {
            return Err(ParseError::DuplicateNode {
                line,
                id: raw_id,
            });
        }
        None => {
            graph.insert_node(Node::new(id, NodeKind::Boundary, label).with_parent(parent));
        }
    }
    Ok(id)
}

fn apply_chain(graph: &mut DiagramGraph, statement: Chain<'_>, parent: Option<NodeId>) {
    let mut previous = mention_all(graph, &statement.first, parent);
    for (link, group) in statement.links {
        let current = mention_all(graph, &group, parent);
        for &source in &previous {
            for &target in &current {
                let id = graph.next_edge_id(source, target);
                let mut edge = Edge::new(id, source, target)
                    .with_label(link.label.clone())
                    .with_style(link.style);
                if let Some(arrow) = link.arrow {
                    edge.attributes.set_text(attr::ARROW, arrow);
                }
                graph.edges.push(edge);
            }
        }
        previous = current;
    }
}

/// Declare or update each referenced node; returns their ids in order.
fn mention_all(graph: &mut DiagramGraph, refs: &[NodeRef<'_>], parent: Option<NodeId>) -> Vec<NodeId> {
    refs.iter().map(|r| mention(graph, r, parent)).collect()
}

fn mention(graph: &mut DiagramGraph, node_ref: &NodeRef<'_>, parent: Option<NodeId>) -> NodeId {
    let id = NodeId::intern(node_ref.id);
    if !graph.contains(id) {
        graph.insert_node(Node::new(id, NodeKind::Generic, node_ref.id));
    }
    if let Some(node) = graph.get_mut(id) {
        if let Some((shape, label)) = &node_ref.shape {
            node.label = label.clone();
            if *shape == "rect" {
                node.attributes.remove(attr::SHAPE);
            } else {
                node.attributes.set_text(attr::SHAPE, *shape);
            }
        }
        if node.parent.is_none() && !node.kind.is_grouping() && parent != Some(id) {
            node.parent = parent;
        }
    }
    id
}

// ─── Statement parsers ───────────────────────────────────────────────────

#[derive(Debug)]
struct NodeRef<'a> {
    id: &'a str,
    shape: Option<(&'static str, String)>,
}

#[derive(Debug)]
struct Link {
    style: Option<EdgeStyle>,
    arrow: Option<&'static str>,
    label: Option<String>,
}

#[derive(Debug)]
struct Chain<'a> {
    first: Vec<NodeRef<'a>>,
    links: Vec<(Link, Vec<NodeRef<'a>>)>,
}

/// `a --> b & c -.->|x| d`
fn chain<'a>(input: &mut &'a str) -> ModalResult<Chain<'a>> {
    let first = node_group.parse_next(input)?;
    let mut links = Vec::new();
    loop {
        skip_space(input);
        if input.is_empty() {
            break;
        }
        let link = link.parse_next(input)?;
        skip_space(input);
        let group = node_group.parse_next(input)?;
        links.push((link, group));
    }
    Ok(Chain { first, links })
}

fn node_group<'a>(input: &mut &'a str) -> ModalResult<Vec<NodeRef<'a>>> {
    separated(1.., node_ref, delimited(space0, '&', space0)).parse_next(input)
}

fn node_ref<'a>(input: &mut &'a str) -> ModalResult<NodeRef<'a>> {
    let id = identifier.parse_next(input)?;
    if id == "end" || id == "subgraph" {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let shape = opt(shaped_label).parse_next(input)?;
    // `:::class` shorthand is presentation only.
    let _: Option<&str> = opt(preceded(":::", identifier)).parse_next(input)?;
    Ok(NodeRef { id, shape })
}

fn shaped_label(input: &mut &str) -> ModalResult<(&'static str, String)> {
    let Some(&(open, close, shape)) = SHAPES.iter().find(|(open, _, _)| input.starts_with(open))
    else {
        return Err(ErrMode::Backtrack(ContextError::new()));
    };
    *input = &input[open.len()..];
    skip_space(input);
    let label = if input.starts_with('"') {
        let text = quoted.parse_next(input)?;
        skip_space(input);
        unescape(text)
    } else {
        let end = input
            .find(close)
            .ok_or_else(|| ErrMode::Backtrack(ContextError::new()))?;
        let text = input[..end].trim().to_string();
        *input = &input[end..];
        text
    };
    literal(close).parse_next(input)?;
    Ok((shape, label))
}

/// `-->`, `---`, `-.->`, `==>`, `--o`, `<-->`, `-- text -->`, each with an
/// optional `|label|`.
fn link(input: &mut &str) -> ModalResult<Link> {
    let both = opt('<').parse_next(input)?.is_some();
    let mut body: String = stroke.parse_next(input)?.to_string();
    let mut head = arrow_head(input);
    let mut label = None;

    // `-- text -->` / `-. text .->` / `== text ==>`
    if head.is_none() && body.len() == 2 && input.starts_with(' ') {
        let text: &str = take_till(1.., |c: char| matches!(c, '-' | '=' | '.')).parse_next(input)?;
        let closing = stroke.parse_next(input)?;
        body.push_str(closing);
        head = arrow_head(input);
        label = Some(text.trim().to_string());
    }

    if both && head != Some('>') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }

    skip_space(input);
    if label.is_none() {
        let piped: Option<&str> = opt(delimited('|', take_till(0.., '|'), '|')).parse_next(input)?;
        label = piped.map(|l| {
            let l = l.trim();
            match l.strip_prefix('"').and_then(|l| l.strip_suffix('"')) {
                Some(inner) => unescape(inner).replace("#124;", "|"),
                None => l.replace("#124;", "|"),
            }
        });
    }

    let style = if body.contains('.') {
        Some(EdgeStyle::Dashed)
    } else if body.contains('=') {
        Some(EdgeStyle::Thick)
    } else {
        None
    };
    let arrow = match (both, head) {
        (true, _) => Some("both"),
        (false, Some('>')) => None,
        (false, Some('o')) => Some("circle"),
        (false, Some('x')) => Some("cross"),
        _ => Some("open"),
    };
    Ok(Link {
        style,
        arrow,
        label: label.filter(|l| !l.is_empty()),
    })
}

fn stroke<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(2.., |c: char| matches!(c, '-' | '=' | '.')).parse_next(input)
}

/// `>`, or `o` / `x` when followed by a separator (so `-->xray` stays a node).
fn arrow_head(input: &mut &str) -> Option<char> {
    let mut chars = input.chars();
    let head = chars.next()?;
    let separated = chars.next().is_none_or(|c| c.is_whitespace() || c == '|');
    let accepted = head == '>' || (matches!(head, 'o' | 'x') && separated);
    if accepted {
        *input = &input[1..];
        Some(head)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHECKOUT: &str = "\
flowchart LR
    start([\"Start\"])
    check{\"Valid cart?\"}
    pay
    subgraph backend[\"Backend\"]
        api[\"Orders API\"]
        db[(\"Orders DB\")]
    end
    start --> check
    check -->|yes| pay
    check -.->|no| start
    pay ==> api
    api --- db
";

    #[test]
    fn parse_shapes_links_and_subgraphs() {
        let g = FlowchartAdapter.parse(CHECKOUT).unwrap();
        assert_eq!(g.nodes.len(), 6);
        assert_eq!(g.edges.len(), 5);
        assert_eq!(g.meta.directive.as_deref(), Some("flowchart LR"));

        let start = g.get(NodeId::intern("start")).unwrap();
        assert_eq!(start.label, "Start");
        assert_eq!(start.attributes.text(attr::SHAPE), Some("stadium"));

        let api = g.get(NodeId::intern("api")).unwrap();
        assert_eq!(api.parent, Some(NodeId::intern("backend")));
        assert_eq!(api.attributes.text(attr::SHAPE), None);

        assert_eq!(g.edges[1].label.as_deref(), Some("yes"));
        assert_eq!(g.edges[2].style, Some(EdgeStyle::Dashed));
        assert_eq!(g.edges[3].style, Some(EdgeStyle::Thick));
        assert_eq!(g.edges[4].attributes.text(attr::ARROW), Some("open"));
    }

    #[test]
    fn generate_reproduces_canonical_text() {
        let g = FlowchartAdapter.parse(CHECKOUT).unwrap();
        assert_eq!(FlowchartAdapter.generate(&g), CHECKOUT);
    }

    #[test]
    fn chains_and_ampersands() {
        let g = FlowchartAdapter.parse("graph TD\n    a --> b --> c\n    a & b --> d\n").unwrap();
        let pairs: Vec<(String, String)> = g
            .edges
            .iter()
            .map(|e| (e.source.to_string(), e.target.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".into(), "b".into()),
                ("b".into(), "c".into()),
                ("a".into(), "d".into()),
                ("b".into(), "d".into()),
            ]
        );
    }

    #[test]
    fn text_links() {
        let g = FlowchartAdapter.parse("flowchart TD\n    a -- sends --> b\n    b -. maybe .-> c\n").unwrap();
        assert_eq!(g.edges[0].label.as_deref(), Some("sends"));
        assert_eq!(g.edges[0].style, None);
        assert_eq!(g.edges[1].label.as_deref(), Some("maybe"));
        assert_eq!(g.edges[1].style, Some(EdgeStyle::Dashed));
    }

    #[test]
    fn arrowheads() {
        let g = FlowchartAdapter
            .parse("flowchart TD\n    a --o b\n    b --x c\n    c <--> d\n    d -->xray\n")
            .unwrap();
        assert_eq!(g.edges[0].attributes.text(attr::ARROW), Some("circle"));
        assert_eq!(g.edges[1].attributes.text(attr::ARROW), Some("cross"));
        assert_eq!(g.edges[2].attributes.text(attr::ARROW), Some("both"));
        assert_eq!(g.edges[3].target, NodeId::intern("xray"));
        assert_eq!(connector(&g.edges[2]), "<-->");
    }

    #[test]
    fn prose_is_not_a_header() {
        assert!(FlowchartAdapter.is_header("flowchart TD"));
        assert!(FlowchartAdapter.is_header("graph"));
        assert!(!FlowchartAdapter.is_header("graph of the services"));
        let g = FlowchartAdapter.parse("A graph of our services would help.").unwrap();
        assert!(g.is_empty());
    }

    #[test]
    fn styling_statements_are_reported() {
        let g = FlowchartAdapter
            .parse("flowchart TD\n    a --> b\n    classDef hot fill:#f00\n    class a hot\n")
            .unwrap();
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.meta.skipped.len(), 2);
    }

    #[test]
    fn subgraph_forms() {
        let g = FlowchartAdapter
            .parse("flowchart TD\n    x --> core\n    subgraph core\n        a\n    end\n    subgraph two words\n        b\n    end\n")
            .unwrap();
        let core = g.get(NodeId::intern("core")).unwrap();
        assert_eq!(core.kind, NodeKind::Boundary);
        let two = g.get(NodeId::intern("two_words")).unwrap();
        assert_eq!(two.label, "two words");
        assert_eq!(g.get(NodeId::intern("b")).unwrap().parent, Some(two.id));
    }

    #[test]
    fn malformed_lines_are_errors() {
        let err = FlowchartAdapter.parse("flowchart TD\n    a -->\n    b\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

        let err = FlowchartAdapter.parse("flowchart TD\n    subgraph s\n        a\n").unwrap_err();
        assert!(matches!(err, ParseError::UnclosedBlock { line: 2, .. }));

        let err = FlowchartAdapter.parse("flowchart TD\n    a\n    end\n").unwrap_err();
        assert_eq!(err, ParseError::UnexpectedClose { line: 3 });

        let err = FlowchartAdapter.parse("flowchart TD\n    a[\"open\n    b\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn edge_labels_keep_quotes_pipes_and_padding() {
        for label in ["\"quoted\"", "say \"hi\"", "a|b", " padded "] {
            let mut g = FlowchartAdapter.parse("flowchart TD\n    a --> b\n").unwrap();
            g.edges[0].label = Some(label.to_string());
            let text = FlowchartAdapter.generate(&g);
            let reparsed = FlowchartAdapter.parse(&text).unwrap();
            assert_eq!(reparsed.edges[0].label.as_deref(), Some(label), "text was:\n{text}");
        }
    }

    #[test]
    fn only_known_shapes_are_attributes() {
        let mut node = Node::new(NodeId::intern("n"), NodeKind::Generic, "N");
        node.attributes.set_text(attr::SHAPE, "round");
        assert_eq!(FlowchartAdapter.check_attributes(&node), Ok(()));

        node.attributes.set_text(attr::SHAPE, "cloud");
        assert!(FlowchartAdapter.check_attributes(&node).is_err());

        node.attributes.remove(attr::SHAPE);
        node.attributes.set_text(attr::TECHNOLOGY, "Rust");
        assert!(FlowchartAdapter.check_attributes(&node).is_err());
    }

    #[test]
    fn rect_shape_is_implicit() {
        let mut g = FlowchartAdapter.parse("flowchart TD\n    a[\"A\"]\n").unwrap();
        g.nodes[0].attributes.set_text(attr::SHAPE, "rect");
        FlowchartAdapter.canonicalize(&mut g);
        assert_eq!(g.nodes[0].attributes.text(attr::SHAPE), None);
        let reparsed = FlowchartAdapter.parse(&FlowchartAdapter.generate(&g)).unwrap();
        assert!(reparsed.structurally_eq(&g));
    }
}
