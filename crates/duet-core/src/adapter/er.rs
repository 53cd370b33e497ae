//! Entity-relationship diagrams (`erDiagram`).
//!
//! ```text
//! erDiagram
//!     CUSTOMER {
//!         string name PK
//!     }
//!     CUSTOMER ||--o{ ORDER : places
//! ```
//!
//! Entities become `Entity` nodes whose attribute rows are kept verbatim in
//! the `properties` list. Relationships keep their cardinality token; the
//! non-identifying `..` line maps to a dashed edge.

use super::syntax::{body_lines, dashed_identifier, quoted, skip_space, title_text};
use super::{DiagramAdapter, INDENT, indent, quote, supported_key, unescape};
use crate::category::DiagramCategory;
use crate::error::ParseError;
use crate::id::NodeId;
use crate::model::{AttrValue, DiagramGraph, Edge, EdgeStyle, Node, NodeKind, attr};
use std::fmt::Write;
use winnow::combinator::{alt, delimited, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

const KEYWORDS: &[&str] = &["erDiagram"];
const LEFT_ENDS: &[&str] = &["|o", "||", "}o", "}|"];
const RIGHT_ENDS: &[&str] = &["o|", "||", "o{", "|{"];
const DEFAULT_CARDINALITY: &str = "||--o{";

#[derive(Debug, Default, Clone, Copy)]
pub struct ErAdapter;

impl DiagramAdapter for ErAdapter {
    fn category(&self) -> DiagramCategory {
        DiagramCategory::Er
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    fn is_statement(&self, line: &str) -> bool {
        line == "}"
            || line.ends_with('{')
            || title_text(line).is_some()
            || line.starts_with("direction ")
            || relationship.parse(line).is_ok()
            || entity_ref.parse(line).is_ok()
    }

    fn supported_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Entity]
    }

    fn supported_edge_styles(&self) -> &'static [EdgeStyle] {
        &[EdgeStyle::Dashed]
    }

    fn supported_attributes(&self, kind: NodeKind) -> &'static [&'static str] {
        match kind {
            NodeKind::Entity => &[attr::PROPERTIES],
            _ => &[],
        }
    }

    fn check_attributes(&self, node: &Node) -> Result<(), String> {
        for (key, value) in node.attributes.iter() {
            supported_key(self, node, key)?;
            let AttrValue::List(rows) = value else {
                return Err(format!("`{key}` takes a list of attribute rows"));
            };
            if rows.is_empty() {
                return Err(format!("`{key}` needs at least one row; remove it instead"));
            }
            for row in rows {
                let normalized = normalize_row(row);
                if normalized.is_empty()
                    || normalized == "}"
                    || normalized.starts_with("%%")
                    || row.chars().any(char::is_control)
                {
                    return Err(format!("attribute row {row:?} cannot be written"));
                }
            }
        }
        Ok(())
    }

    /// Relationships always carry the cardinality token they are written
    /// with, and attribute rows are single-spaced.
    fn canonicalize(&self, graph: &mut DiagramGraph) {
        for edge in &mut graph.edges {
            let token = cardinality_for(edge);
            edge.attributes.set_text(attr::CARDINALITY, token);
        }
        for node in &mut graph.nodes {
            let rows = node.attributes.list(attr::PROPERTIES);
            if rows.iter().all(|r| normalize_row(r) == *r) {
                continue;
            }
            let rows = rows.iter().map(|r| normalize_row(r)).collect();
            node.attributes.set(attr::PROPERTIES, AttrValue::List(rows));
        }
    }

    fn parse_cleaned(&self, cleaned: &str) -> Result<DiagramGraph, ParseError> {
        let mut graph = DiagramGraph::new();
        let mut open_block: Option<(usize, NodeId)> = None;

        for (line_no, line) in body_lines(cleaned) {
            if let Some((_, entity)) = open_block {
                if line == "}" {
                    open_block = None;
                } else if let Some(node) = graph.get_mut(entity) {
                    node.attributes.push(attr::PROPERTIES, normalize_row(line));
                }
                continue;
            }

            if let Some(title) = title_text(line) {
                graph.meta.title = Some(title.to_string()).filter(|t| !t.is_empty());
            } else if let Some(dir) = line.strip_prefix("direction ") {
                graph.meta.directive = Some(dir.trim().to_string());
            } else if line == "}" {
                return Err(ParseError::UnexpectedClose { line: line_no });
            } else if let Some(head) = line.strip_suffix('{') {
                let (id, label) = entity_ref
                    .parse(head.trim())
                    .map_err(|_| ParseError::syntax(line_no, format!("bad entity block `{line}`")))?;
                let id = declare(&mut graph, id, label);
                open_block = Some((line_no, id));
            } else if let Some(block) = line.strip_suffix('}').and_then(|l| l.trim().strip_suffix('{')) {
                // `NAME {}` on one line
                let (id, label) = entity_ref
                    .parse(block.trim())
                    .map_err(|_| ParseError::syntax(line_no, format!("bad entity block `{line}`")))?;
                declare(&mut graph, id, label);
            } else if let Ok(rel) = relationship.parse(line) {
                let from = declare(&mut graph, rel.from, None);
                let to = declare(&mut graph, rel.to, None);
                let style = rel.cardinality.contains("..").then_some(EdgeStyle::Dashed);
                let id = graph.next_edge_id(from, to);
                let mut edge = Edge::new(id, from, to)
                    .with_label(rel.label)
                    .with_style(style);
                edge.attributes
                    .set_text(attr::CARDINALITY, rel.cardinality);
                graph.edges.push(edge);
            } else if let Ok((id, label)) = entity_ref.parse(line) {
                declare(&mut graph, id, label);
            } else {
                return Err(ParseError::syntax(
                    line_no,
                    format!("expected relationship or entity, found `{line}`"),
                ));
            }
        }

        if let Some((line, id)) = open_block {
            return Err(ParseError::UnclosedBlock {
                line,
                id: id.to_string(),
            });
        }
        Ok(graph)
    }

    fn generate(&self, graph: &DiagramGraph) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("erDiagram\n");
        if let Some(title) = &graph.meta.title {
            let _ = writeln!(out, "{INDENT}title {title}");
        }
        if let Some(dir) = &graph.meta.directive {
            let _ = writeln!(out, "{INDENT}direction {dir}");
        }

        for node in &graph.nodes {
            indent(&mut out, 1);
            out.push_str(node.id.as_str());
            if node.label != node.id.as_str() && !node.label.is_empty() {
                let _ = write!(out, "[{}]", quote(&node.label));
            }
            let rows = node.attributes.list(attr::PROPERTIES);
            if rows.is_empty() {
                out.push('\n');
                continue;
            }
            out.push_str(" {\n");
            for row in rows {
                indent(&mut out, 2);
                out.push_str(row);
                out.push('\n');
            }
            indent(&mut out, 1);
            out.push_str("}\n");
        }

        for edge in &graph.edges {
            let cardinality = cardinality_for(edge);
            let label = match edge.label.as_deref() {
                Some(l) if is_bare_word(l) => l.to_string(),
                Some(l) => quote(l),
                None => "\"\"".to_string(),
            };
            let _ = writeln!(
                out,
                "{INDENT}{} {cardinality} {} : {label}",
                edge.source.as_str(),
                edge.target.as_str()
            );
        }
        out
    }
}

/// Register an entity if it is new; a later alias overrides the default label.
fn declare(graph: &mut DiagramGraph, name: &str, label: Option<String>) -> NodeId {
    let id = NodeId::intern(name);
    match graph.get_mut(id) {
        Some(node) => {
            if let Some(label) = label {
                node.label = label;
            }
        }
        None => {
            let label = label.unwrap_or_else(|| name.to_string());
            graph.insert_node(Node::new(id, NodeKind::Entity, label));
        }
    }
    id
}

/// Cardinality token for an edge, with the line segment taken from its style.
fn cardinality_for(edge: &Edge) -> String {
    let token = edge
        .attributes
        .text(attr::CARDINALITY)
        .filter(|t| t.len() == 6 && t.is_ascii())
        .unwrap_or(DEFAULT_CARDINALITY);
    let line = if edge.style == Some(EdgeStyle::Dashed) {
        ".."
    } else {
        "--"
    };
    format!("{}{line}{}", &token[..2], &token[4..])
}

/// Attribute row with runs of whitespace collapsed, as the parser stores it.
fn normalize_row(row: &str) -> String {
    row.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

// ─── Statement parsers ───────────────────────────────────────────────────

#[derive(Debug)]
struct Relationship<'a> {
    from: &'a str,
    to: &'a str,
    cardinality: String,
    label: Option<String>,
}

/// `NAME` or `NAME["Alias"]` / `NAME[Alias]`.
fn entity_ref<'a>(input: &mut &'a str) -> ModalResult<(&'a str, Option<String>)> {
    let name = dashed_identifier.parse_next(input)?;
    let alias = opt(delimited(
        '[',
        alt((
            quoted.map(unescape),
            take_while(1.., |c: char| c != ']').map(|s: &str| s.trim().to_string()),
        )),
        ']',
    ))
    .parse_next(input)?;
    skip_space(input);
    Ok((name, alias))
}

/// `A ||--o{ B : label`
fn relationship<'a>(input: &mut &'a str) -> ModalResult<Relationship<'a>> {
    let from = dashed_identifier.parse_next(input)?;
    skip_space(input);
    let token: &str = take_while(6, |c: char| "|o}{-.".contains(c)).parse_next(input)?;
    if !valid_cardinality(token) {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    skip_space(input);
    let to = dashed_identifier.parse_next(input)?;
    skip_space(input);
    ':'.parse_next(input)?;
    skip_space(input);
    let raw = std::mem::take(input).trim();
    let label = if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        unescape(&raw[1..raw.len() - 1])
    } else {
        raw.to_string()
    };
    Ok(Relationship {
        from,
        to,
        cardinality: token.to_string(),
        label: Some(label).filter(|l| !l.is_empty()),
    })
}

fn valid_cardinality(token: &str) -> bool {
    token.len() == 6
        && LEFT_ENDS.contains(&&token[..2])
        && matches!(&token[2..4], "--" | "..")
        && RIGHT_ENDS.contains(&&token[4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHOP: &str = "\
erDiagram
    CUSTOMER {
        string name PK
        string email
    }
    ORDER
    LINE-ITEM[\"Line item\"]
    CUSTOMER ||--o{ ORDER : places
    ORDER ||..|{ LINE-ITEM : \"contains many\"
";

    #[test]
    fn parse_entities_and_relationships() {
        let g = ErAdapter.parse(SHOP).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert_eq!(g.edges.len(), 2);

        let customer = g.get(NodeId::intern("CUSTOMER")).unwrap();
        assert_eq!(
            customer.attributes.list(attr::PROPERTIES),
            ["string name PK", "string email"]
        );
        let item = g.get(NodeId::intern("LINE-ITEM")).unwrap();
        assert_eq!(item.label, "Line item");

        assert_eq!(g.edges[0].label.as_deref(), Some("places"));
        assert_eq!(g.edges[0].style, None);
        assert_eq!(g.edges[1].label.as_deref(), Some("contains many"));
        assert_eq!(g.edges[1].style, Some(EdgeStyle::Dashed));
        assert_eq!(g.edges[1].attributes.text(attr::CARDINALITY), Some("||..|{"));
    }

    #[test]
    fn generate_is_canonical() {
        let g = ErAdapter.parse(SHOP).unwrap();
        assert_eq!(ErAdapter.generate(&g), SHOP);
    }

    #[test]
    fn relationship_creates_entities() {
        let g = ErAdapter.parse("erDiagram\n  A ||--|| B : is\n").unwrap();
        let labels: Vec<_> = g.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn unlabeled_relationship_roundtrips() {
        let g = ErAdapter.parse("erDiagram\n  A ||--|| B : \"\"\n").unwrap();
        assert_eq!(g.edges[0].label, None);
        let text = ErAdapter.generate(&g);
        assert!(text.contains("A ||--|| B : \"\""));
        assert!(ErAdapter.parse(&text).unwrap().structurally_eq(&g));
    }

    #[test]
    fn style_change_rewrites_line_segment() {
        let mut g = ErAdapter.parse("erDiagram\n  A }o--|| B : owns\n").unwrap();
        g.edges[0].style = Some(EdgeStyle::Dashed);
        assert!(ErAdapter.generate(&g).contains("A }o..|| B : owns"));
    }

    #[test]
    fn bad_cardinality_is_a_syntax_error() {
        let err = ErAdapter.parse("erDiagram\n  A <--> B : x\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn unclosed_block_is_reported() {
        let err = ErAdapter.parse("erDiagram\n  A {\n    string x\n").unwrap_err();
        assert!(matches!(err, ParseError::UnclosedBlock { line: 2, .. }));
    }

    #[test]
    fn single_line_empty_block() {
        let g = ErAdapter.parse("erDiagram\n  THING {}\n").unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert!(g.nodes[0].attributes.is_empty());
    }

    #[test]
    fn other_category_yields_empty() {
        let g = ErAdapter.parse("sequenceDiagram\n  A->>B: hi\n").unwrap();
        assert!(g.is_empty());
        assert!(g.edges.is_empty());
    }

    fn entity(value: AttrValue) -> Node {
        let mut node = Node::new(NodeId::intern("THING"), NodeKind::Entity, "THING");
        node.attributes.set(attr::PROPERTIES, value);
        node
    }

    fn rows(rows: &[&str]) -> AttrValue {
        AttrValue::List(rows.iter().map(|r| r.to_string()).collect())
    }

    #[test]
    fn property_rows_must_fit_the_block() {
        assert_eq!(ErAdapter.check_attributes(&entity(rows(&["string name PK"]))), Ok(()));
        for bad in [
            rows(&["}"]),
            rows(&["  "]),
            rows(&["%% hidden"]),
            rows(&["string name\nint age"]),
            rows(&[]),
            AttrValue::Text("string name".into()),
        ] {
            assert!(
                ErAdapter.check_attributes(&entity(bad.clone())).is_err(),
                "{bad:?} should be rejected"
            );
        }

        let mut node = entity(rows(&["int id"]));
        node.attributes.set_text(attr::TECHNOLOGY, "Postgres");
        assert!(ErAdapter.check_attributes(&node).is_err());
    }

    #[test]
    fn canonicalize_matches_reparsed_text() {
        let mut g = ErAdapter.parse(SHOP).unwrap();
        let customer = NodeId::intern("CUSTOMER");
        let item = NodeId::intern("LINE-ITEM");
        let id = g.connect(customer, item, Some("buys".into())).unwrap();
        g.edge_mut(id).unwrap().style = Some(EdgeStyle::Dashed);
        g.get_mut(customer)
            .unwrap()
            .attributes
            .set(attr::PROPERTIES, rows(&["string   name  PK"]));

        ErAdapter.canonicalize(&mut g);
        assert_eq!(
            g.edge(id).unwrap().attributes.text(attr::CARDINALITY),
            Some("||..o{")
        );
        assert_eq!(
            g.get(customer).unwrap().attributes.list(attr::PROPERTIES),
            ["string name PK"]
        );
        let reparsed = ErAdapter.parse(&ErAdapter.generate(&g)).unwrap();
        assert!(reparsed.structurally_eq(&g));
    }
}
