//! Layered-architecture diagrams in C4 macro syntax.
//!
//! ```text
//! C4Container
//!     title Internet Banking
//!     Person(customer, "Customer", "A bank customer")
//!     System_Boundary(bank, "Internet Banking") {
//!         Container(web, "Web App", "Java", "Delivers the SPA")
//!         ContainerDb(db, "Database", "Oracle")
//!     }
//!     Rel(customer, web, "Uses", "HTTPS")
//! ```
//!
//! One declaration per line. Positional arguments after the alias and label
//! fill per-macro attribute slots; `$name="value"` arguments are kept as
//! `$name` attributes. Boundaries open a `{ ... }` block and become the
//! `parent` of everything declared inside. Relationships may appear before
//! the elements they reference; they are resolved once the whole text is
//! read, and an unknown endpoint is a [`ParseError::DanglingEdge`].

use super::syntax::{body_lines, identifier, quoted, skip_space, title_text};
use super::{
    DiagramAdapter, GroupWriter, INDENT, indent, plain_text, quote, supported_key, unescape,
    write_grouped,
};
use crate::category::DiagramCategory;
use crate::error::ParseError;
use crate::id::NodeId;
use crate::model::{AttrValue, Attributes, DiagramGraph, Edge, Node, NodeKind, attr};
use std::fmt::Write;
use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::take_while;

const KEYWORDS: &[&str] = &[
    "C4Context",
    "C4Container",
    "C4Component",
    "C4Dynamic",
    "C4Deployment",
];

const PERSON_SLOTS: &[&str] = &[attr::DESCRIPTION, attr::SPRITE];
const TECH_SLOTS: &[&str] = &[attr::TECHNOLOGY, attr::DESCRIPTION, attr::SPRITE];
const NODE_SLOTS: &[&str] = &[attr::ELEMENT_TYPE, attr::DESCRIPTION];

/// Element macro: name, kind, `_Ext` flag, shape variant, attribute slots.
struct ElementMacro {
    name: &'static str,
    kind: NodeKind,
    external: bool,
    variant: Option<&'static str>,
    slots: &'static [&'static str],
}

const fn element(
    name: &'static str,
    kind: NodeKind,
    external: bool,
    variant: Option<&'static str>,
    slots: &'static [&'static str],
) -> ElementMacro {
    ElementMacro {
        name,
        kind,
        external,
        variant,
        slots,
    }
}

const QUEUE: Option<&str> = Some("queue");

const ELEMENTS: &[ElementMacro] = &[
    element("Person", NodeKind::Actor, false, None, PERSON_SLOTS),
    element("Person_Ext", NodeKind::Actor, true, None, PERSON_SLOTS),
    element("System", NodeKind::System, false, None, PERSON_SLOTS),
    element("System_Ext", NodeKind::System, true, None, PERSON_SLOTS),
    element("SystemDb", NodeKind::SystemDb, false, None, PERSON_SLOTS),
    element("SystemDb_Ext", NodeKind::SystemDb, true, None, PERSON_SLOTS),
    element("SystemQueue", NodeKind::System, false, QUEUE, PERSON_SLOTS),
    element("SystemQueue_Ext", NodeKind::System, true, QUEUE, PERSON_SLOTS),
    element("Container", NodeKind::Container, false, None, TECH_SLOTS),
    element("Container_Ext", NodeKind::Container, true, None, TECH_SLOTS),
    element("ContainerDb", NodeKind::ContainerDb, false, None, TECH_SLOTS),
    element("ContainerDb_Ext", NodeKind::ContainerDb, true, None, TECH_SLOTS),
    element("ContainerQueue", NodeKind::Container, false, QUEUE, TECH_SLOTS),
    element("ContainerQueue_Ext", NodeKind::Container, true, QUEUE, TECH_SLOTS),
    element("Component", NodeKind::Component, false, None, TECH_SLOTS),
    element("Component_Ext", NodeKind::Component, true, None, TECH_SLOTS),
    element("ComponentDb", NodeKind::ComponentDb, false, None, TECH_SLOTS),
    element("ComponentDb_Ext", NodeKind::ComponentDb, true, None, TECH_SLOTS),
    element("ComponentQueue", NodeKind::Component, false, QUEUE, TECH_SLOTS),
    element("ComponentQueue_Ext", NodeKind::Component, true, QUEUE, TECH_SLOTS),
];

/// Macro name, recorded `boundary_type`, attribute slots.
type BoundaryMacro = (&'static str, Option<&'static str>, &'static [&'static str]);

/// Boundary macros and the `boundary_type` they record (`None` = plain `Boundary`).
const BOUNDARIES: &[BoundaryMacro] = &[
    ("Boundary", None, &[attr::ELEMENT_TYPE]),
    ("Enterprise_Boundary", Some("enterprise"), &[]),
    ("System_Boundary", Some("system"), &[]),
    ("Container_Boundary", Some("container"), &[]),
    ("Deployment_Node", Some("deployment"), NODE_SLOTS),
    ("Node", Some("node"), NODE_SLOTS),
    ("Node_L", Some("node_l"), NODE_SLOTS),
    ("Node_R", Some("node_r"), NODE_SLOTS),
];

const RELATIONS: &[&str] = &[
    "Rel", "BiRel", "Rel_U", "Rel_Up", "Rel_D", "Rel_Down", "Rel_L", "Rel_Left", "Rel_R",
    "Rel_Right", "Rel_Back", "Rel_Neighbor",
];

/// Presentation-only macros: recognized, reported, not modelled.
const PRESENTATION_PREFIXES: &[&str] = &["Update", "Add", "SHOW_", "HIDE_", "LAYOUT_", "Lay_"];
const PRESENTATION_MACROS: &[&str] = &["RelIndex"];

#[derive(Debug, Default, Clone, Copy)]
pub struct C4Adapter;

impl DiagramAdapter for C4Adapter {
    fn category(&self) -> DiagramCategory {
        DiagramCategory::C4
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    fn is_statement(&self, line: &str) -> bool {
        line == "}" || title_text(line).is_some() || looks_like_call(line)
    }

    fn supported_kinds(&self) -> &'static [NodeKind] {
        &[
            NodeKind::Container,
            NodeKind::ContainerDb,
            NodeKind::Component,
            NodeKind::ComponentDb,
            NodeKind::System,
            NodeKind::SystemDb,
            NodeKind::Actor,
            NodeKind::Boundary,
        ]
    }

    /// Static keys only; `$name` arguments are accepted on any node.
    fn supported_attributes(&self, kind: NodeKind) -> &'static [&'static str] {
        match kind {
            NodeKind::Boundary => &[attr::BOUNDARY_TYPE, attr::ELEMENT_TYPE, attr::DESCRIPTION],
            NodeKind::Actor | NodeKind::SystemDb => {
                &[attr::DESCRIPTION, attr::SPRITE, attr::EXTERNAL]
            }
            NodeKind::System => &[attr::DESCRIPTION, attr::SPRITE, attr::EXTERNAL, attr::VARIANT],
            NodeKind::ContainerDb | NodeKind::ComponentDb => &[
                attr::TECHNOLOGY,
                attr::DESCRIPTION,
                attr::SPRITE,
                attr::EXTERNAL,
            ],
            NodeKind::Container | NodeKind::Component => &[
                attr::TECHNOLOGY,
                attr::DESCRIPTION,
                attr::SPRITE,
                attr::EXTERNAL,
                attr::VARIANT,
            ],
            _ => &[],
        }
    }

    fn check_attributes(&self, node: &Node) -> Result<(), String> {
        for (key, value) in node.attributes.iter() {
            let text = plain_text(key, value)?;
            if let Some(name) = key.strip_prefix('$') {
                if identifier.parse(name).is_err() {
                    return Err(format!("`{key}` is not a valid named argument"));
                }
                continue;
            }
            supported_key(self, node, key)?;
            match key {
                attr::EXTERNAL if text != "true" => {
                    return Err("`external` can only be `true`; remove it instead".into());
                }
                attr::VARIANT
                    if !ELEMENTS
                        .iter()
                        .any(|m| m.kind == node.kind && m.variant == Some(text)) =>
                {
                    return Err(format!(
                        "no {} macro has the `{text}` variant",
                        node.kind.as_str()
                    ));
                }
                attr::BOUNDARY_TYPE if !BOUNDARIES.iter().any(|(_, f, _)| *f == Some(text)) => {
                    return Err(format!("unknown boundary type `{text}`"));
                }
                attr::ELEMENT_TYPE | attr::DESCRIPTION if node.kind == NodeKind::Boundary => {
                    let (name, _, slots) = boundary_macro_for(node);
                    if !slots.contains(&key) {
                        return Err(format!("`{name}` has no `{key}` argument"));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_cleaned(&self, cleaned: &str) -> Result<DiagramGraph, ParseError> {
        let mut graph = DiagramGraph::new();
        graph.meta.directive = cleaned
            .split_whitespace()
            .next()
            .map(str::to_string);

        let mut open: Vec<(usize, NodeId)> = Vec::new();
        let mut pending: Vec<PendingRel> = Vec::new();

        for (line_no, line) in body_lines(cleaned) {
            if let Some(title) = title_text(line) {
                graph.meta.title = Some(title.to_string()).filter(|t| !t.is_empty());
                continue;
            }
            if line == "}" {
                open.pop()
                    .ok_or(ParseError::UnexpectedClose { line: line_no })?;
                continue;
            }

            let call = macro_call
                .parse(line)
                .map_err(|_| ParseError::syntax(line_no, format!("malformed statement `{line}`")))?;
            let parent = open.last().map(|(_, id)| *id);

            if let Some(def) = ELEMENTS.iter().find(|m| m.name == call.name) {
                if call.opens_block {
                    return Err(ParseError::syntax(
                        line_no,
                        format!("`{}` cannot open a block", call.name),
                    ));
                }
                let node = build_element(def, &call, line_no)?.with_parent(parent);
                insert_unique(&mut graph, node, line_no)?;
            } else if let Some((name, flavour, slots)) =
                BOUNDARIES.iter().find(|(name, _, _)| *name == call.name)
            {
                if !call.opens_block {
                    return Err(ParseError::syntax(
                        line_no,
                        format!("`{name}` must be followed by `{{`"),
                    ));
                }
                let mut node = build_node(NodeKind::Boundary, slots, &call, line_no)?;
                if let Some(flavour) = flavour {
                    node.attributes.set_text(attr::BOUNDARY_TYPE, *flavour);
                }
                let id = node.id;
                insert_unique(&mut graph, node.with_parent(parent), line_no)?;
                open.push((line_no, id));
            } else if RELATIONS.contains(&call.name) {
                pending.push(PendingRel::new(call, line_no)?);
            } else if is_presentation_macro(call.name) {
                graph.meta.skipped.push(line.to_string());
            } else {
                return Err(ParseError::syntax(
                    line_no,
                    format!("unknown element `{}`", call.name),
                ));
            }
        }

        if let Some((line, id)) = open.pop() {
            return Err(ParseError::UnclosedBlock {
                line,
                id: id.to_string(),
            });
        }

        for rel in pending {
            rel.resolve(&mut graph)?;
        }
        Ok(graph)
    }

    fn generate(&self, graph: &DiagramGraph) -> String {
        let mut out = String::with_capacity(512);
        let directive = graph
            .meta
            .directive
            .clone()
            .unwrap_or_else(|| infer_directive(graph).to_string());
        out.push_str(&directive);
        out.push('\n');
        if let Some(title) = &graph.meta.title {
            let _ = writeln!(out, "{INDENT}title {title}");
        }

        write_grouped(&mut out, graph, 1, &mut C4Writer);

        for edge in &graph.edges {
            indent(&mut out, 1);
            let name = edge.attributes.text(attr::REL_KIND).unwrap_or("Rel");
            let head = [edge.source.as_str(), edge.target.as_str()];
            write_call(
                &mut out,
                name,
                &head,
                edge.label.as_deref().unwrap_or_default(),
                &edge.attributes,
                TECH_SLOTS,
            );
            out.push('\n');
        }
        out
    }
}

struct C4Writer;

impl GroupWriter for C4Writer {
    fn element(&mut self, out: &mut String, _graph: &DiagramGraph, node: &Node, depth: usize) {
        indent(out, depth);
        let def = element_macro_for(node);
        write_call(
            out,
            def.name,
            &[node.id.as_str()],
            &node.label,
            &node.attributes,
            def.slots,
        );
        out.push('\n');
    }

    fn open_group(&mut self, out: &mut String, node: &Node, depth: usize) {
        indent(out, depth);
        let (name, _, slots) = boundary_macro_for(node);
        write_call(
            out,
            name,
            &[node.id.as_str()],
            &node.label,
            &node.attributes,
            slots,
        );
        out.push_str(" {\n");
    }

    fn close_group(&mut self, out: &mut String, _node: &Node, depth: usize) {
        indent(out, depth);
        out.push_str("}\n");
    }
}

/// `Name(head..., "label", slot..., $key="value"...)`, omitting trailing empty slots.
fn write_call(
    out: &mut String,
    name: &str,
    head: &[&str],
    label: &str,
    attributes: &Attributes,
    slots: &[&str],
) {
    out.push_str(name);
    out.push('(');
    for h in head {
        out.push_str(h);
        out.push_str(", ");
    }
    out.push_str(&quote(label));
    let values: Vec<&str> = slots
        .iter()
        .map(|key| attributes.text(key).unwrap_or_default())
        .collect();
    let used = values.iter().rposition(|v| !v.is_empty()).map_or(0, |i| i + 1);
    for value in &values[..used] {
        out.push_str(", ");
        out.push_str(&quote(value));
    }
    for (key, value) in attributes.iter().filter(|(k, _)| k.starts_with('$')) {
        if let AttrValue::Text(v) = value {
            let _ = write!(out, ", {key}={}", quote(v));
        }
    }
    out.push(')');
}

fn boundary_macro_for(node: &Node) -> &'static BoundaryMacro {
    let flavour = node.attributes.text(attr::BOUNDARY_TYPE);
    BOUNDARIES
        .iter()
        .find(|(_, f, _)| *f == flavour)
        .unwrap_or(&BOUNDARIES[0])
}

fn element_macro_for(node: &Node) -> &'static ElementMacro {
    let external = node.attributes.text(attr::EXTERNAL) == Some("true");
    let variant = node.attributes.text(attr::VARIANT);
    let kind = match node.kind {
        NodeKind::Generic | NodeKind::Entity | NodeKind::Boundary => NodeKind::System,
        NodeKind::Participant => NodeKind::Actor,
        other => other,
    };
    ELEMENTS
        .iter()
        .find(|m| m.kind == kind && m.external == external && m.variant == variant)
        .or_else(|| ELEMENTS.iter().find(|m| m.kind == kind && !m.external))
        .unwrap_or(&ELEMENTS[2])
}

/// Most detailed level present: components, then containers, then context.
fn infer_directive(graph: &DiagramGraph) -> &'static str {
    let has = |kinds: &[NodeKind]| graph.nodes.iter().any(|n| kinds.contains(&n.kind));
    if has(&[NodeKind::Component, NodeKind::ComponentDb]) {
        "C4Component"
    } else if has(&[NodeKind::Container, NodeKind::ContainerDb]) {
        "C4Container"
    } else {
        "C4Context"
    }
}

fn is_presentation_macro(name: &str) -> bool {
    PRESENTATION_MACROS.contains(&name) || PRESENTATION_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn insert_unique(graph: &mut DiagramGraph, node: Node, line: usize) -> Result<(), ParseError> {
    let id = node.id;
    if graph.insert_node(node) {
        Ok(())
    } else {
        Err(ParseError::DuplicateNode {
            line,
            id: id.to_string(),
        })
    }
}

fn build_element(def: &ElementMacro, call: &MacroCall<'_>, line: usize) -> Result<Node, ParseError> {
    let mut node = build_node(def.kind, def.slots, call, line)?;
    if def.external {
        node.attributes.set_text(attr::EXTERNAL, "true");
    }
    if let Some(variant) = def.variant {
        node.attributes.set_text(attr::VARIANT, variant);
    }
    Ok(node)
}

/// Alias, label, then one positional argument per slot.
fn build_node(
    kind: NodeKind,
    slots: &[&str],
    call: &MacroCall<'_>,
    line: usize,
) -> Result<Node, ParseError> {
    let Some(alias) = call.args.first().filter(|a| !a.is_empty()) else {
        return Err(ParseError::syntax(line, format!("`{}` needs an alias", call.name)));
    };
    if call.args.len() > 2 + slots.len() {
        return Err(ParseError::syntax(
            line,
            format!(
                "`{}` takes at most {} arguments, found {}",
                call.name,
                2 + slots.len(),
                call.args.len()
            ),
        ));
    }
    let id = NodeId::intern(alias);
    let label = call.args.get(1).cloned().unwrap_or_else(|| alias.clone());
    let mut attributes = Attributes::new();
    for (key, value) in slots.iter().zip(call.args.iter().skip(2)) {
        attributes = attributes.with_text(key, Some(value.as_str()));
    }
    for (key, value) in &call.named {
        attributes.set_text(format!("${key}"), value.clone());
    }
    Ok(Node::new(id, kind, label).with_attributes(attributes))
}

// ─── Relationships ───────────────────────────────────────────────────────

struct PendingRel {
    line: usize,
    name: String,
    source: String,
    target: String,
    label: Option<String>,
    attributes: Attributes,
}

impl PendingRel {
    fn new(call: MacroCall<'_>, line: usize) -> Result<Self, ParseError> {
        if call.args.len() < 2 || call.args[0].is_empty() || call.args[1].is_empty() {
            return Err(ParseError::syntax(
                line,
                format!("`{}` needs a source and a target", call.name),
            ));
        }
        if call.args.len() > 3 + TECH_SLOTS.len() {
            return Err(ParseError::syntax(
                line,
                format!("too many arguments to `{}`", call.name),
            ));
        }
        let mut attributes = Attributes::new();
        if call.name != "Rel" {
            attributes.set_text(attr::REL_KIND, call.name);
        }
        for (key, value) in TECH_SLOTS.iter().zip(call.args.iter().skip(3)) {
            attributes = attributes.with_text(key, Some(value.as_str()));
        }
        for (key, value) in &call.named {
            attributes.set_text(format!("${key}"), value.clone());
        }
        Ok(Self {
            line,
            name: call.name.to_string(),
            source: call.args[0].clone(),
            target: call.args[1].clone(),
            label: call.args.get(2).cloned(),
            attributes,
        })
    }

    fn resolve(self, graph: &mut DiagramGraph) -> Result<(), ParseError> {
        let source = NodeId::intern(&self.source);
        let target = NodeId::intern(&self.target);
        for (end, raw) in [(source, &self.source), (target, &self.target)] {
            if !graph.contains(end) {
                return Err(ParseError::DanglingEdge {
                    line: self.line,
                    edge: format!("{}({}, {})", self.name, self.source, self.target),
                    missing: raw.clone(),
                });
            }
        }
        let id = graph.next_edge_id(source, target);
        let mut edge = Edge::new(id, source, target).with_label(self.label);
        edge.attributes = self.attributes;
        graph.edges.push(edge);
        Ok(())
    }
}

// ─── Statement parsers ───────────────────────────────────────────────────

#[derive(Debug)]
struct MacroCall<'a> {
    name: &'a str,
    args: Vec<String>,
    named: Vec<(String, String)>,
    opens_block: bool,
}

fn looks_like_call(line: &str) -> bool {
    let mut input = line;
    identifier.parse_next(&mut input).is_ok() && input.trim_start().starts_with('(')
}

/// `Name(arg, "quoted arg", $key="value") {`
fn macro_call<'a>(input: &mut &'a str) -> ModalResult<MacroCall<'a>> {
    let name = identifier.parse_next(input)?;
    skip_space(input);
    '('.parse_next(input)?;

    let mut args = Vec::new();
    let mut named = Vec::new();
    loop {
        skip_space(input);
        if input.starts_with(')') {
            break;
        }
        if input.starts_with('$') {
            '$'.parse_next(input)?;
            let key = identifier.parse_next(input)?;
            skip_space(input);
            '='.parse_next(input)?;
            skip_space(input);
            named.push((key.to_string(), argument.parse_next(input)?));
        } else {
            args.push(argument.parse_next(input)?);
        }
        skip_space(input);
        if opt(',').parse_next(input)?.is_none() {
            break;
        }
    }
    ')'.parse_next(input)?;
    skip_space(input);
    let opens_block = opt('{').parse_next(input)?.is_some();
    skip_space(input);

    Ok(MacroCall {
        name,
        args,
        named,
        opens_block,
    })
}

fn argument(input: &mut &str) -> ModalResult<String> {
    alt((
        quoted.map(unescape),
        take_while(0.., |c: char| c != ',' && c != ')').map(|s: &str| s.trim().to_string()),
    ))
    .parse_next(input)
}
