//! Shared node/edge model for every diagram category.
//!
//! A diagram is a flat, ordered list of nodes plus an ordered list of edges.
//! Declaration order is significant: adapters generate text in that order so
//! repeated saves are byte-identical. Containment (boundaries, subgraphs,
//! boxes) is a lookup-only `parent` reference on the child; nodes never own
//! each other.

use crate::category::DiagramCategory;
use crate::id::{EdgeId, NodeId, edge_id};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

// ─── Geometry ────────────────────────────────────────────────────────────

/// Canvas position of a node's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

// ─── Node kinds ──────────────────────────────────────────────────────────

/// Category-agnostic node kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain flowchart step or anything without a dedicated kind.
    #[default]
    Generic,
    /// ER entity (table).
    Entity,
    /// Human actor (C4 person, sequence actor).
    Actor,
    /// Sequence participant box.
    Participant,
    System,
    SystemDb,
    Container,
    ContainerDb,
    Component,
    ComponentDb,
    /// Visual grouping: C4 boundary, flowchart subgraph, sequence box.
    Boundary,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Generic => "generic",
            NodeKind::Entity => "entity",
            NodeKind::Actor => "actor",
            NodeKind::Participant => "participant",
            NodeKind::System => "system",
            NodeKind::SystemDb => "system_db",
            NodeKind::Container => "container",
            NodeKind::ContainerDb => "container_db",
            NodeKind::Component => "component",
            NodeKind::ComponentDb => "component_db",
            NodeKind::Boundary => "boundary",
        }
    }

    /// Whether this kind may be referenced as another node's `parent`.
    pub fn is_grouping(self) -> bool {
        matches!(self, NodeKind::Boundary)
    }
}

// ─── Attributes ──────────────────────────────────────────────────────────

/// Well-known attribute keys.
pub mod attr {
    /// Ordered property rows of an ER entity (`string name PK`).
    pub const PROPERTIES: &str = "properties";
    pub const TECHNOLOGY: &str = "technology";
    pub const DESCRIPTION: &str = "description";
    /// `"true"` on C4 `_Ext` elements.
    pub const EXTERNAL: &str = "external";
    /// Boundary macro flavour (`system`, `container`, `enterprise`).
    pub const BOUNDARY_TYPE: &str = "boundary_type";
    /// Flowchart node shape.
    pub const SHAPE: &str = "shape";
    /// ER relationship cardinality token (`||--o{`).
    pub const CARDINALITY: &str = "cardinality";
    /// Arrow token for sequence messages and open flowchart links.
    pub const ARROW: &str = "arrow";
    /// C4 relationship macro (`Rel_U`, `BiRel`, ...).
    pub const REL_KIND: &str = "rel";
    /// Free-form type line of a C4 boundary or deployment node.
    pub const ELEMENT_TYPE: &str = "type";
    pub const SPRITE: &str = "sprite";
    /// Shape variant within a kind (`queue`).
    pub const VARIANT: &str = "variant";
}

/// A single attribute value: free text or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    List(SmallVec<[String; 4]>),
}

/// Open-ended attribute bag. Keys are kept sorted so iteration is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Text value for `key`, if the key holds text.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// List value for `key`; empty when missing or not a list.
    pub fn list(&self, key: &str) -> &[String] {
        match self.0.get(key) {
            Some(AttrValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.0.insert(key.into(), value);
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), AttrValue::Text(value.into()));
    }

    /// Append to a list attribute, converting a missing key into a new list.
    pub fn push(&mut self, key: &str, item: impl Into<String>) {
        match self.0.get_mut(key) {
            Some(AttrValue::List(items)) => items.push(item.into()),
            _ => {
                let mut items = SmallVec::new();
                items.push(item.into());
                self.0.insert(key.to_string(), AttrValue::List(items));
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builder-style text insert, skipping empty values.
    pub fn with_text(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.set_text(key, v);
        }
        self
    }
}

// ─── Nodes & edges ───────────────────────────────────────────────────────

/// A diagram element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub position: Position,
    pub attributes: Attributes,
    /// Enclosing grouping node. Lookup only, never ownership.
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            label: label.into(),
            position: Position::default(),
            attributes: Attributes::new(),
            parent: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_parent(mut self, parent: Option<NodeId>) -> Self {
        self.parent = parent;
        self
    }
}

/// Visual line style tag for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyle {
    Dashed,
    Thick,
    Animated,
}

/// A relationship between two nodes of the same diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub label: Option<String>,
    pub style: Option<EdgeStyle>,
    pub attributes: Attributes,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            label: None,
            style: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|l| !l.is_empty());
        self
    }

    pub fn with_style(mut self, style: Option<EdgeStyle>) -> Self {
        self.style = style;
        self
    }

    pub fn touches(&self, id: NodeId) -> bool {
        self.source == id || self.target == id
    }

    fn same_relationship(&self, other: &Edge) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.label == other.label
            && self.style == other.style
            && self.attributes == other.attributes
    }
}

// ─── Diagram graph ───────────────────────────────────────────────────────

/// Header information that is not part of any node or edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramMeta {
    /// Header variant: C4 level keyword, flowchart direction, ...
    pub directive: Option<String>,
    pub title: Option<String>,
    /// Statements recognized as diagram text but not modelled.
    pub skipped: Vec<String>,
}

/// The node/edge model of one diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub meta: DiagramMeta,
}

impl DiagramGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    /// Append a node. Returns `false` (and leaves the graph alone) if the id is taken.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if self.contains(node.id) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Fresh node id with a kind prefix, guaranteed unused in this graph.
    pub fn fresh_id(&self, kind: NodeKind) -> NodeId {
        loop {
            let id = NodeId::with_prefix(kind.as_str());
            if !self.contains(id) && self.edge(id).is_none() {
                return id;
            }
        }
    }

    /// Lowest ordinal whose derived edge id is still free for this ordered pair.
    pub fn next_edge_id(&self, source: NodeId, target: NodeId) -> EdgeId {
        let mut ordinal = 0;
        loop {
            let id = edge_id(source, target, ordinal);
            if self.edge(id).is_none() {
                return id;
            }
            ordinal += 1;
        }
    }

    /// Append an edge between two existing nodes. `None` if either endpoint is missing.
    pub fn connect(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: Option<String>,
    ) -> Option<EdgeId> {
        if !self.contains(source) || !self.contains(target) {
            return None;
        }
        let id = self.next_edge_id(source, target);
        self.edges
            .push(Edge::new(id, source, target).with_label(label));
        Some(id)
    }

    /// Remove a node and every edge incident to it.
    /// Returns the removed node and the removed edges.
    pub fn remove_node(&mut self, id: NodeId) -> Option<(Node, Vec<Edge>)> {
        let pos = self.nodes.iter().position(|n| n.id == id)?;
        let node = self.nodes.remove(pos);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            self.edges.drain(..).partition(|e| e.touches(id));
        self.edges = kept;
        Some((node, removed))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let pos = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(pos))
    }

    /// Edges with `id` as source or target, in edge order.
    pub fn edges_touching(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.touches(id))
    }

    /// Nodes whose parent is `parent` (`None` = top level), in declaration order.
    pub fn children(&self, parent: Option<NodeId>) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.parent == parent)
    }

    /// Containment graph: an edge `parent → child` for every parented node.
    pub fn containment(&self) -> DiGraphMap<NodeId, ()> {
        let mut graph = DiGraphMap::new();
        for node in &self.nodes {
            graph.add_node(node.id);
        }
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                graph.add_edge(parent, node.id, ());
            }
        }
        graph
    }

    /// All nodes transitively contained in `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let containment = self.containment();
        if !containment.contains_node(id) {
            return Vec::new();
        }
        let mut dfs = Dfs::new(&containment, id);
        let mut out = Vec::new();
        while let Some(next) = dfs.next(&containment) {
            if next != id {
                out.push(next);
            }
        }
        out
    }

    /// Structural equality: kinds, labels, attributes, containment and edges.
    /// Ignores positions, node order, edge ids and header metadata.
    pub fn structurally_eq(&self, other: &DiagramGraph) -> bool {
        if self.nodes.len() != other.nodes.len() || self.edges.len() != other.edges.len() {
            return false;
        }
        let nodes_match = self.nodes.iter().all(|a| {
            other.get(a.id).is_some_and(|b| {
                a.kind == b.kind
                    && a.label == b.label
                    && a.attributes == b.attributes
                    && a.parent == b.parent
            })
        });
        if !nodes_match {
            return false;
        }
        let mut used = vec![false; other.edges.len()];
        self.edges.iter().all(|a| {
            let hit = other
                .edges
                .iter()
                .enumerate()
                .find(|(i, b)| !used[*i] && a.same_relationship(b));
            match hit {
                Some((i, _)) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }
}

// ─── Document ────────────────────────────────────────────────────────────

/// The unit of synchronization: one open diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramDocument {
    pub category: DiagramCategory,
    pub graph: DiagramGraph,
    pub source_text: String,
}

impl DiagramDocument {
    pub fn new(category: DiagramCategory) -> Self {
        Self {
            category,
            graph: DiagramGraph::new(),
            source_text: String::new(),
        }
    }
}
