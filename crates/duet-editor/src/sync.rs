//! Bidirectional sync controller: canvas ↔ diagram text.
//!
//! The controller owns the authoritative node/edge graph of one open
//! diagram together with its text form:
//!
//! - **Canvas → Text**: every [`CanvasMutation`] is validated against the
//!   category adapter, applied to the graph, and the text is regenerated in
//!   full. After a successful mutation `text == adapter.generate(graph)`.
//!
//! - **Text → Canvas**: loading text re-parses it with the category adapter
//!   and replaces the graph wholesale. Positions of nodes whose id survives
//!   the reload are carried over so the canvas does not jump.
//!
//! Saves and repairs are the only long-running operations; while one is in
//! flight the controller reports itself busy and refuses further edits.

use crate::collab::{Persistence, SaveRequest};
use crate::config::EditorConfig;
use crate::error::SyncError;
use duet_core::{
    Attributes, AttrValue, DiagramAdapter, DiagramCategory, DiagramDocument, DiagramGraph, EdgeId,
    EdgeStyle, Node, NodeId, NodeKind, Position, registry,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// A user action on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasMutation {
    /// Add a node. `kind` defaults to the category's primary kind; `label`
    /// defaults to the generated id.
    AddNode {
        kind: Option<NodeKind>,
        label: Option<String>,
        parent: Option<NodeId>,
    },
    MoveNode {
        id: NodeId,
        dx: f32,
        dy: f32,
    },
    SetPosition {
        id: NodeId,
        position: Position,
    },
    RelabelNode {
        id: NodeId,
        label: String,
    },
    SetAttribute {
        id: NodeId,
        key: String,
        value: AttrValue,
    },
    RemoveAttribute {
        id: NodeId,
        key: String,
    },
    /// Move a node into (or out of, with `None`) a grouping node.
    SetParent {
        id: NodeId,
        parent: Option<NodeId>,
    },
    /// Delete a node and its incident edges. Children of a deleted grouping
    /// node move up to the deleted node's own parent.
    DeleteNode {
        id: NodeId,
    },
    Connect {
        source: NodeId,
        target: NodeId,
        label: Option<String>,
    },
    RemoveEdge {
        id: EdgeId,
    },
    RelabelEdge {
        id: EdgeId,
        label: Option<String>,
    },
    SetEdgeStyle {
        id: EdgeId,
        style: Option<EdgeStyle>,
    },
}

/// What a successful mutation created, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Node(NodeId),
    Edge(EdgeId),
    Updated,
}

/// Snapshot handed to a repair run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairTicket {
    pub category: DiagramCategory,
    pub text: String,
    pub error: Option<String>,
}

/// Holds one diagram's graph and text and keeps them in sync.
pub struct SyncController {
    category: DiagramCategory,
    graph: DiagramGraph,
    text: String,
    config: EditorConfig,

    /// Set while a save is in flight.
    is_syncing: bool,
    /// Set while a repair or improve run is in flight.
    is_fixing: bool,

    /// Most recent parse or render failure, cleared by the next good state.
    last_error: Option<String>,

    rng: StdRng,
}

impl SyncController {
    /// Create a controller with an empty diagram.
    pub fn new(category: DiagramCategory, config: EditorConfig) -> Self {
        let graph = DiagramGraph::new();
        let text = registry().get(category).generate(&graph);
        Self {
            category,
            graph,
            text,
            config,
            is_syncing: false,
            is_fixing: false,
            last_error: None,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Create a controller from existing diagram text.
    pub fn from_text(
        category: DiagramCategory,
        text: &str,
        config: EditorConfig,
    ) -> Result<Self, SyncError> {
        let mut controller = Self::new(category, config);
        controller.reload(text)?;
        Ok(controller)
    }

    fn adapter(&self) -> &'static dyn DiagramAdapter {
        registry().get(self.category)
    }

    // ─── Canvas → Text direction ─────────────────────────────────────────

    /// Validate and apply a canvas mutation, then regenerate the text.
    /// On error nothing changes.
    ///
    /// Every edit that touches the text is checked end to end: the
    /// regenerated text must parse back into the edited diagram, otherwise
    /// the edit is rolled back with [`SyncError::InvalidEdit`].
    pub fn apply_mutation(&mut self, mutation: CanvasMutation) -> Result<Applied, SyncError> {
        self.ensure_idle()?;
        let before = mutation.changes_text().then(|| self.graph.clone());
        let applied = self.apply(mutation)?;
        let text = match before {
            Some(before) => match self.settle() {
                Ok(text) => text,
                Err(err) => {
                    log::debug!("rolled back {} edit: {err}", self.category);
                    self.graph = before;
                    return Err(err);
                }
            },
            None => self.adapter().generate(&self.graph),
        };
        self.text = text;
        self.last_error = None;
        Ok(applied)
    }

    fn apply(&mut self, mutation: CanvasMutation) -> Result<Applied, SyncError> {
        let applied = match mutation {
            CanvasMutation::AddNode {
                kind,
                label,
                parent,
            } => {
                let kind = match kind {
                    Some(kind) => kind,
                    None => self.default_kind()?,
                };
                self.check_kind(kind)?;
                if let Some(parent) = parent {
                    self.check_nesting(kind, parent)?;
                }
                let label = match label {
                    Some(label) => Some(clean_label(&label)?.to_string()),
                    None => None,
                };
                let id = self.adapter().fresh_id(&self.graph, kind);
                let position = self.config.placement.place(&self.graph, &mut self.rng);
                let label = label
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| id.as_str().to_string());
                let mut node = Node::new(id, kind, label).with_parent(parent);
                node.position = position;
                self.graph.insert_node(node);
                log::debug!("added {kind:?} node {id}");
                Applied::Node(id)
            }
            CanvasMutation::MoveNode { id, dx, dy } => {
                let node = self.node_mut(id)?;
                node.position = node.position.offset(dx, dy);
                Applied::Updated
            }
            CanvasMutation::SetPosition { id, position } => {
                self.node_mut(id)?.position = position;
                Applied::Updated
            }
            CanvasMutation::RelabelNode { id, label } => {
                let label = clean_label(&label)?;
                if label.is_empty() {
                    return Err(SyncError::InvalidEdit(format!("node `{id}` needs a label")));
                }
                self.node_mut(id)?.label = label.to_string();
                Applied::Updated
            }
            CanvasMutation::SetAttribute { id, key, value } => {
                let mut node = self.node(id)?.clone();
                node.attributes.set(key, value);
                self.replace_checked(node)?;
                Applied::Updated
            }
            CanvasMutation::RemoveAttribute { id, key } => {
                let mut node = self.node(id)?.clone();
                node.attributes.remove(&key);
                self.replace_checked(node)?;
                Applied::Updated
            }
            CanvasMutation::SetParent { id, parent } => {
                let kind = self.node(id)?.kind;
                if let Some(parent) = parent {
                    self.check_nesting(kind, parent)?;
                    if parent == id || self.graph.descendants(id).contains(&parent) {
                        return Err(SyncError::InvalidEdit(format!(
                            "`{parent}` is inside `{id}`; containment cannot be cyclic"
                        )));
                    }
                }
                self.node_mut(id)?.parent = parent;
                Applied::Updated
            }
            CanvasMutation::DeleteNode { id } => {
                let parent = self.node(id)?.parent;
                for child in self.graph.nodes.iter_mut().filter(|n| n.parent == Some(id)) {
                    child.parent = parent;
                }
                if let Some((node, edges)) = self.graph.remove_node(id) {
                    log::debug!(
                        "deleted node {} with {} incident edge(s)",
                        node.id,
                        edges.len()
                    );
                }
                Applied::Updated
            }
            CanvasMutation::Connect {
                source,
                target,
                label,
            } => {
                for end in [source, target] {
                    let kind = self.node(end)?.kind;
                    if !self.adapter().can_connect(kind) {
                        return Err(SyncError::InvalidEdit(format!(
                            "{} `{end}` cannot be connected in a {} diagram",
                            kind.as_str(),
                            self.category
                        )));
                    }
                }
                let label = edge_label(label)?;
                let id = self
                    .graph
                    .connect(source, target, label)
                    .ok_or(SyncError::UnknownNode(target))?;
                Applied::Edge(id)
            }
            CanvasMutation::RemoveEdge { id } => {
                self.graph
                    .remove_edge(id)
                    .ok_or(SyncError::UnknownEdge(id))?;
                Applied::Updated
            }
            CanvasMutation::RelabelEdge { id, label } => {
                let label = edge_label(label)?;
                let edge = self.graph.edge_mut(id).ok_or(SyncError::UnknownEdge(id))?;
                edge.label = label;
                Applied::Updated
            }
            CanvasMutation::SetEdgeStyle { id, style } => {
                if let Some(style) = style
                    && !self.adapter().supported_edge_styles().contains(&style)
                {
                    return Err(SyncError::UnsupportedStyle {
                        category: self.category,
                        style,
                    });
                }
                let edge = self.graph.edge_mut(id).ok_or(SyncError::UnknownEdge(id))?;
                edge.style = style;
                Applied::Updated
            }
        };
        Ok(applied)
    }

    /// Canonicalize the edited graph and render it, confirming the text
    /// parses back into the same diagram.
    fn settle(&mut self) -> Result<String, SyncError> {
        let adapter = self.adapter();
        adapter.canonicalize(&mut self.graph);
        let text = adapter.generate(&self.graph);
        let reparsed = adapter.parse(&text).map_err(|err| {
            SyncError::InvalidEdit(format!(
                "edit would produce invalid {} text: {err}",
                self.category
            ))
        })?;
        if !reparsed.structurally_eq(&self.graph) {
            return Err(SyncError::InvalidEdit(format!(
                "{} text cannot express this edit",
                self.category
            )));
        }
        Ok(text)
    }

    /// Add a node of `kind` at the next placement position.
    pub fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, SyncError> {
        match self.apply_mutation(CanvasMutation::AddNode {
            kind: Some(kind),
            label: None,
            parent: None,
        })? {
            Applied::Node(id) => Ok(id),
            other => Err(SyncError::InvalidEdit(format!("add produced {other:?}"))),
        }
    }

    pub fn delete_node(&mut self, id: NodeId) -> Result<(), SyncError> {
        self.apply_mutation(CanvasMutation::DeleteNode { id })
            .map(|_| ())
    }

    pub fn connect(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: Option<String>,
    ) -> Result<EdgeId, SyncError> {
        match self.apply_mutation(CanvasMutation::Connect {
            source,
            target,
            label,
        })? {
            Applied::Edge(id) => Ok(id),
            other => Err(SyncError::InvalidEdit(format!("connect produced {other:?}"))),
        }
    }

    /// Re-emit the text from the current graph.
    pub fn regenerate_text(&mut self) {
        self.text = self.adapter().generate(&self.graph);
    }

    /// Replace the graph wholesale (undo/redo) and regenerate the text.
    pub fn restore(&mut self, graph: DiagramGraph) -> Result<(), SyncError> {
        self.ensure_idle()?;
        self.graph = graph;
        self.regenerate_text();
        self.last_error = None;
        Ok(())
    }

    // ─── Text → Canvas direction ─────────────────────────────────────────

    /// Replace the diagram from text (opening an artifact, a chat reply).
    ///
    /// Text holding no diagram elements leaves everything as it was and
    /// returns [`SyncError::NothingParsed`]. Malformed text does the same
    /// with [`SyncError::Parse`].
    pub fn load_from_text(&mut self, text: &str) -> Result<(), SyncError> {
        self.ensure_idle()?;
        self.reload(text)
    }

    /// Apply a text-editor edit.
    ///
    /// Like [`load_from_text`](Self::load_from_text), but the typed text is
    /// kept even when it does not parse: the canvas stays on the last good
    /// graph, the error is recorded, and a later repair works on what the
    /// user actually typed.
    pub fn set_text(&mut self, text: &str) -> Result<(), SyncError> {
        self.ensure_idle()?;
        let result = self.reload(text);
        if result.is_err() {
            self.text = text.to_string();
        }
        result
    }

    fn reload(&mut self, text: &str) -> Result<(), SyncError> {
        self.is_syncing = true;
        let parsed = self.adapter().parse_with(text, self.config.grid);
        self.is_syncing = false;

        let mut graph = match parsed {
            Ok(graph) if graph.is_empty() => {
                let err = SyncError::NothingParsed(self.category);
                log::warn!("{err}");
                self.last_error = Some(err.to_string());
                return Err(err);
            }
            Ok(graph) => graph,
            Err(err) => {
                log::warn!("{} text rejected: {err}", self.category);
                self.last_error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let previous: HashMap<NodeId, Position> = self
            .graph
            .nodes
            .iter()
            .map(|n| (n.id, n.position))
            .collect();
        for node in &mut graph.nodes {
            if let Some(position) = previous.get(&node.id) {
                node.position = *position;
            }
        }

        log::info!(
            "loaded {} diagram: {} node(s), {} edge(s)",
            self.category,
            graph.nodes.len(),
            graph.edges.len()
        );
        self.graph = graph;
        self.text = text.to_string();
        self.last_error = None;
        Ok(())
    }

    // ─── Repair hand-off ─────────────────────────────────────────────────

    /// Enter the fixing state and hand out the text and error to repair.
    pub fn begin_repair(&mut self) -> Result<RepairTicket, SyncError> {
        self.ensure_idle()?;
        self.is_fixing = true;
        Ok(RepairTicket {
            category: self.category,
            text: self.text.clone(),
            error: self.last_error.clone(),
        })
    }

    /// Adopt a repaired candidate. Only valid between
    /// [`begin_repair`](Self::begin_repair) and [`end_repair`](Self::end_repair).
    pub fn adopt_candidate(&mut self, text: &str) -> Result<(), SyncError> {
        if !self.is_fixing {
            return Err(SyncError::InvalidEdit("no repair in progress".into()));
        }
        self.reload(text)
    }

    /// Leave the fixing state. `error` replaces the recorded error when the
    /// repair gave up.
    pub fn end_repair(&mut self, error: Option<String>) {
        self.is_fixing = false;
        if error.is_some() {
            self.last_error = error;
        }
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Persist the diagram under `artifact_id`. The saved content is
    /// generated from the canvas, so the canvas wins over unparsed typed
    /// text; the controller's text switches to it only once the save
    /// succeeded.
    pub async fn save(
        &mut self,
        persistence: &impl Persistence,
        artifact_id: &str,
    ) -> Result<(), SyncError> {
        self.ensure_idle()?;
        let content = self.adapter().generate(&self.graph);
        self.is_syncing = true;
        let request = SaveRequest {
            artifact_id: artifact_id.to_string(),
            content: content.clone(),
        };
        let result = persistence.save(request).await;
        self.is_syncing = false;
        match result {
            Ok(()) => {
                log::info!("saved {} diagram to {artifact_id}", self.category);
                self.text = content;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                log::warn!("save of {artifact_id} failed: {err}");
                Err(err.into())
            }
        }
    }

    /// File name and content for a download of the current text.
    pub fn export(&self, stem: &str) -> (String, String) {
        let stem = if stem.trim().is_empty() {
            self.category.as_str()
        } else {
            stem.trim()
        };
        (
            format!("{stem}.{}", self.adapter().file_extension()),
            self.text.clone(),
        )
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn category(&self) -> DiagramCategory {
        self.category
    }

    pub fn graph(&self) -> &DiagramGraph {
        &self.graph
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document(&self) -> DiagramDocument {
        DiagramDocument {
            category: self.category,
            graph: self.graph.clone(),
            source_text: self.text.clone(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing
    }

    pub fn is_fixing(&self) -> bool {
        self.is_fixing
    }

    pub fn is_busy(&self) -> bool {
        self.is_syncing || self.is_fixing
    }

    /// Parent of `id`, `None` for top-level or unknown nodes.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.graph.get(id).and_then(|n| n.parent)
    }

    /// Attributes of `id`, if the node exists.
    pub fn attributes_of(&self, id: NodeId) -> Option<&Attributes> {
        self.graph.get(id).map(|n| &n.attributes)
    }

    // ─── Validation helpers ──────────────────────────────────────────────

    fn ensure_idle(&self) -> Result<(), SyncError> {
        if self.is_busy() {
            return Err(SyncError::Busy);
        }
        Ok(())
    }

    fn default_kind(&self) -> Result<NodeKind, SyncError> {
        self.adapter()
            .supported_kinds()
            .first()
            .copied()
            .ok_or(SyncError::UnsupportedKind {
                category: self.category,
                kind: NodeKind::Generic,
            })
    }

    fn check_kind(&self, kind: NodeKind) -> Result<(), SyncError> {
        if !self.adapter().supports_kind(kind) {
            return Err(SyncError::UnsupportedKind {
                category: self.category,
                kind,
            });
        }
        Ok(())
    }

    /// Can a node of `kind` be placed inside `parent`?
    fn check_nesting(&self, kind: NodeKind, parent: NodeId) -> Result<(), SyncError> {
        self.check_container(parent)?;
        if kind.is_grouping() && !self.adapter().allows_nested_groups() {
            return Err(SyncError::InvalidEdit(format!(
                "groups cannot be nested in a {} diagram",
                self.category
            )));
        }
        Ok(())
    }

    /// Swap in an edited copy of a node once its attributes pass the
    /// adapter's checks.
    fn replace_checked(&mut self, node: Node) -> Result<(), SyncError> {
        self.adapter()
            .check_attributes(&node)
            .map_err(SyncError::InvalidEdit)?;
        let id = node.id;
        *self.node_mut(id)? = node;
        Ok(())
    }

    fn check_container(&self, id: NodeId) -> Result<(), SyncError> {
        if !self.node(id)?.kind.is_grouping() {
            return Err(SyncError::InvalidEdit(format!(
                "`{id}` is not a grouping node"
            )));
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> Result<&Node, SyncError> {
        self.graph.get(id).ok_or(SyncError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SyncError> {
        self.graph.get_mut(id).ok_or(SyncError::UnknownNode(id))
    }
}

impl CanvasMutation {
    /// Moves only change positions, which the text does not carry.
    fn changes_text(&self) -> bool {
        !matches!(
            self,
            CanvasMutation::MoveNode { .. } | CanvasMutation::SetPosition { .. }
        )
    }
}

/// Labels are written on a single line; surrounding whitespace is dropped.
fn clean_label(label: &str) -> Result<&str, SyncError> {
    if label.chars().any(char::is_control) {
        return Err(SyncError::InvalidEdit(format!(
            "label {label:?} must fit on one line"
        )));
    }
    Ok(label.trim())
}

fn edge_label(label: Option<String>) -> Result<Option<String>, SyncError> {
    Ok(match label {
        Some(label) => Some(clean_label(&label)?.to_string()).filter(|l| !l.is_empty()),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::attr;
    use pretty_assertions::assert_eq;

    const ORDERS: &str = "\
erDiagram
    CUSTOMER
    ORDER
    CUSTOMER ||--o{ ORDER : places
";

    fn controller(category: DiagramCategory, text: &str) -> SyncController {
        SyncController::from_text(category, text, EditorConfig::default()).unwrap()
    }

    #[test]
    fn sync_text_to_canvas() {
        let c = controller(DiagramCategory::Er, ORDERS);
        assert_eq!(c.graph().nodes.len(), 2);
        assert_eq!(c.graph().edges.len(), 1);
        assert_eq!(c.text(), ORDERS);
        assert_eq!(c.last_error(), None);
    }

    #[test]
    fn sync_canvas_to_text() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let id = c.add_node(NodeKind::Entity).unwrap();
        assert!(c.text().contains(id.as_str()));
        assert_eq!(
            c.text(),
            registry().get(DiagramCategory::Er).generate(c.graph())
        );
    }

    #[test]
    fn add_node_uses_primary_kind_and_placement() {
        let mut c = SyncController::new(DiagramCategory::C4, EditorConfig::default());
        let Applied::Node(id) = c
            .apply_mutation(CanvasMutation::AddNode {
                kind: None,
                label: Some("Billing".into()),
                parent: None,
            })
            .unwrap()
        else {
            panic!("expected a node");
        };
        let node = c.graph().get(id).unwrap();
        assert_eq!(node.kind, NodeKind::Container);
        assert_eq!(node.position, c.config().placement.origin);
        assert!(c.text().contains(&format!("Container({id}, \"Billing\")")));
    }

    #[test]
    fn unsupported_kind_is_rejected_without_change() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let before = c.graph().clone();
        let err = c.add_node(NodeKind::Actor).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedKind { .. }));
        assert_eq!(c.graph(), &before);
        assert_eq!(c.text(), ORDERS);
    }

    #[test]
    fn unsupported_style_is_rejected() {
        let mut c = controller(
            DiagramCategory::C4,
            "C4Context\n    System(a, \"A\")\n    System(b, \"B\")\n    Rel(a, b, \"uses\")\n",
        );
        let edge = c.graph().edges[0].id;
        let err = c
            .apply_mutation(CanvasMutation::SetEdgeStyle {
                id: edge,
                style: Some(EdgeStyle::Dashed),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedStyle { .. }));
    }

    #[test]
    fn dashed_er_edge_changes_cardinality_line() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let edge = c.graph().edges[0].id;
        c.apply_mutation(CanvasMutation::SetEdgeStyle {
            id: edge,
            style: Some(EdgeStyle::Dashed),
        })
        .unwrap();
        assert!(c.text().contains("CUSTOMER ||..o{ ORDER : places"));
    }

    #[test]
    fn delete_node_removes_incident_edges() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        c.delete_node(NodeId::intern("ORDER")).unwrap();
        assert_eq!(c.graph().nodes.len(), 1);
        assert!(c.graph().edges.is_empty());
        assert_eq!(c.text(), "erDiagram\n    CUSTOMER\n");
    }

    #[test]
    fn deleting_a_boundary_lifts_its_children() {
        let text = "\
C4Container
    Enterprise_Boundary(corp, \"Corp\") {
        System_Boundary(shop, \"Shop\") {
            Container(web, \"Web\")
        }
    }
";
        let mut c = controller(DiagramCategory::C4, text);
        c.delete_node(NodeId::intern("shop")).unwrap();
        assert_eq!(c.parent_of(NodeId::intern("web")), Some(NodeId::intern("corp")));
        assert!(c.graph().get(NodeId::intern("shop")).is_none());
    }

    #[test]
    fn set_parent_rejects_cycles_and_non_groups() {
        let text = "\
C4Container
    System_Boundary(outer, \"Outer\") {
        Container_Boundary(inner, \"Inner\") {
            Container(api, \"API\")
        }
    }
";
        let mut c = controller(DiagramCategory::C4, text);
        let outer = NodeId::intern("outer");
        let inner = NodeId::intern("inner");
        let api = NodeId::intern("api");

        let err = c
            .apply_mutation(CanvasMutation::SetParent {
                id: outer,
                parent: Some(inner),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidEdit(_)));

        let err = c
            .apply_mutation(CanvasMutation::SetParent {
                id: inner,
                parent: Some(api),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidEdit(_)));

        c.apply_mutation(CanvasMutation::SetParent {
            id: api,
            parent: Some(outer),
        })
        .unwrap();
        assert_eq!(c.parent_of(api), Some(outer));
    }

    #[test]
    fn connect_unknown_endpoint_fails() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let err = c
            .connect(NodeId::intern("CUSTOMER"), NodeId::intern("NOBODY"), None)
            .unwrap_err();
        assert_eq!(err, SyncError::UnknownNode(NodeId::intern("NOBODY")));
        assert_eq!(c.graph().edges.len(), 1);
    }

    #[test]
    fn move_changes_position_but_not_text() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let id = NodeId::intern("CUSTOMER");
        let before = c.graph().get(id).unwrap().position;
        c.apply_mutation(CanvasMutation::MoveNode { id, dx: 15.0, dy: -5.0 })
            .unwrap();
        assert_eq!(c.graph().get(id).unwrap().position, before.offset(15.0, -5.0));
        assert_eq!(c.text(), ORDERS);
    }

    #[test]
    fn reload_keeps_positions_of_surviving_nodes() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let customer = NodeId::intern("CUSTOMER");
        c.apply_mutation(CanvasMutation::SetPosition {
            id: customer,
            position: Position::new(500.0, 300.0),
        })
        .unwrap();
        c.load_from_text("erDiagram\n    ORDER }|--|| CUSTOMER : \"belongs to\"\n")
            .unwrap();
        assert_eq!(
            c.graph().get(customer).unwrap().position,
            Position::new(500.0, 300.0)
        );
    }

    #[test]
    fn empty_text_leaves_state_alone() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let err = c.load_from_text("I could not draw that.").unwrap_err();
        assert_eq!(err, SyncError::NothingParsed(DiagramCategory::Er));
        assert_eq!(c.graph().nodes.len(), 2);
        assert_eq!(c.text(), ORDERS);
        assert!(c.last_error().is_some());
    }

    #[test]
    fn broken_typed_text_is_kept_for_repair() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let broken = "erDiagram\n    CUSTOMER {\n        string name\n";
        let err = c.set_text(broken).unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
        assert_eq!(c.text(), broken);
        assert_eq!(c.graph().nodes.len(), 2, "canvas keeps the last good graph");
        assert!(c.last_error().unwrap().contains("never closed"));
    }

    #[test]
    fn busy_controller_refuses_edits() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        c.begin_repair().unwrap();
        assert!(c.is_busy());
        assert_eq!(c.add_node(NodeKind::Entity).unwrap_err(), SyncError::Busy);
        assert_eq!(c.load_from_text(ORDERS).unwrap_err(), SyncError::Busy);
        assert_eq!(c.begin_repair().unwrap_err(), SyncError::Busy);
        c.end_repair(None);
        assert!(!c.is_busy());
        assert!(c.add_node(NodeKind::Entity).is_ok());
    }

    #[test]
    fn adopt_requires_a_repair() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        assert!(matches!(
            c.adopt_candidate(ORDERS).unwrap_err(),
            SyncError::InvalidEdit(_)
        ));
    }

    #[test]
    fn attributes_flow_into_text() {
        let mut c = controller(
            DiagramCategory::C4,
            "C4Container\n    Container(api, \"API\")\n",
        );
        let api = NodeId::intern("api");
        c.apply_mutation(CanvasMutation::SetAttribute {
            id: api,
            key: attr::TECHNOLOGY.into(),
            value: AttrValue::Text("Rust".into()),
        })
        .unwrap();
        assert_eq!(
            c.text(),
            "C4Container\n    Container(api, \"API\", \"Rust\")\n"
        );
        assert_eq!(
            c.attributes_of(api).and_then(|a| a.text(attr::TECHNOLOGY)),
            Some("Rust")
        );
    }

    #[test]
    fn export_names_the_file() {
        let c = controller(DiagramCategory::Er, ORDERS);
        let (name, content) = c.export("orders");
        assert_eq!(name, "orders.mmd");
        assert_eq!(content, ORDERS);
        assert_eq!(c.export("  ").0, "erd.mmd");
    }

    #[test]
    fn labels_must_fit_on_one_line() {
        assert_eq!(clean_label("  Billing ").unwrap(), "Billing");
        assert!(matches!(
            clean_label("Alice\nSmith"),
            Err(SyncError::InvalidEdit(_))
        ));
        assert_eq!(edge_label(Some("   ".into())).unwrap(), None);
    }

    #[test]
    fn edit_the_text_cannot_hold_is_rolled_back() {
        let text = "flowchart TD\n    a[\"A\"] --> b\n";
        let mut c = controller(DiagramCategory::Flowchart, text);
        let before = c.document();
        let err = c
            .apply_mutation(CanvasMutation::RelabelNode {
                id: NodeId::intern("a"),
                label: "say #quot;hi#quot;".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidEdit(_)));
        assert_eq!(c.graph(), &before.graph);
        assert_eq!(c.text(), before.source_text);
    }

    #[test]
    fn connected_er_edge_records_its_cardinality() {
        let mut c = controller(DiagramCategory::Er, ORDERS);
        let line = c.add_node(NodeKind::Entity).unwrap();
        let edge = c
            .connect(NodeId::intern("ORDER"), line, Some("contains".into()))
            .unwrap();
        assert_eq!(
            c.graph().edge(edge).and_then(|e| e.attributes.text(attr::CARDINALITY)),
            Some("||--o{")
        );
    }
}
