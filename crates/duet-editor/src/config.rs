//! Editor configuration.

use duet_core::{DiagramGraph, GridConfig, Position};
use rand::Rng;
use std::time::Duration;

/// Where canvas-added nodes land: offset from the most recently added node,
/// plus random jitter so repeated adds do not stack exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Position of the first node in an empty diagram.
    pub origin: Position,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Upper bound of the random extra offset on each axis.
    pub jitter: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            origin: Position::new(40.0, 40.0),
            offset_x: 60.0,
            offset_y: 40.0,
            jitter: 80.0,
        }
    }
}

impl PlacementConfig {
    /// Position for a new node in `graph`.
    pub fn place(&self, graph: &DiagramGraph, rng: &mut impl Rng) -> Position {
        let Some(anchor) = graph.nodes.last().map(|n| n.position) else {
            return self.origin;
        };
        let jitter = self.jitter.max(0.0);
        anchor.offset(
            self.offset_x + rng.random_range(0.0..=jitter),
            self.offset_y + rng.random_range(0.0..=jitter),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Grid for nodes that arrive through text.
    pub grid: GridConfig,
    pub placement: PlacementConfig,
    /// Pause between repair attempts.
    pub repair_delay: Duration,
    pub undo_depth: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            placement: PlacementConfig::default(),
            repair_delay: Duration::from_millis(500),
            undo_depth: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::{Node, NodeId, NodeKind};

    #[test]
    fn empty_graph_uses_origin() {
        let config = PlacementConfig::default();
        let pos = config.place(&DiagramGraph::new(), &mut rand::rng());
        assert_eq!(pos, config.origin);
    }

    #[test]
    fn placement_stays_in_bounded_region() {
        let config = PlacementConfig::default();
        let mut graph = DiagramGraph::new();
        let mut node = Node::new(NodeId::intern("placement_anchor"), NodeKind::Generic, "a");
        node.position = Position::new(100.0, 100.0);
        graph.insert_node(node);

        let mut rng = rand::rng();
        for _ in 0..50 {
            let pos = config.place(&graph, &mut rng);
            assert!(pos.x >= 160.0 && pos.x <= 160.0 + config.jitter);
            assert!(pos.y >= 140.0 && pos.y <= 140.0 + config.jitter);
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = PlacementConfig {
            jitter: 0.0,
            ..PlacementConfig::default()
        };
        let mut graph = DiagramGraph::new();
        graph.insert_node(Node::new(NodeId::intern("placement_fixed"), NodeKind::Generic, "a"));
        let pos = config.place(&graph, &mut rand::rng());
        assert_eq!(pos, Position::new(60.0, 40.0));
    }
}
