//! Placement of parsed elements.
//!
//! Diagram text carries no coordinates, so parsed nodes are dropped into a
//! row-wrapping grid in declaration order. Real layout belongs to the canvas.

use crate::model::{DiagramGraph, Position};

/// Grid used when placing freshly parsed nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub columns: usize,
    pub spacing_x: f32,
    pub spacing_y: f32,
    pub origin: Position,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 4,
            spacing_x: 220.0,
            spacing_y: 140.0,
            origin: Position::new(40.0, 40.0),
        }
    }
}

/// Running insertion cursor over a [`GridConfig`].
#[derive(Debug, Clone)]
pub struct GridCursor {
    config: GridConfig,
    placed: usize,
}

impl GridCursor {
    pub fn new(config: GridConfig) -> Self {
        Self { config, placed: 0 }
    }

    /// Position for the next element; advances the cursor.
    pub fn next_position(&mut self) -> Position {
        let columns = self.config.columns.max(1);
        let col = self.placed % columns;
        let row = self.placed / columns;
        self.placed += 1;
        self.config.origin.offset(
            col as f32 * self.config.spacing_x,
            row as f32 * self.config.spacing_y,
        )
    }
}

impl Default for GridCursor {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

/// Assign grid positions to every node, in declaration order.
pub fn place_in_grid(graph: &mut DiagramGraph, config: GridConfig) {
    let mut cursor = GridCursor::new(config);
    for node in &mut graph.nodes {
        node.position = cursor.next_position();
    }
}
