//! Undo/Redo command stack.
//!
//! Every recorded step stores the full graph before and after, so undo and
//! redo restore positions as well as structure. Drag gestures and other
//! multi-step edits use batching: mutations inside a batch are applied live
//! and recorded as one step when the outermost batch closes.

use crate::config::EditorConfig;
use crate::error::SyncError;
use crate::sync::{Applied, CanvasMutation, SyncController};
use duet_core::DiagramGraph;

/// One undoable step.
#[derive(Debug, Clone)]
pub struct Command {
    pub before: DiagramGraph,
    pub after: DiagramGraph,
    pub description: String,
}

/// Manages undo/redo stacks with batch grouping.
pub struct CommandStack {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    /// Maximum undo depth.
    max_depth: usize,
    /// Batch nesting depth (0 = not batching).
    batch_depth: usize,
    /// Graph captured at the start of the outermost batch.
    batch_snapshot: Option<DiagramGraph>,
    batch_description: String,
}

impl CommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(64)),
            redo_stack: Vec::new(),
            max_depth,
            batch_depth: 0,
            batch_snapshot: None,
            batch_description: String::new(),
        }
    }

    /// Stack bounded by the configured undo depth.
    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.undo_depth)
    }

    /// Start a batch group. Nested calls join the outermost batch.
    pub fn begin_batch(&mut self, controller: &SyncController, description: &str) {
        if self.batch_depth == 0 {
            self.batch_snapshot = Some(controller.graph().clone());
            self.batch_description = description.to_string();
        }
        self.batch_depth += 1;
    }

    /// End a batch group. Closing the outermost batch records one step if
    /// the graph changed.
    pub fn end_batch(&mut self, controller: &SyncController) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth > 0 {
            return;
        }
        if let Some(before) = self.batch_snapshot.take() {
            let description = std::mem::take(&mut self.batch_description);
            self.record(before, controller.graph().clone(), description);
        }
    }

    /// Apply a mutation through the controller and record it.
    pub fn execute(
        &mut self,
        controller: &mut SyncController,
        mutation: CanvasMutation,
        description: &str,
    ) -> Result<Applied, SyncError> {
        if self.batch_depth > 0 {
            return controller.apply_mutation(mutation);
        }
        let before = controller.graph().clone();
        let applied = controller.apply_mutation(mutation)?;
        self.record(before, controller.graph().clone(), description.to_string());
        Ok(applied)
    }

    /// Load text through the controller and record the reload as a step.
    pub fn set_text(
        &mut self,
        controller: &mut SyncController,
        text: &str,
    ) -> Result<(), SyncError> {
        let before = controller.graph().clone();
        controller.set_text(text)?;
        if self.batch_depth == 0 {
            self.record(before, controller.graph().clone(), "edit text".to_string());
        }
        Ok(())
    }

    /// Undo the last step. Returns its description, or `None` when there
    /// is nothing to undo.
    pub fn undo(&mut self, controller: &mut SyncController) -> Result<Option<String>, SyncError> {
        let Some(cmd) = self.undo_stack.last() else {
            return Ok(None);
        };
        controller.restore(cmd.before.clone())?;
        let Some(cmd) = self.undo_stack.pop() else {
            return Ok(None);
        };
        let description = cmd.description.clone();
        self.redo_stack.push(cmd);
        log::debug!("undo: {description}");
        Ok(Some(description))
    }

    /// Redo the last undone step.
    pub fn redo(&mut self, controller: &mut SyncController) -> Result<Option<String>, SyncError> {
        let Some(cmd) = self.redo_stack.last() else {
            return Ok(None);
        };
        controller.restore(cmd.after.clone())?;
        let Some(cmd) = self.redo_stack.pop() else {
            return Ok(None);
        };
        let description = cmd.description.clone();
        self.undo_stack.push(cmd);
        log::debug!("redo: {description}");
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn record(&mut self, before: DiagramGraph, after: DiagramGraph, description: String) {
        if before == after {
            return;
        }
        self.undo_stack.push(Command {
            before,
            after,
            description,
        });
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        // Clear redo stack on new action
        self.redo_stack.clear();
    }
}
