//! Errors raised by the sync controller and its collaborators.

use duet_core::{DiagramCategory, EdgeId, EdgeStyle, NodeId, NodeKind, ParseError};
use thiserror::Error;

/// Failure of a controller operation. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Malformed but non-empty diagram text.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Text holds no diagram elements; the canvas is kept as it was.
    #[error("could not parse a {0} diagram from the text")]
    NothingParsed(DiagramCategory),

    /// Text parses but the renderer (validator) refuses it.
    #[error("diagram is not renderable: {0}")]
    NotRenderable(String),

    #[error("unknown node `{0}`")]
    UnknownNode(NodeId),

    #[error("unknown edge `{0}`")]
    UnknownEdge(EdgeId),

    #[error("{category} diagrams cannot contain {kind:?} nodes")]
    UnsupportedKind {
        category: DiagramCategory,
        kind: NodeKind,
    },

    #[error("{category} diagrams cannot draw {style:?} lines")]
    UnsupportedStyle {
        category: DiagramCategory,
        style: EdgeStyle,
    },

    /// Edit that breaks a graph invariant or that the category's text
    /// cannot express.
    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    /// A save or repair is in flight.
    #[error("another operation is in progress")]
    Busy,

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Malformed(err.to_string())
    }
}

/// The distinguishing cause shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    NotParseable,
    NotRenderable,
    ServiceUnavailable,
    Rejected,
}

impl SyncError {
    pub fn cause(&self) -> FailureCause {
        match self {
            SyncError::Parse(_) | SyncError::NothingParsed(_) => FailureCause::NotParseable,
            SyncError::NotRenderable(_) => FailureCause::NotRenderable,
            SyncError::Collaborator(CollaboratorError::Rejected(_)) => FailureCause::Rejected,
            SyncError::Collaborator(_) => FailureCause::ServiceUnavailable,
            SyncError::UnknownNode(_)
            | SyncError::UnknownEdge(_)
            | SyncError::UnsupportedKind { .. }
            | SyncError::UnsupportedStyle { .. }
            | SyncError::InvalidEdit(_)
            | SyncError::Busy => FailureCause::Rejected,
        }
    }
}
