pub mod adapter;
pub mod category;
pub mod clean;
pub mod error;
pub mod id;
pub mod layout;
pub mod lint;
pub mod model;
pub mod registry;

pub use adapter::{C4Adapter, DiagramAdapter, ErAdapter, FlowchartAdapter, SequenceAdapter};
pub use category::DiagramCategory;
pub use error::ParseError;
pub use id::{EdgeId, NodeId, edge_id};
pub use layout::{GridConfig, GridCursor, place_in_grid};
pub use lint::{LintDiagnostic, LintSeverity, ensure_valid, lint_graph};
pub use model::*;
pub use registry::{AdapterRegistry, adapter, detect_category, registry};
