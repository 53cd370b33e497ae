pub mod collab;
pub mod commands;
pub mod config;
pub mod error;
pub mod repair;
pub mod sync;

pub use collab::{
    AdapterValidator, CorrectionRequest, CorrectionResponse, CorrectionService, Persistence,
    SaveRequest, Validator,
};
pub use commands::CommandStack;
pub use config::{EditorConfig, PlacementConfig};
pub use error::{CollaboratorError, FailureCause, SyncError};
pub use repair::{MAX_REPAIR_ATTEMPTS, RepairLoop, RepairState, improve, repair};
pub use sync::{Applied, CanvasMutation, RepairTicket, SyncController};
