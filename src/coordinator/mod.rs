pub mod error;
pub mod orchestrator;
pub mod state_machine;
pub mod types;

pub use error::{ErrorKind, UploadError, UploadResult};
pub use orchestrator::UploadOrchestrator;
pub use state_machine::UploadStateMachine;
pub use types::{UploadReport, UploadRequest, UploadTransition};

pub use crate::session::FailurePhase;
