pub mod error;
pub mod store;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use store::SessionStore;
pub use types::{FailurePhase, SessionStatus, UploadSession};
