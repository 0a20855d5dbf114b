pub mod engine;
pub mod error;
pub mod types;

pub use engine::FingerprintEngine;
pub use error::{FingerprintError, FingerprintResult};
pub use types::FileFingerprint;
