pub mod error;
pub mod negotiator;
pub mod types;

pub use error::{PlanError, PlanResult};
pub use negotiator::UploadPlanNegotiator;
pub use types::{UploadPlan, UploadStrategy};
