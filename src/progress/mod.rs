pub mod aggregator;
pub mod events;

pub use aggregator::{ProgressAggregator, ProgressMode};
pub use events::{EventBus, TerminalReport, UploadEvent};
