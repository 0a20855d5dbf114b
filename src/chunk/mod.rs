pub mod batcher;
pub mod error;
pub mod partition;
pub mod reader;
pub mod types;
pub mod worker;

pub use batcher::{BatchRange, ChunkUrlBatcher, DEFAULT_URL_BATCH_SIZE};
pub use error::{ChunkError, ChunkResult};
pub use reader::ChunkReader;
pub use types::{ChunkDescriptor, ChunkOutcome, ChunkStatus};
pub use worker::ChunkTransferWorker;
