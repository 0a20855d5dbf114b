//! Upload metrics
//!
//! Prometheus-compatible counters and histograms for upload sessions:
//! - Session outcomes (started, completed, failed by error kind, cancelled)
//! - Chunk activity (successes, retries, URL reissues, bytes)
//! - Chunk and session durations

pub mod exporter;
pub mod recorder;

pub use exporter::{render_metrics, start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::{init_metrics, ChunkTimer, SessionMetrics};
