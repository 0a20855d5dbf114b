//! Metrics recorder for upload sessions

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "upload_sessions_started_total",
        "Upload sessions that began transferring"
    );
    describe_counter!(
        "upload_sessions_completed_total",
        "Upload sessions finalized by the control plane"
    );
    describe_counter!(
        "upload_sessions_failed_total",
        "Upload sessions that ended FAILED, by error kind"
    );
    describe_counter!(
        "upload_sessions_cancelled_total",
        "Upload sessions cancelled by the caller"
    );

    describe_counter!(
        "upload_chunks_succeeded_total",
        "Chunks stored and acknowledged by the control plane"
    );
    describe_counter!(
        "upload_chunk_retries_total",
        "Failed chunk attempts that were retried"
    );
    describe_counter!(
        "upload_url_reissues_total",
        "Signed chunk URLs reissued after repeated failures"
    );
    describe_counter!("upload_bytes_total", "Confirmed uploaded bytes");

    describe_histogram!(
        "upload_chunk_duration_seconds",
        "Time of one successful object-store PUT"
    );
    describe_histogram!(
        "upload_session_duration_seconds",
        "Wall time from session start to a terminal status"
    );
}

// ============== Chunk Operations ==============

/// A part the session accepted as SUCCEEDED for the first time
pub fn record_chunk_confirmed(bytes: u64) {
    counter!("upload_chunks_succeeded_total").increment(1);
    record_bytes_confirmed(bytes);
}

pub fn record_bytes_confirmed(bytes: u64) {
    counter!("upload_bytes_total").increment(bytes);
}

pub fn record_chunk_retry() {
    counter!("upload_chunk_retries_total").increment(1);
}

pub fn record_url_reissue() {
    counter!("upload_url_reissues_total").increment(1);
}

pub fn record_chunk_duration(duration: Duration) {
    histogram!("upload_chunk_duration_seconds").record(duration.as_secs_f64());
}

// ============== Session Operations ==============

pub fn record_session_started(operation: &str) {
    counter!("upload_sessions_started_total", "operation" => operation.to_string()).increment(1);
    gauge!("upload_active_sessions").increment(1.0);
}

fn record_session_finished(duration: Duration) {
    gauge!("upload_active_sessions").decrement(1.0);
    histogram!("upload_session_duration_seconds").record(duration.as_secs_f64());
}

/// Times one upload call and records its terminal outcome exactly once.
pub struct SessionMetrics {
    start_time: Instant,
}

impl SessionMetrics {
    /// `operation` is the call being timed: `start`, `resume` or `completion`
    pub fn start(operation: &str) -> Self {
        record_session_started(operation);
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn completed(self) {
        counter!("upload_sessions_completed_total").increment(1);
        record_session_finished(self.start_time.elapsed());
    }

    pub fn failed(self, kind: &str) {
        counter!("upload_sessions_failed_total", "kind" => kind.to_string()).increment(1);
        record_session_finished(self.start_time.elapsed());
    }

    pub fn cancelled(self) {
        counter!("upload_sessions_cancelled_total").increment(1);
        record_session_finished(self.start_time.elapsed());
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Times one object-store PUT. Confirmed bytes are counted by the caller
/// once the session accepts the part.
pub struct ChunkTimer {
    start_time: Instant,
}

impl ChunkTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn finish(self) {
        record_chunk_duration(self.start_time.elapsed());
    }
}
