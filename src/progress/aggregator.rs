//! Upload progress as a monotonic percentage.
//!
//! Chunked uploads report `5 + 90 * confirmed/total` and only count a chunk
//! once it succeeded. Single uploads report `10 + 90 * loaded/total` from the
//! PUT's byte callback. Both jump to 100 on completion and never go down.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Single,
    Chunked,
}

impl ProgressMode {
    fn offset(self) -> f64 {
        match self {
            ProgressMode::Single => 10.0,
            ProgressMode::Chunked => 5.0,
        }
    }
}

const SPAN: f64 = 90.0;

struct ProgressState {
    uploaded: u64,
    high_water: f64,
    completed: bool,
}

pub struct ProgressAggregator {
    mode: ProgressMode,
    total_bytes: u64,
    state: Mutex<ProgressState>,
}

impl ProgressAggregator {
    pub fn new(mode: ProgressMode, total_bytes: u64) -> Self {
        Self::resuming(mode, total_bytes, 0)
    }

    /// Start from bytes already confirmed by an earlier run
    pub fn resuming(mode: ProgressMode, total_bytes: u64, already_uploaded: u64) -> Self {
        let aggregator = Self {
            mode,
            total_bytes,
            state: Mutex::new(ProgressState {
                uploaded: already_uploaded.min(total_bytes),
                high_water: 0.0,
                completed: false,
            }),
        };
        aggregator.percentage();
        aggregator
    }

    /// Count a confirmed chunk. Returns the new percentage.
    pub fn on_bytes_transferred(&self, bytes: u64) -> f64 {
        let mut state = self.state.lock();
        state.uploaded = state.uploaded.saturating_add(bytes).min(self.total_bytes);
        self.update(&mut state)
    }

    /// Observe an absolute byte count from a streaming PUT. Lower values
    /// than already seen are ignored.
    pub fn observe_loaded(&self, loaded: u64) -> f64 {
        let mut state = self.state.lock();
        state.uploaded = state.uploaded.max(loaded.min(self.total_bytes));
        self.update(&mut state)
    }

    pub fn mark_complete(&self) -> f64 {
        let mut state = self.state.lock();
        state.completed = true;
        state.uploaded = self.total_bytes;
        self.update(&mut state)
    }

    pub fn percentage(&self) -> f64 {
        let mut state = self.state.lock();
        self.update(&mut state)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.state.lock().uploaded
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn update(&self, state: &mut ProgressState) -> f64 {
        let computed = if state.completed {
            100.0
        } else if self.total_bytes == 0 {
            self.mode.offset()
        } else {
            let fraction = state.uploaded as f64 / self.total_bytes as f64;
            self.mode.offset() + fraction * SPAN
        };
        state.high_water = state.high_water.max(computed);
        state.high_water
    }
}
