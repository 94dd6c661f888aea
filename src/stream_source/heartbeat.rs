//! Per-camera liveness timestamp
//!
//! The acquisition thread is the only writer. The health monitor and the
//! fleet manager hold readers.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const NEVER: i64 = i64::MIN;

/// Create a linked writer/reader pair with no beat recorded
pub fn heartbeat() -> (HeartbeatWriter, HeartbeatReader) {
    let millis = Arc::new(AtomicI64::new(NEVER));
    (
        HeartbeatWriter {
            millis: millis.clone(),
        },
        HeartbeatReader { millis },
    )
}

/// Write half, moved into the acquisition thread
#[derive(Debug)]
pub struct HeartbeatWriter {
    millis: Arc<AtomicI64>,
}

impl HeartbeatWriter {
    pub fn beat(&self) {
        self.beat_at(Utc::now());
    }

    pub fn beat_at(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::Release);
    }
}

/// Read-only snapshot handle
#[derive(Debug, Clone)]
pub struct HeartbeatReader {
    millis: Arc<AtomicI64>,
}

impl HeartbeatReader {
    /// Last successful read, None if the stream never produced a frame
    pub fn last_beat(&self) -> Option<DateTime<Utc>> {
        match self.millis.load(Ordering::Acquire) {
            NEVER => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}
