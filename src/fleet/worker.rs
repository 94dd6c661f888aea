//! Per-camera lifecycle: one acquisition thread plus one dispatch task

use crate::config_store::CameraConfig;
use crate::dispatcher::DispatchStats;
use crate::frame_buffer::FrameBuffer;
use crate::stream_source::{AcquisitionStats, HeartbeatReader};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Worker lifecycle: stopped -> starting -> running -> stopping -> stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

pub(super) struct CameraWorker {
    pub camera: CameraConfig,
    pub state: WorkerState,
    pub stop: Arc<AtomicBool>,
    pub acquisition: Option<thread::JoinHandle<Result<AcquisitionStats>>>,
    pub dispatch: Option<JoinHandle<DispatchStats>>,
    pub heartbeat: Option<HeartbeatReader>,
    pub buffer: Option<Arc<FrameBuffer>>,
}

impl CameraWorker {
    pub fn new(camera: CameraConfig) -> Self {
        Self {
            camera,
            state: WorkerState::Stopped,
            stop: Arc::new(AtomicBool::new(false)),
            acquisition: None,
            dispatch: None,
            heartbeat: None,
            buffer: None,
        }
    }

    /// Whether the acquisition thread has exited on its own
    pub fn acquisition_halted(&self) -> bool {
        self.acquisition
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(false)
    }
}

/// Outcome of a bounded thread join
pub(super) enum JoinOutcome<T> {
    Joined(T),
    Panicked,
    /// Thread still running at the deadline; it is left detached
    TimedOut,
}

/// Wait for a std thread until `deadline` without blocking the runtime
pub(super) async fn join_thread<T>(handle: thread::JoinHandle<T>, deadline: Instant) -> JoinOutcome<T> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return JoinOutcome::TimedOut;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    match handle.join() {
        Ok(value) => JoinOutcome::Joined(value),
        Err(_) => JoinOutcome::Panicked,
    }
}
