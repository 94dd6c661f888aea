//! StreamSource - per-camera frame acquisition
//!
//! ## Responsibilities
//!
//! - Open the camera stream through a `VideoSource`
//! - Read frames on a dedicated thread and hand them to the FrameBuffer
//! - Retry failed reads, reconnecting after the configured number of failures
//! - Beat the camera heartbeat on every successful read
//!
//! A stream that cannot be opened at all ends this camera's acquisition with
//! `Error::StreamUnavailable`. Sibling cameras are unaffected.

mod ffmpeg;
mod heartbeat;

pub use ffmpeg::FfmpegSource;
pub use heartbeat::{heartbeat, HeartbeatReader, HeartbeatWriter};

use crate::config_store::{CameraConfig, ReconnectPolicy, Resolution};
use crate::frame_buffer::{Frame, FrameBuffer};
use crate::{Error, Result};
use image::imageops::FilterType;
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stream opener (video decoding/transport capability)
pub trait VideoSource: Send + Sync {
    fn open(&self, address: &str) -> Result<Box<dyn VideoStream>>;
}

/// An opened stream. Dropping it releases the underlying handle.
pub trait VideoStream: Send {
    /// Next frame; `Ok(None)` is end of stream
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Acquisition counters, returned when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    pub frames: u64,
    pub read_failures: u64,
    /// Handle re-acquisition attempts after the initial open
    pub reconnects: u64,
}

/// Blocking acquisition loop for one camera
pub struct AcquisitionLoop {
    camera: CameraConfig,
    source: Arc<dyn VideoSource>,
    buffer: Arc<FrameBuffer>,
    heartbeat: HeartbeatWriter,
    policy: ReconnectPolicy,
    resize_to: Option<Resolution>,
    stop: Arc<AtomicBool>,
}

impl AcquisitionLoop {
    pub fn new(
        camera: CameraConfig,
        source: Arc<dyn VideoSource>,
        buffer: Arc<FrameBuffer>,
        heartbeat: HeartbeatWriter,
        policy: ReconnectPolicy,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            camera,
            source,
            buffer,
            heartbeat,
            policy,
            resize_to: None,
            stop,
        }
    }

    /// Resize every frame before buffering it
    pub fn resize_to(mut self, resolution: Option<Resolution>) -> Self {
        self.resize_to = resolution;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Run until stopped. Only an initial open failure returns an error.
    pub fn run(self) -> Result<AcquisitionStats> {
        let camera_id = self.camera.id.clone();
        let mut stream = self
            .source
            .open(&self.camera.stream_address)
            .map_err(|e| Error::StreamUnavailable {
                camera_id: camera_id.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(camera_id = %camera_id, camera = %self.camera.name, "Stream opened");

        let mut stats = AcquisitionStats::default();
        let mut failures: u32 = 0;
        let mut delay = self.policy.initial_delay();

        while !self.stopped() {
            let failure = match stream.read_frame() {
                Ok(Some(image)) => {
                    failures = 0;
                    delay = self.policy.initial_delay();
                    self.heartbeat.beat();
                    stats.frames += 1;
                    self.buffer.push(Frame::new(camera_id.as_str(), self.prepare(image)));
                    continue;
                }
                Ok(None) => "end of stream".to_string(),
                Err(e) => e.to_string(),
            };

            failures += 1;
            stats.read_failures += 1;
            tracing::warn!(
                camera_id = %camera_id,
                attempt = failures,
                max_attempts = self.policy.attempts,
                error = %failure,
                "Frame read failed"
            );

            self.sleep_unless_stopped(delay);
            delay = self.policy.next_delay(delay);

            if failures >= self.policy.attempts {
                failures = 0;
                drop(stream);
                stream = match self.reacquire(&mut delay, &mut stats) {
                    Some(stream) => stream,
                    None => break,
                };
            }
        }

        tracing::info!(
            camera_id = %camera_id,
            frames = stats.frames,
            read_failures = stats.read_failures,
            reconnects = stats.reconnects,
            "Acquisition stopped"
        );
        Ok(stats)
    }

    /// Reopen the stream until it succeeds or the loop is stopped
    fn reacquire(
        &self,
        delay: &mut Duration,
        stats: &mut AcquisitionStats,
    ) -> Option<Box<dyn VideoStream>> {
        while !self.stopped() {
            stats.reconnects += 1;
            tracing::info!(camera_id = %self.camera.id, attempt = stats.reconnects, "Reconnecting stream");

            match self.source.open(&self.camera.stream_address) {
                Ok(stream) => {
                    tracing::info!(camera_id = %self.camera.id, "Stream reconnected");
                    return Some(stream);
                }
                Err(e) => {
                    tracing::warn!(
                        camera_id = %self.camera.id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Reconnect failed"
                    );
                    self.sleep_unless_stopped(*delay);
                    *delay = self.policy.next_delay(*delay);
                }
            }
        }
        None
    }

    fn prepare(&self, image: RgbImage) -> RgbImage {
        match self.resize_to {
            Some(size) if image.dimensions() != (size.width, size.height) => {
                image::imageops::resize(&image, size.width, size.height, FilterType::Triangle)
            }
            _ => image,
        }
    }

    fn sleep_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if self.stopped() || now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}
