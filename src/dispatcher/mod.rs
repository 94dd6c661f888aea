//! DetectionDispatcher - per-camera detection to alert pipeline
//!
//! ## Responsibilities
//!
//! - Pull frames from the camera's FrameBuffer
//! - Run detection and filter by class, confidence and track id
//! - Suppress repeat alerts per subject within the cooldown window
//! - Pick the alert tier (image or text) inside the alert window
//! - Enqueue alert and persistence requests without waiting on them
//!
//! ## Per-detection flow
//!
//! 1. class not tracked, confidence below threshold, or no track id: discard
//! 2. subject alerted within the cooldown window: suppress
//! 3. otherwise the detection is alertable:
//!    - inside the alert window, confidence >= image threshold: snapshot + image alert
//!    - inside the alert window, below image threshold: text alert
//!    - draft event always; snapshot path attached afterwards on the image tier
//!    - cooldown restarts whether or not the window allowed sending

mod cooldown;
mod snapshot;

pub use cooldown::CooldownTracker;
pub use snapshot::SnapshotWriter;

use crate::alert_router::{format_alert_message, AlertRouter};
use crate::config_store::{CameraConfig, PipelineConfig};
use crate::detection::{scale_factors, Detection, Detector, RawDetection};
use crate::event_recorder::{DetectionEvent, EventRecorder};
use crate::frame_buffer::{Frame, FrameBuffer};
use chrono::{DateTime, Local};
use image::imageops::FilterType;
use image::RgbImage;
use serde::Serialize;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FPS_ALPHA: f64 = 0.2;

/// Shared downstream services handed to every camera's dispatcher
#[derive(Clone)]
pub struct DispatcherServices {
    pub detector: Arc<dyn Detector>,
    pub alerts: Arc<AlertRouter>,
    pub events: Arc<EventRecorder>,
    pub snapshots: Arc<SnapshotWriter>,
}

/// What one frame produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Detections that passed class, confidence and track id filters
    pub accepted: usize,
    pub discarded: usize,
    pub suppressed: usize,
    pub image_alerts: usize,
    pub text_alerts: usize,
    /// Alertable detections that fell outside the alert window
    pub window_blocked: usize,
    /// Draft inserts plus image amendments enqueued
    pub persistence_requests: usize,
    pub detection_failed: bool,
}

/// Running totals for one camera
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub frames: u64,
    pub detections: u64,
    pub discarded: u64,
    pub suppressed: u64,
    pub image_alerts: u64,
    pub text_alerts: u64,
    pub window_blocked: u64,
    pub persistence_requests: u64,
    pub detection_failures: u64,
    pub fps: f64,
}

impl DispatchStats {
    fn absorb(&mut self, outcome: &DispatchOutcome) {
        self.frames += 1;
        self.detections += outcome.accepted as u64;
        self.discarded += outcome.discarded as u64;
        self.suppressed += outcome.suppressed as u64;
        self.image_alerts += outcome.image_alerts as u64;
        self.text_alerts += outcome.text_alerts as u64;
        self.window_blocked += outcome.window_blocked as u64;
        self.persistence_requests += outcome.persistence_requests as u64;
        if outcome.detection_failed {
            self.detection_failures += 1;
        }
    }
}

/// Exponential moving average of processing rate, `1 / per-frame processing time`
#[derive(Debug, Default)]
struct FpsMeter {
    ema: f64,
}

impl FpsMeter {
    fn record(&mut self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            let instant = 1.0 / secs;
            self.ema = if self.ema == 0.0 {
                instant
            } else {
                FPS_ALPHA * instant + (1.0 - FPS_ALPHA) * self.ema
            };
        }
        self.ema
    }
}

pub struct DetectionDispatcher {
    camera: CameraConfig,
    config: Arc<PipelineConfig>,
    services: DispatcherServices,
    cooldowns: CooldownTracker,
    stats: DispatchStats,
    fps: FpsMeter,
    last_stats_log: Instant,
}

impl DetectionDispatcher {
    pub fn new(
        camera: CameraConfig,
        config: Arc<PipelineConfig>,
        services: DispatcherServices,
    ) -> Self {
        let cooldowns = CooldownTracker::new(
            config.cooldown(),
            Duration::from_secs(config.cooldown_evict_after_seconds),
        );
        Self {
            camera,
            config,
            services,
            cooldowns,
            stats: DispatchStats::default(),
            fps: FpsMeter::default(),
            last_stats_log: Instant::now(),
        }
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Consume frames until `stop` is raised
    pub async fn run(mut self, buffer: Arc<FrameBuffer>, stop: Arc<AtomicBool>) -> DispatchStats {
        tracing::info!(camera_id = %self.camera.id, camera = %self.camera.name, "Dispatcher started");

        while !stop.load(Ordering::Acquire) {
            let Some(frame) = buffer
                .pop(self.config.pop_mode, self.config.pop_timeout())
                .await
            else {
                continue;
            };
            self.process_frame(&frame).await;
        }

        tracing::info!(
            camera_id = %self.camera.id,
            frames = self.stats.frames,
            image_alerts = self.stats.image_alerts,
            text_alerts = self.stats.text_alerts,
            detection_failures = self.stats.detection_failures,
            "Dispatcher stopped"
        );
        self.stats
    }

    pub async fn process_frame(&mut self, frame: &Frame) -> DispatchOutcome {
        self.process_frame_at(frame, Local::now()).await
    }

    /// Run one frame through the pipeline as of `now`
    pub async fn process_frame_at(&mut self, frame: &Frame, now: DateTime<Local>) -> DispatchOutcome {
        let started = Instant::now();
        let outcome = self.dispatch(frame, now).await;
        self.stats.fps = self.fps.record(started.elapsed());
        self.stats.absorb(&outcome);
        self.maybe_log_stats();
        outcome
    }

    async fn dispatch(&mut self, frame: &Frame, now: DateTime<Local>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let (input, scale) = self.detection_input(&frame.image);
        let raw = match self.services.detector.detect(&self.camera.id, &input).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(camera_id = %self.camera.id, error = %e, "Detection failed, skipping frame");
                outcome.detection_failed = true;
                return outcome;
            }
        };
        drop(input);

        let total = raw.len();
        let accepted: Vec<Detection> = raw
            .into_iter()
            .filter_map(|r| self.accept(r, now, scale))
            .collect();
        outcome.accepted = accepted.len();
        outcome.discarded = total - accepted.len();

        let mut snapshot: Option<PathBuf> = None;
        for detection in &accepted {
            if self.cooldowns.is_cooling_down(detection.track_id, now) {
                outcome.suppressed += 1;
                continue;
            }
            self.emit(detection, &accepted, frame, now, &mut snapshot, &mut outcome)
                .await;
            self.cooldowns.mark(detection.track_id, now);
        }

        let pruned = self.cooldowns.prune(now);
        if pruned > 0 {
            tracing::debug!(camera_id = %self.camera.id, pruned, remaining = self.cooldowns.len(), "Cooldown entries evicted");
        }

        outcome
    }

    /// Frame as the detector should see it, plus the factor back to frame space
    fn detection_input<'a>(&self, image: &'a RgbImage) -> (Cow<'a, RgbImage>, (f32, f32)) {
        match self.config.detection_resolution {
            Some(target) if image.dimensions() != (target.width, target.height) => {
                let resized = image::imageops::resize(
                    image,
                    target.width,
                    target.height,
                    FilterType::Triangle,
                );
                let scale = scale_factors((target.width, target.height), image.dimensions());
                (Cow::Owned(resized), scale)
            }
            _ => (Cow::Borrowed(image), (1.0, 1.0)),
        }
    }

    fn accept(&self, raw: RawDetection, now: DateTime<Local>, scale: (f32, f32)) -> Option<Detection> {
        let tracked = &self.config.tracked_classes;
        if !tracked.is_empty() && !tracked.iter().any(|c| c.eq_ignore_ascii_case(&raw.class)) {
            return None;
        }
        if raw.confidence < self.config.confidence_threshold {
            return None;
        }
        Detection::from_raw(raw, &self.camera.id, now, scale)
    }

    async fn emit(
        &mut self,
        detection: &Detection,
        frame_detections: &[Detection],
        frame: &Frame,
        now: DateTime<Local>,
        snapshot: &mut Option<PathBuf>,
        outcome: &mut DispatchOutcome,
    ) {
        let mut alert_sent = false;
        let mut image_path = None;

        if self.config.alert_window.is_allowed(now.time()) {
            let message = format_alert_message(
                detection.track_id,
                detection.confidence,
                &self.camera.name,
                now,
            );

            if detection.confidence >= self.config.image_alert_threshold {
                image_path = self.snapshot_for(frame, frame_detections, snapshot).await;
            }

            match &image_path {
                Some(path) => {
                    alert_sent = self.services.alerts.send_image(path.clone(), message);
                    if alert_sent {
                        outcome.image_alerts += 1;
                    }
                }
                None => {
                    alert_sent = self.services.alerts.send_text(message);
                    if alert_sent {
                        outcome.text_alerts += 1;
                    }
                }
            }

            let tier = if image_path.is_some() { "image" } else { "text" };
            tracing::info!(
                camera_id = %self.camera.id,
                track_id = detection.track_id,
                confidence = detection.confidence,
                tier,
                "Alert raised"
            );
        } else {
            outcome.window_blocked += 1;
            tracing::debug!(
                camera_id = %self.camera.id,
                track_id = detection.track_id,
                "Outside alert window, alert not sent"
            );
        }

        let event = DetectionEvent::draft(
            detection,
            &self.camera.name,
            self.camera.location_label(),
            alert_sent,
        );
        let event_id = event.id;
        if self.services.events.record(event) {
            outcome.persistence_requests += 1;
        }
        if let Some(path) = image_path {
            if self
                .services
                .events
                .attach_image(event_id, path.to_string_lossy())
            {
                outcome.persistence_requests += 1;
            }
        }
    }

    /// One annotated snapshot per frame, shared by every image alert in it
    async fn snapshot_for(
        &self,
        frame: &Frame,
        frame_detections: &[Detection],
        snapshot: &mut Option<PathBuf>,
    ) -> Option<PathBuf> {
        if let Some(path) = snapshot {
            return Some(path.clone());
        }
        match self
            .services
            .snapshots
            .save(&frame.image, frame_detections)
            .await
        {
            Ok(path) => {
                *snapshot = Some(path.clone());
                Some(path)
            }
            Err(e) => {
                tracing::warn!(camera_id = %self.camera.id, error = %e, "Snapshot failed, falling back to text alert");
                None
            }
        }
    }

    fn maybe_log_stats(&mut self) {
        let interval = Duration::from_secs(self.config.stats_log_interval_seconds.max(1));
        if self.last_stats_log.elapsed() < interval {
            return;
        }
        self.last_stats_log = Instant::now();
        tracing::info!(
            camera_id = %self.camera.id,
            fps = self.stats.fps,
            frames = self.stats.frames,
            detections = self.stats.detections,
            alerts = self.stats.image_alerts + self.stats.text_alerts,
            suppressed = self.stats.suppressed,
            tracked_subjects = self.cooldowns.len(),
            "Dispatcher stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_router::tests::RecordingChannel;
    use crate::alert_router::AlertRequest;
    use crate::config_store::Resolution;
    use crate::detection::BBox;
    use crate::event_recorder::{EventFilter, EventStore, MemoryEventStore};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns queued responses in order, then empty detection lists
    struct ScriptedDetector {
        responses: Mutex<VecDeque<Result<Vec<RawDetection>>>>,
        seen_sizes: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedDetector {
        fn new(responses: Vec<Result<Vec<RawDetection>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Detector for ScriptedDetector {
        async fn detect(&self, _camera_id: &str, frame: &RgbImage) -> Result<Vec<RawDetection>> {
            self.seen_sizes.lock().unwrap().push(frame.dimensions());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn person(track_id: Option<i64>, confidence: f32) -> RawDetection {
        RawDetection {
            class: "person".to_string(),
            confidence,
            bbox: BBox::new(4.0, 4.0, 20.0, 30.0),
            track_id,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    struct Harness {
        dispatcher: DetectionDispatcher,
        detector: Arc<ScriptedDetector>,
        channel: Arc<RecordingChannel>,
        store: Arc<MemoryEventStore>,
        services: DispatcherServices,
        _snapshot_dir: TempDir,
    }

    struct TempDir(PathBuf);

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    impl Harness {
        fn new(config: PipelineConfig, responses: Vec<Result<Vec<RawDetection>>>) -> Self {
            let detector = Arc::new(ScriptedDetector::new(responses));
            let channel = Arc::new(RecordingChannel::default());
            let store = Arc::new(MemoryEventStore::new(100));
            let snapshot_dir =
                std::env::temp_dir().join(format!("camguard-dispatch-{}", uuid::Uuid::new_v4()));
            let services = DispatcherServices {
                detector: detector.clone(),
                alerts: Arc::new(AlertRouter::new(channel.clone(), 1, 32)),
                events: Arc::new(EventRecorder::new(store.clone(), 2, 32)),
                snapshots: Arc::new(SnapshotWriter::new(&snapshot_dir)),
            };
            let dispatcher = DetectionDispatcher::new(
                CameraConfig::new("cam-1", "Office", "rtsp://test"),
                Arc::new(config),
                services.clone(),
            );
            Self {
                dispatcher,
                detector,
                channel,
                store,
                services,
                _snapshot_dir: TempDir(snapshot_dir),
            }
        }

        fn frame() -> Frame {
            Frame::new("cam-1", RgbImage::new(64, 48))
        }

        async fn flush(&self) {
            self.services.alerts.shutdown().await;
            self.services.events.shutdown().await;
        }

        fn sent(&self) -> Vec<AlertRequest> {
            self.channel.sent.lock().unwrap().clone()
        }

        async fn events(&self) -> Vec<DetectionEvent> {
            self.store.query(&EventFilter::default()).await.unwrap()
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            detection_resolution: None,
            ..PipelineConfig::single_camera()
        }
    }

    #[tokio::test]
    async fn test_cooldown_one_second_apart_alerts_once() {
        let mut h = Harness::new(
            config(),
            vec![Ok(vec![person(Some(7), 0.5)]), Ok(vec![person(Some(7), 0.5)])],
        );
        let first = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        let second = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 1)).await;
        h.flush().await;

        assert_eq!(first.text_alerts, 1);
        assert_eq!(second.suppressed, 1);
        assert_eq!(second.text_alerts + second.image_alerts, 0);
        assert_eq!(h.sent().len(), 1);
        assert_eq!(h.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_eleven_seconds_apart_alerts_twice() {
        let mut h = Harness::new(
            config(),
            vec![Ok(vec![person(Some(7), 0.5)]), Ok(vec![person(Some(7), 0.5)])],
        );
        h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        let second = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 11)).await;
        h.flush().await;

        assert_eq!(second.text_alerts, 1);
        assert_eq!(h.sent().len(), 2);
        assert_eq!(h.events().await.len(), 2);
    }

    #[tokio::test]
    async fn test_image_tier_at_threshold() {
        let mut h = Harness::new(config(), vec![Ok(vec![person(Some(3), 0.6)])]);
        let outcome = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(outcome.image_alerts, 1);
        assert_eq!(outcome.persistence_requests, 2);

        let sent = h.sent();
        let AlertRequest::Image { path, caption } = &sent[0] else {
            panic!("expected image alert, got {:?}", sent[0]);
        };
        assert!(caption.contains("ID: 3"));
        assert!(path.exists());

        let events = h.events().await;
        assert_eq!(events.len(), 1);
        let expected = path.to_string_lossy().to_string();
        assert_eq!(events[0].image_path.as_deref(), Some(expected.as_str()));
        assert!(events[0].alert_sent);
    }

    #[tokio::test]
    async fn test_text_tier_below_threshold() {
        let mut h = Harness::new(config(), vec![Ok(vec![person(Some(3), 0.59)])]);
        let outcome = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(outcome.text_alerts, 1);
        assert_eq!(outcome.persistence_requests, 1);
        assert!(matches!(h.sent()[0], AlertRequest::Text { .. }));

        let events = h.events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].image_path.is_none());
    }

    #[tokio::test]
    async fn test_no_track_id_produces_nothing() {
        let mut h = Harness::new(config(), vec![Ok(vec![person(None, 0.99)])]);
        let outcome = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.discarded, 1);
        assert!(h.sent().is_empty());
        assert!(h.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_and_untracked_class_discarded() {
        let car = RawDetection {
            class: "car".to_string(),
            ..person(Some(1), 0.9)
        };
        let mut h = Harness::new(config(), vec![Ok(vec![person(Some(2), 0.29), car])]);
        let outcome = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(outcome.discarded, 2);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_alert_window_blocks_send_but_records_and_cools_down() {
        let mut h = Harness::new(
            config(),
            vec![Ok(vec![person(Some(5), 0.9)]), Ok(vec![person(Some(5), 0.9)])],
        );
        let blocked = h.dispatcher.process_frame_at(&Harness::frame(), at(6, 30, 0)).await;
        let repeat = h.dispatcher.process_frame_at(&Harness::frame(), at(6, 30, 5)).await;
        h.flush().await;

        assert_eq!(blocked.window_blocked, 1);
        assert_eq!(blocked.persistence_requests, 1);
        assert_eq!(repeat.suppressed, 1);
        assert!(h.sent().is_empty());

        let events = h.events().await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].alert_sent);
        assert!(events[0].image_path.is_none());
    }

    #[tokio::test]
    async fn test_detection_failure_skips_frame_only() {
        let mut h = Harness::new(
            config(),
            vec![
                Err(Error::Detection("timeout".to_string())),
                Ok(vec![person(Some(1), 0.5)]),
            ],
        );
        let failed = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        let next = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 1)).await;
        h.flush().await;

        assert!(failed.detection_failed);
        assert_eq!(next.text_alerts, 1);
        assert_eq!(h.dispatcher.stats().detection_failures, 1);
        assert_eq!(h.dispatcher.stats().frames, 2);
    }

    #[tokio::test]
    async fn test_boxes_scaled_back_to_frame() {
        let config = PipelineConfig {
            detection_resolution: Some(Resolution::new(32, 24)),
            ..PipelineConfig::single_camera()
        };
        let mut h = Harness::new(config, vec![Ok(vec![person(Some(9), 0.5)])]);
        h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(*h.detector.seen_sizes.lock().unwrap(), vec![(32, 24)]);
        let events = h.events().await;
        assert_eq!(events[0].bbox, BBox::new(8.0, 8.0, 40.0, 60.0));
        assert_eq!(events[0].metadata["bbox"], serde_json::json!([8, 8, 40, 60]));
    }

    #[tokio::test]
    async fn test_two_subjects_share_one_snapshot() {
        let mut h = Harness::new(
            config(),
            vec![Ok(vec![person(Some(1), 0.8), person(Some(2), 0.9)])],
        );
        let outcome = h.dispatcher.process_frame_at(&Harness::frame(), at(12, 0, 0)).await;
        h.flush().await;

        assert_eq!(outcome.image_alerts, 2);
        let paths: Vec<PathBuf> = h
            .sent()
            .into_iter()
            .filter_map(|r| match r {
                AlertRequest::Image { path, .. } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], paths[1]);
    }

    #[tokio::test]
    async fn test_run_stops_on_flag() {
        let h = Harness::new(config(), vec![Ok(vec![person(Some(1), 0.5)])]);
        let buffer = Arc::new(FrameBuffer::new(5));
        buffer.push(Harness::frame());
        let stop = Arc::new(AtomicBool::new(false));

        let Harness { dispatcher, .. } = h;
        let task = tokio::spawn(dispatcher.run(buffer.clone(), stop.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.store(true, Ordering::Release);

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.frames, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fps_meter_uses_processing_time() {
        let mut meter = FpsMeter::default();
        assert!((meter.record(Duration::from_millis(100)) - 10.0).abs() < 1e-9);
        let ema = meter.record(Duration::from_millis(50));
        assert!((ema - 12.0).abs() < 1e-9);
        // zero-length samples leave the average alone
        assert!((meter.record(Duration::ZERO) - 12.0).abs() < 1e-9);
    }

    /// Takes a fixed time per frame and finds nothing
    struct SlowDetector(Duration);

    #[async_trait]
    impl Detector for SlowDetector {
        async fn detect(&self, _camera_id: &str, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
            tokio::time::sleep(self.0).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_fps_ignores_idle_time_between_frames() {
        let h = Harness::new(config(), Vec::new());
        let services = DispatcherServices {
            detector: Arc::new(SlowDetector(Duration::from_millis(50))),
            ..h.services.clone()
        };
        let mut dispatcher = DetectionDispatcher::new(
            CameraConfig::new("cam-1", "Office", "rtsp://test"),
            Arc::new(config()),
            services,
        );

        dispatcher.process_frame(&Harness::frame()).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        dispatcher.process_frame(&Harness::frame()).await;

        // ~20 fps of processing, not ~2 fps of arrivals
        let fps = dispatcher.stats().fps;
        assert!(fps > 8.0 && fps <= 20.5, "fps = {}", fps);
    }
}
