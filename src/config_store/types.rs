//! ConfigStore data types
//!
//! Camera identities and the recognized pipeline options

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Camera entity, immutable after load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    /// RTSP (or any ffmpeg-readable) stream address
    #[serde(alias = "rtsp_url", alias = "rtspUrl")]
    pub stream_address: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl CameraConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stream_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_address: stream_address.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Location label, falling back to the camera name
    pub fn location_label(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.name)
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one RGB24 frame of this size
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Time-of-day gate for alert sending
///
/// The comparison is `now >= start || now <= end`. With the default
/// 07:00 / 06:00 pair this blocks only 06:00-07:00. The pair looks inverted
/// and is kept literally until product owners confirm the intended window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl AlertWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether alerts may be sent at the given local time of day
    pub fn is_allowed(&self, now: NaiveTime) -> bool {
        now >= self.start || now <= self.end
    }
}

impl Default for AlertWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

/// Read-failure retry and reconnect policy
///
/// `attempts` consecutive read failures force a full reconnect. The delay
/// between failures starts at `initial_delay_ms` and is multiplied by
/// `multiplier` after each failure, capped at `max_delay_ms`. A successful
/// read resets both the failure count and the delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Fixed short delay, reconnect after `attempts` failures
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            attempts,
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
        }
    }

    /// Reconnect on every failure with doubling delay
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            attempts: 1,
            initial_delay_ms: initial.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            multiplier: 2.0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay following `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms.min(self.max_delay_ms).max(self.initial_delay_ms))
    }
}

/// How the dispatcher waits on an empty FrameBuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopMode {
    /// Block until a frame arrives or the pop timeout elapses
    Blocking,
    /// Non-blocking poll, sleeping the pop timeout between empty polls
    Poll,
}

/// Deployment preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    SingleCamera,
    Fleet,
}

impl Profile {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "single" | "single_camera" | "single-camera" => Some(Self::SingleCamera),
            "fleet" | "multi" => Some(Self::Fleet),
            _ => None,
        }
    }
}

/// Pipeline configuration (recognized options)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    pub image_alert_threshold: f32,
    pub cooldown_seconds: u64,
    pub cooldown_evict_after_seconds: u64,
    pub queue_depth: usize,
    pub reconnect: ReconnectPolicy,
    pub stale_timeout_seconds: u64,
    pub health_poll_interval_seconds: u64,
    pub alert_window: AlertWindow,
    pub pop_mode: PopMode,
    pub pop_timeout_ms: u64,
    /// Size ffmpeg scales the decoded stream to
    pub capture_resolution: Resolution,
    /// Size frames are resized to before detection (None = as captured)
    pub detection_resolution: Option<Resolution>,
    /// Resize at acquisition time instead of at dispatch time
    pub resize_on_acquire: bool,
    /// Detection class labels considered (empty = all)
    pub tracked_classes: Vec<String>,
    pub stop_join_timeout_seconds: u64,
    pub alert_queue_capacity: usize,
    pub alert_workers: usize,
    pub event_queue_capacity: usize,
    pub event_workers: usize,
    pub stats_log_interval_seconds: u64,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl PipelineConfig {
    /// Single RTSP camera with local scale-back
    pub fn single_camera() -> Self {
        Self {
            confidence_threshold: 0.3,
            image_alert_threshold: 0.6,
            cooldown_seconds: 10,
            cooldown_evict_after_seconds: 100,
            queue_depth: 5,
            reconnect: ReconnectPolicy::fixed(3, Duration::from_millis(500)),
            stale_timeout_seconds: 30,
            health_poll_interval_seconds: 15,
            alert_window: AlertWindow::default(),
            pop_mode: PopMode::Blocking,
            pop_timeout_ms: 1000,
            capture_resolution: Resolution::new(1920, 1080),
            detection_resolution: Some(Resolution::new(1280, 720)),
            resize_on_acquire: false,
            tracked_classes: vec!["person".to_string()],
            stop_join_timeout_seconds: 5,
            alert_queue_capacity: 64,
            alert_workers: 2,
            event_queue_capacity: 256,
            event_workers: 2,
            stats_log_interval_seconds: 10,
            cameras: Vec::new(),
        }
    }

    /// Many cameras, frames pre-resized at acquisition
    pub fn fleet() -> Self {
        Self {
            confidence_threshold: 0.5,
            queue_depth: 10,
            reconnect: ReconnectPolicy::exponential(
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            pop_mode: PopMode::Poll,
            pop_timeout_ms: 100,
            capture_resolution: Resolution::new(1280, 720),
            detection_resolution: Some(Resolution::new(640, 480)),
            resize_on_acquire: true,
            alert_workers: 4,
            event_workers: 4,
            ..Self::single_camera()
        }
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::SingleCamera => Self::single_camera(),
            Profile::Fleet => Self::fleet(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_seconds)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_seconds)
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_join_timeout_seconds)
    }

    /// Check option ranges
    pub fn validate(&self) -> crate::Result<()> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.confidence_threshold) {
            return Err(crate::Error::Config(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !in_unit(self.image_alert_threshold) {
            return Err(crate::Error::Config(format!(
                "imageAlertThreshold must be within [0, 1], got {}",
                self.image_alert_threshold
            )));
        }
        if self.queue_depth == 0 {
            return Err(crate::Error::Config("queueDepth must be at least 1".to_string()));
        }
        if self.reconnect.attempts == 0 {
            return Err(crate::Error::Config(
                "reconnect.attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(crate::Error::Config(
                "reconnect.multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.health_poll_interval_seconds == 0 || self.pop_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "healthPollIntervalSeconds and popTimeoutMs must be non-zero".to_string(),
            ));
        }
        if self.alert_workers == 0 || self.event_workers == 0 {
            return Err(crate::Error::Config(
                "alertWorkers and eventWorkers must be at least 1".to_string(),
            ));
        }
        if self.alert_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(crate::Error::Config(
                "queue capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::fleet()
    }
}
