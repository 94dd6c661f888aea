//! HealthMonitor - heartbeat-based camera liveness
//!
//! ## Responsibilities
//!
//! - Poll every watched camera's heartbeat at a fixed interval
//! - Derive online/offline from heartbeat staleness
//! - Report the status on every tick (the status API absorbs duplicates)
//! - Log lost/recovered transitions
//!
//! The monitor only ever reads heartbeats. It runs on its own task, so a
//! stalled dispatcher cannot delay health reporting.

mod status_tracker;

pub use status_tracker::{CameraStatusEvent, CameraStatusTracker};

use crate::error::{Error, Result};
use crate::stream_source::HeartbeatReader;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Reported camera status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "online",
            CameraStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health of one camera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraHealth {
    pub camera_id: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: CameraStatus,
}

/// Offline when the heartbeat is older than `stale_timeout`, or absent
pub fn derive_status(
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_timeout: Duration,
) -> CameraStatus {
    let Some(last) = last_heartbeat else {
        return CameraStatus::Offline;
    };
    match (now - last).to_std() {
        Ok(age) if age > stale_timeout => CameraStatus::Offline,
        // negative age: heartbeat written after `now` was sampled
        _ => CameraStatus::Online,
    }
}

/// Status API (consumed)
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, camera_id: &str, status: CameraStatus) -> Result<()>;
}

/// `PUT {base}/cameras/{id}/status`
pub struct HttpStatusSink {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStatusSink {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn status_url(&self, camera_id: &str) -> String {
        format!("{}/cameras/{}/status", self.base_url, camera_id)
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn report(&self, camera_id: &str, status: CameraStatus) -> Result<()> {
        let mut req = self
            .client
            .put(self.status_url(camera_id))
            .json(&serde_json::json!({ "status": status }));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Status(format!("request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::Status(format!(
                "status API returned {} for camera {}",
                resp.status(),
                camera_id
            )));
        }
        Ok(())
    }
}

/// Sink for deployments without a status API
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn report(&self, camera_id: &str, status: CameraStatus) -> Result<()> {
        tracing::debug!(camera_id = %camera_id, status = %status, "Camera status");
        Ok(())
    }
}

/// One watched camera. `gate` is held while a tick reports for it.
struct Watched {
    heartbeat: HeartbeatReader,
    generation: u64,
    gate: Arc<Mutex<()>>,
}

pub struct HealthMonitor {
    sink: Arc<dyn StatusSink>,
    tracker: CameraStatusTracker,
    watched: RwLock<HashMap<String, Watched>>,
    next_generation: AtomicU64,
    stale_timeout: Duration,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(sink: Arc<dyn StatusSink>, stale_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            sink,
            tracker: CameraStatusTracker::new(),
            watched: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            stale_timeout,
            poll_interval,
        }
    }

    /// Start polling a camera's heartbeat
    pub async fn watch(&self, camera_id: &str, heartbeat: HeartbeatReader) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.watched.write().await.insert(
            camera_id.to_string(),
            Watched {
                heartbeat,
                generation,
                gate: Arc::new(Mutex::new(())),
            },
        );
    }

    /// Stop polling a camera.
    ///
    /// Returns once no tick can report for this watch any more: an in-flight
    /// report is awaited, later ones see the camera gone and are dropped.
    pub async fn unwatch(&self, camera_id: &str) {
        let removed = self.watched.write().await.remove(camera_id);
        if let Some(watched) = removed {
            let _drained = watched.gate.lock().await;
        }
        self.tracker.remove(camera_id).await;
    }

    async fn is_current(&self, camera_id: &str, generation: u64) -> bool {
        self.watched
            .read()
            .await
            .get(camera_id)
            .map(|w| w.generation == generation)
            .unwrap_or(false)
    }

    /// Best-effort status report; failures are logged only
    pub async fn report(&self, camera_id: &str, status: CameraStatus) -> bool {
        match self.sink.report(camera_id, status).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    status = %status,
                    error = %e,
                    "Status report failed"
                );
                false
            }
        }
    }

    /// Current health of every watched camera, without reporting
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<CameraHealth> {
        self.sample(now)
            .await
            .into_iter()
            .map(|(health, _, _)| health)
            .collect()
    }

    async fn sample(&self, now: DateTime<Utc>) -> Vec<(CameraHealth, u64, Arc<Mutex<()>>)> {
        let watched = self.watched.read().await;
        let mut samples: Vec<_> = watched
            .iter()
            .map(|(camera_id, w)| {
                let last_heartbeat = w.heartbeat.last_beat();
                let health = CameraHealth {
                    camera_id: camera_id.clone(),
                    last_heartbeat,
                    status: derive_status(last_heartbeat, now, self.stale_timeout),
                };
                (health, w.generation, w.gate.clone())
            })
            .collect();
        samples.sort_by(|a, b| a.0.camera_id.cmp(&b.0.camera_id));
        samples
    }

    /// Track and report one sampled camera unless it was unwatched since
    async fn apply(&self, health: &CameraHealth, generation: u64, gate: &Mutex<()>) -> bool {
        let _gate = gate.lock().await;
        if !self.is_current(&health.camera_id, generation).await {
            tracing::debug!(camera_id = %health.camera_id, "Camera unwatched during tick, report dropped");
            return false;
        }
        self.tracker
            .update_status(&health.camera_id, health.status)
            .await;
        self.report(&health.camera_id, health.status).await
    }

    /// One poll: derive, track transitions, report every camera
    pub async fn check_at(&self, now: DateTime<Utc>) -> Vec<CameraHealth> {
        let samples = self.sample(now).await;

        futures::future::join_all(
            samples
                .iter()
                .map(|(health, generation, gate)| self.apply(health, *generation, gate)),
        )
        .await;

        let health: Vec<CameraHealth> = samples.into_iter().map(|(h, _, _)| h).collect();
        tracing::debug!(
            cameras = health.len(),
            offline = health.iter().filter(|h| h.status == CameraStatus::Offline).count(),
            "Health check complete"
        );
        health
    }

    pub async fn check(&self) -> Vec<CameraHealth> {
        self.check_at(Utc::now()).await
    }

    pub fn tracker(&self) -> &CameraStatusTracker {
        &self.tracker
    }

    /// Poll until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.poll_interval;
            let mut ticker = tokio::time::interval_at(start, self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                interval_sec = self.poll_interval.as_secs(),
                stale_timeout_sec = self.stale_timeout.as_secs(),
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Health monitor stopped");
        })
    }
}
