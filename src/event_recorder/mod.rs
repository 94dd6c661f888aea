//! EventRecorder - best-effort event persistence
//!
//! ## Responsibilities
//!
//! - Queue detection events on a bounded worker pool
//! - Two-phase write: insert the draft, then attach the snapshot path
//! - Event queries and dashboard counters through the `EventStore`
//!
//! Failed writes are logged and dropped. Nothing is retried.

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use crate::detection::{BBox, Detection};
use crate::worker_pool::{JobHandler, WorkerPool, WorkerPoolStats};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Persisted detection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Subject track id
    #[serde(rename = "person_id")]
    pub subject_id: i64,
    pub confidence: f32,
    pub camera_id: String,
    pub camera_name: String,
    pub image_path: Option<String>,
    pub alert_sent: bool,
    pub bbox: BBox,
    pub metadata: serde_json::Value,
}

impl DetectionEvent {
    /// Draft record for an alertable detection (no image yet)
    pub fn draft(detection: &Detection, camera_name: &str, location: &str, alert_sent: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: detection.timestamp.with_timezone(&Utc),
            subject_id: detection.track_id,
            confidence: detection.confidence,
            camera_id: detection.camera_id.clone(),
            camera_name: camera_name.to_string(),
            image_path: None,
            alert_sent,
            bbox: detection.bbox,
            metadata: serde_json::json!({
                "bbox": detection.bbox.to_pixels(),
                "location": location,
                "class": detection.class,
                "track_id": detection.track_id,
            }),
        }
    }
}

/// Event query filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub camera_id: Option<String>,
    /// Case-insensitive substring match on the camera name
    pub camera_name: Option<String>,
    pub subject_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventFilter {
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// In-process evaluation, mirrors the SQL predicates
    pub fn matches(&self, event: &DetectionEvent) -> bool {
        if let Some(camera_id) = &self.camera_id {
            if &event.camera_id != camera_id {
                return false;
            }
        }
        if let Some(name) = &self.camera_name {
            if !event
                .camera_name
                .to_lowercase()
                .contains(&name.to_lowercase())
            {
                return false;
            }
        }
        if let Some(subject) = self.subject_id {
            if event.subject_id != subject {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Aggregate dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_events: i64,
    pub active_devices: i64,
    pub inactive_devices: i64,
    pub online_devices: i64,
    pub offline_devices: i64,
    pub people_detected: i64,
    pub events_trend: f64,
    pub devices_trend: f64,
    pub people_trend: f64,
}

/// Event store (persistence capability)
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &DetectionEvent) -> Result<()>;
    /// Amend a previously inserted event with its snapshot path
    async fn attach_image(&self, event_id: Uuid, image_path: &str) -> Result<()>;
    async fn query(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>>;
    async fn dashboard_stats(&self) -> Result<DashboardStats>;
}

/// Queued persistence request
#[derive(Debug, Clone, PartialEq)]
pub enum EventJob {
    Draft(DetectionEvent),
    AttachImage { event_id: Uuid, image_path: String },
}

impl EventJob {
    pub fn event_id(&self) -> Uuid {
        match self {
            EventJob::Draft(event) => event.id,
            EventJob::AttachImage { event_id, .. } => *event_id,
        }
    }
}

struct Persist {
    store: Arc<dyn EventStore>,
}

#[async_trait]
impl JobHandler<EventJob> for Persist {
    async fn handle(&self, job: EventJob) {
        match job {
            EventJob::Draft(event) => match self.store.insert(&event).await {
                Ok(()) => tracing::debug!(
                    event_id = %event.id,
                    camera_id = %event.camera_id,
                    subject_id = event.subject_id,
                    "Event recorded"
                ),
                Err(e) => tracing::error!(
                    event_id = %event.id,
                    camera_id = %event.camera_id,
                    error = %e,
                    "Event insert failed, event lost"
                ),
            },
            EventJob::AttachImage {
                event_id,
                image_path,
            } => match self.store.attach_image(event_id, &image_path).await {
                Ok(()) => tracing::debug!(event_id = %event_id, image_path = %image_path, "Event image attached"),
                Err(e) => tracing::error!(
                    event_id = %event_id,
                    error = %e,
                    "Event image attach failed"
                ),
            },
        }
    }
}

pub struct EventRecorder {
    pool: WorkerPool<EventJob>,
    store: Arc<dyn EventStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn EventStore>, workers: usize, capacity: usize) -> Self {
        let handler = Arc::new(Persist {
            store: store.clone(),
        });
        Self {
            pool: WorkerPool::new("events", workers, capacity, handler),
            store,
        }
    }

    /// Enqueue the draft record; false if it was dropped
    pub fn record(&self, event: DetectionEvent) -> bool {
        self.enqueue(EventJob::Draft(event))
    }

    /// Enqueue the image amendment for a recorded draft
    pub fn attach_image(&self, event_id: Uuid, image_path: impl Into<String>) -> bool {
        self.enqueue(EventJob::AttachImage {
            event_id,
            image_path: image_path.into(),
        })
    }

    fn enqueue(&self, job: EventJob) -> bool {
        // both phases of one event share a worker, so the amend follows the insert
        let event_id = job.event_id();
        match self.pool.submit_keyed(&event_id, job) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Event dropped");
                false
            }
        }
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
