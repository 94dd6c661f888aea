//! Camera Status Tracker
//!
//! Remembers the last derived status per camera so that only transitions are
//! logged. Reporting to the status API still happens every tick.

use super::CameraStatus;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Online to Offline, or the first status seen is Offline
    Lost,
    /// Offline to Online
    Recovered,
}

/// Tracks per-camera status and detects transitions
pub struct CameraStatusTracker {
    statuses: RwLock<HashMap<String, CameraStatus>>,
}

impl CameraStatusTracker {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Record a status and return the transition it caused, if any
    pub async fn update_status(
        &self,
        camera_id: &str,
        status: CameraStatus,
    ) -> Option<CameraStatusEvent> {
        let prev = self
            .statuses
            .write()
            .await
            .insert(camera_id.to_string(), status);

        match (prev, status) {
            (Some(CameraStatus::Online), CameraStatus::Offline) => {
                tracing::warn!(camera_id = %camera_id, "Camera connection lost");
                Some(CameraStatusEvent::Lost)
            }
            (Some(CameraStatus::Offline), CameraStatus::Online) => {
                tracing::info!(camera_id = %camera_id, "Camera connection recovered");
                Some(CameraStatusEvent::Recovered)
            }
            (None, CameraStatus::Offline) => {
                tracing::warn!(camera_id = %camera_id, "Camera offline on first check - marking as lost");
                Some(CameraStatusEvent::Lost)
            }
            _ => None,
        }
    }

    /// Last recorded status, None if never checked
    pub async fn get_status(&self, camera_id: &str) -> Option<CameraStatus> {
        self.statuses.read().await.get(camera_id).copied()
    }

    pub async fn get_offline_cameras(&self) -> Vec<String> {
        self.statuses
            .read()
            .await
            .iter()
            .filter(|(_, status)| **status == CameraStatus::Offline)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Forget a camera (stopped or removed)
    pub async fn remove(&self, camera_id: &str) {
        self.statuses.write().await.remove(camera_id);
    }
}

impl Default for CameraStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
