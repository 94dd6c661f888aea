//! In-memory event store (ring buffer)
//!
//! Used when no database is configured, and by tests.

use super::{DashboardStats, DetectionEvent, EventFilter, EventStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct MemoryEventStore {
    events: RwLock<VecDeque<DetectionEvent>>,
    capacity: usize,
}

impl MemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(2000)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: &DetectionEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }

    async fn attach_image(&self, event_id: Uuid, image_path: &str) -> Result<()> {
        let mut events = self.events.write().await;
        match events.iter_mut().rev().find(|e| e.id == event_id) {
            Some(event) => {
                event.image_path = Some(image_path.to_string());
                Ok(())
            }
            None => Err(Error::Store(format!("event {} not found", event_id))),
        }
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<DetectionEvent> =
            events.iter().filter(|e| filter.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let events = self.events.read().await;
        let cameras: HashSet<&str> = events.iter().map(|e| e.camera_id.as_str()).collect();
        let subjects: HashSet<(&str, i64)> = events
            .iter()
            .map(|e| (e.camera_id.as_str(), e.subject_id))
            .collect();

        Ok(DashboardStats {
            total_events: events.len() as i64,
            active_devices: cameras.len() as i64,
            people_detected: subjects.len() as i64,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use chrono::{Duration, TimeZone, Utc};

    fn event(camera: &str, subject: i64, minute: u32) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            subject_id: subject,
            confidence: 0.7,
            camera_id: camera.to_string(),
            camera_name: camera.to_uppercase(),
            image_path: None,
            alert_sent: true,
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_ring_buffer_evicts_oldest() {
        let store = MemoryEventStore::new(2);
        store.insert(&event("a", 1, 0)).await.unwrap();
        store.insert(&event("a", 2, 1)).await.unwrap();
        store.insert(&event("a", 3, 2)).await.unwrap();

        let events = store.query(&EventFilter::default()).await.unwrap();
        let subjects: Vec<i64> = events.iter().map(|e| e.subject_id).collect();
        assert_eq!(subjects, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_query_filters_and_limits() {
        let store = MemoryEventStore::new(100);
        for minute in 0..5 {
            store.insert(&event("a", 7, minute)).await.unwrap();
        }
        store.insert(&event("b", 9, 10)).await.unwrap();

        let filter = EventFilter {
            camera_id: Some("a".to_string()),
            since: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap()),
            limit: Some(2),
            ..Default::default()
        };
        let events = store.query(&filter).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp.format("%M").to_string(), "04");

        let until = EventFilter {
            until: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(30)),
            ..Default::default()
        };
        assert_eq!(store.query(&until).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let store = MemoryEventStore::new(100);
        store.insert(&event("a", 7, 0)).await.unwrap();
        store.insert(&event("a", 7, 1)).await.unwrap();
        store.insert(&event("b", 7, 2)).await.unwrap();

        let stats = store.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.active_devices, 2);
        assert_eq!(stats.people_detected, 2);
    }
}
