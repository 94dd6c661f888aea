//! PostgreSQL event store
//!
//! Every call opens its own transaction on a pooled connection. The
//! transaction rolls back and the connection returns to the pool on any
//! early return.

use super::{DashboardStats, DetectionEvent, EventFilter, EventStore};
use crate::detection::BBox;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use uuid::Uuid;

const SELECT_EVENTS: &str = r#"
    SELECT
        id, timestamp, person_id::int8 AS person_id, confidence::float8 AS confidence,
        camera_id, camera_name, image_path, alert_sent,
        bbox_x1::float8 AS bbox_x1, bbox_y1::float8 AS bbox_y1,
        bbox_x2::float8 AS bbox_x2, bbox_y2::float8 AS bbox_y2,
        metadata
    FROM detection_events
    WHERE 1=1
"#;

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_event(row: PgRow) -> Result<DetectionEvent> {
        let bbox = BBox::new(
            row.try_get::<Option<f64>, _>("bbox_x1")?.unwrap_or(0.0) as f32,
            row.try_get::<Option<f64>, _>("bbox_y1")?.unwrap_or(0.0) as f32,
            row.try_get::<Option<f64>, _>("bbox_x2")?.unwrap_or(0.0) as f32,
            row.try_get::<Option<f64>, _>("bbox_y2")?.unwrap_or(0.0) as f32,
        );

        Ok(DetectionEvent {
            id: row.try_get("id")?,
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            subject_id: row.try_get("person_id")?,
            confidence: row.try_get::<f64, _>("confidence")? as f32,
            camera_id: row.try_get("camera_id")?,
            camera_name: row
                .try_get::<Option<String>, _>("camera_name")?
                .unwrap_or_default(),
            image_path: row.try_get("image_path")?,
            alert_sent: row.try_get::<Option<bool>, _>("alert_sent")?.unwrap_or(false),
            bbox,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")?
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: &DetectionEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO detection_events (
                id, timestamp, person_id, confidence,
                camera_id, camera_name, image_path, alert_sent,
                bbox_x1, bbox_y1, bbox_x2, bbox_y2,
                metadata
            ) VALUES (
                $1, $2, $3, $4,
                $5, $6, $7, $8,
                $9, $10, $11, $12,
                $13
            )
            "#,
        )
        .bind(event.id)
        .bind(event.timestamp)
        .bind(event.subject_id)
        .bind(event.confidence as f64)
        .bind(&event.camera_id)
        .bind(&event.camera_name)
        .bind(&event.image_path)
        .bind(event.alert_sent)
        .bind(event.bbox.x1 as f64)
        .bind(event.bbox.y1 as f64)
        .bind(event.bbox.x2 as f64)
        .bind(event.bbox.y2 as f64)
        .bind(&event.metadata)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn attach_image(&self, event_id: Uuid, image_path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE detection_events SET image_path = $1 WHERE id = $2")
            .bind(image_path)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Store(format!("event {} not found", event_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_EVENTS);

        if let Some(camera_id) = &filter.camera_id {
            qb.push(" AND camera_id = ").push_bind(camera_id.clone());
        }
        if let Some(name) = &filter.camera_name {
            qb.push(" AND camera_name ILIKE ")
                .push_bind(format!("%{}%", name));
        }
        if let Some(subject) = filter.subject_id {
            qb.push(" AND person_id = ").push_bind(subject);
        }
        if let Some(since) = filter.since {
            qb.push(" AND timestamp >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND timestamp <= ").push_bind(until);
        }
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(filter.limit() as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);

        let mut tx = self.pool.begin().await?;
        let rows = qb.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let mut tx = self.pool.begin().await?;
        let raw = sqlx::query_scalar::<_, serde_json::Value>("SELECT get_dashboard_stats()::json")
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(serde_json::from_value(raw)?)
    }
}
