//! AlertRouter - asynchronous alert delivery
//!
//! ## Responsibilities
//!
//! - Queue text and image alerts on a bounded worker pool
//! - One delivery attempt per alert; failures are logged and dropped
//! - Telegram Bot API channel
//!
//! The dispatch loop only enqueues. It never waits for delivery.

mod telegram;

pub use telegram::TelegramChannel;

use crate::worker_pool::{JobHandler, WorkerPool, WorkerPoolStats};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Alert delivery channel
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send_text(&self, message: &str) -> Result<()>;
    async fn send_image(&self, path: &Path, caption: &str) -> Result<()>;
}

/// Queued alert
#[derive(Debug, Clone, PartialEq)]
pub enum AlertRequest {
    Text { message: String },
    Image { path: PathBuf, caption: String },
}

impl AlertRequest {
    fn kind(&self) -> &'static str {
        match self {
            AlertRequest::Text { .. } => "text",
            AlertRequest::Image { .. } => "image",
        }
    }
}

/// Alert text used for both tiers
pub fn format_alert_message(
    track_id: i64,
    confidence: f32,
    camera_name: &str,
    at: DateTime<Local>,
) -> String {
    format!(
        "🚨 Person Detected!\n🧍 ID: {}\n🎯 Confidence: {:.2}\n📍 Camera: {}\n🕒 {}",
        track_id,
        confidence,
        camera_name,
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Channel for deployments without a bot token; alerts only reach the log
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn send_text(&self, message: &str) -> Result<()> {
        tracing::info!(message = %message, "Alert");
        Ok(())
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<()> {
        tracing::info!(path = %path.display(), caption = %caption, "Alert with snapshot");
        Ok(())
    }
}

struct Delivery {
    channel: Arc<dyn AlertChannel>,
}

#[async_trait]
impl JobHandler<AlertRequest> for Delivery {
    async fn handle(&self, request: AlertRequest) {
        let kind = request.kind();
        let result = match &request {
            AlertRequest::Text { message } => self.channel.send_text(message).await,
            AlertRequest::Image { path, caption } => {
                self.channel.send_image(path, caption).await
            }
        };

        match result {
            Ok(()) => tracing::debug!(kind, "Alert delivered"),
            Err(e) => tracing::warn!(kind, error = %e, "Alert delivery failed, dropping"),
        }
    }
}

pub struct AlertRouter {
    pool: WorkerPool<AlertRequest>,
}

impl AlertRouter {
    pub fn new(channel: Arc<dyn AlertChannel>, workers: usize, capacity: usize) -> Self {
        Self {
            pool: WorkerPool::new("alerts", workers, capacity, Arc::new(Delivery { channel })),
        }
    }

    /// Enqueue a text alert; false if it was dropped
    pub fn send_text(&self, message: impl Into<String>) -> bool {
        self.enqueue(AlertRequest::Text {
            message: message.into(),
        })
    }

    /// Enqueue an image alert; false if it was dropped
    pub fn send_image(&self, path: impl Into<PathBuf>, caption: impl Into<String>) -> bool {
        self.enqueue(AlertRequest::Image {
            path: path.into(),
            caption: caption.into(),
        })
    }

    fn enqueue(&self, request: AlertRequest) -> bool {
        let kind = request.kind();
        match self.pool.submit(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(kind, error = %e, "Alert dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    /// Deliver what is queued, then stop
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
