//! Application state
//!
//! Environment configuration and the wiring of every shared component

use crate::alert_router::{AlertChannel, AlertRouter, LogAlertChannel, TelegramChannel};
use crate::camera_registry::{CameraRegistry, HttpCameraRegistry, StaticCameraRegistry};
use crate::config_store::{ConfigStore, Profile};
use crate::detection::HttpDetector;
use crate::dispatcher::{DispatcherServices, SnapshotWriter};
use crate::event_recorder::{EventRecorder, EventStore, MemoryEventStore, PgEventStore};
use crate::fleet::{CameraFleetManager, FleetServices};
use crate::health_monitor::{HealthMonitor, HttpStatusSink, LogStatusSink, StatusSink};
use crate::stream_source::FfmpegSource;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// In-memory event capacity when no database is configured
const MEMORY_EVENT_CAPACITY: usize = 2000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres URL; events stay in memory when unset
    pub database_url: Option<String>,
    /// Backend API base (camera list and status updates)
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    /// Detection service base URL
    pub detector_url: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Alert snapshot directory
    pub snapshot_dir: PathBuf,
    /// Pipeline config JSON file
    pub config_path: Option<PathBuf>,
    pub profile: Profile,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: env_opt("DATABASE_URL"),
            api_base_url: env_opt("API_BASE_URL"),
            api_key: env_opt("API_KEY"),
            detector_url: env_opt("DETECTOR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),
            snapshot_dir: env_opt("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("snapshots")),
            config_path: env_opt("CAMGUARD_CONFIG").map(PathBuf::from),
            profile: env_opt("CAMGUARD_PROFILE")
                .and_then(|p| Profile::parse(&p))
                .unwrap_or(Profile::Fleet),
        }
    }
}

/// Shared components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub registry: Arc<dyn CameraRegistry>,
    pub alerts: Arc<AlertRouter>,
    pub events: Arc<EventRecorder>,
    pub monitor: Arc<HealthMonitor>,
    pub fleet: Arc<CameraFleetManager>,
}

impl AppState {
    /// Build every component from the environment configuration
    pub async fn build(app: &AppConfig) -> Result<Self> {
        let config = Arc::new(ConfigStore::load(app.config_path.as_deref(), app.profile)?);
        let pipeline = Arc::new(config.pipeline().clone());

        let store: Arc<dyn EventStore> = match &app.database_url {
            Some(url) => {
                let store = PgEventStore::connect(url).await?;
                tracing::info!("Event store: postgres");
                Arc::new(store)
            }
            None => {
                tracing::warn!(
                    capacity = MEMORY_EVENT_CAPACITY,
                    "DATABASE_URL not set, events kept in memory"
                );
                Arc::new(MemoryEventStore::new(MEMORY_EVENT_CAPACITY))
            }
        };
        let events = Arc::new(EventRecorder::new(
            store,
            pipeline.event_workers,
            pipeline.event_queue_capacity,
        ));

        let channel: Arc<dyn AlertChannel> =
            match (&app.telegram_bot_token, &app.telegram_chat_id) {
                (Some(token), Some(chat_id)) => {
                    tracing::info!("Alert channel: telegram");
                    Arc::new(TelegramChannel::new(token.clone(), chat_id.clone())?)
                }
                _ => {
                    tracing::warn!("Telegram not configured, alerts go to the log only");
                    Arc::new(LogAlertChannel)
                }
            };
        let alerts = Arc::new(AlertRouter::new(
            channel,
            pipeline.alert_workers,
            pipeline.alert_queue_capacity,
        ));

        let (sink, registry): (Arc<dyn StatusSink>, Arc<dyn CameraRegistry>) =
            match &app.api_base_url {
                Some(base) => (
                    Arc::new(HttpStatusSink::new(base.clone(), app.api_key.clone())?),
                    Arc::new(HttpCameraRegistry::new(base.clone(), app.api_key.clone())?),
                ),
                None => (
                    Arc::new(LogStatusSink),
                    Arc::new(StaticCameraRegistry::new(config.cameras().to_vec())),
                ),
            };
        let monitor = Arc::new(HealthMonitor::new(
            sink,
            pipeline.stale_timeout(),
            pipeline.health_poll_interval(),
        ));

        let services = FleetServices {
            source: Arc::new(FfmpegSource::new(pipeline.capture_resolution)),
            dispatch: DispatcherServices {
                detector: Arc::new(HttpDetector::new(app.detector_url.clone())?),
                alerts: alerts.clone(),
                events: events.clone(),
                snapshots: Arc::new(SnapshotWriter::new(app.snapshot_dir.clone())),
            },
            monitor: monitor.clone(),
            config: pipeline,
        };

        Ok(Self {
            config,
            registry,
            alerts,
            events,
            monitor,
            fleet: Arc::new(CameraFleetManager::new(services)),
        })
    }

    /// Stop cameras first, then drain the alert and event queues
    pub async fn shutdown(&self) {
        self.fleet.shutdown().await;
        self.alerts.shutdown().await;
        self.events.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_external_services() {
        let app = AppConfig {
            database_url: None,
            api_base_url: None,
            api_key: None,
            detector_url: "http://127.0.0.1:1".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: Some("42".to_string()),
            snapshot_dir: std::env::temp_dir(),
            config_path: None,
            profile: Profile::SingleCamera,
        };

        let state = AppState::build(&app).await.unwrap();
        assert_eq!(state.config.pipeline().queue_depth, 5);
        assert!(state.registry.list_cameras().await.unwrap().is_empty());
        assert!(state.fleet.camera_ids().await.is_empty());

        state.shutdown().await;
    }
}
