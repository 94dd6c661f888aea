//! camguard - multi-camera detection and alerting pipeline
//!
//! Main entry point.

use camguard::state::{AppConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camguard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camguard v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        profile = ?config.profile,
        config_path = ?config.config_path,
        detector_url = %config.detector_url,
        snapshot_dir = %config.snapshot_dir.display(),
        database = config.database_url.is_some(),
        api = config.api_base_url.is_some(),
        "Configuration loaded"
    );

    let state = AppState::build(&config).await?;

    let cameras = state.registry.list_cameras().await?;
    if cameras.is_empty() {
        anyhow::bail!("No cameras configured");
    }
    for camera in cameras {
        state.fleet.add_camera(camera).await;
    }

    for (camera_id, result) in state.fleet.start_all().await {
        if let Err(e) = result {
            tracing::error!(camera_id = %camera_id, error = %e, "Camera failed to start");
        }
    }
    state.fleet.start_health_monitor().await;
    tracing::info!(
        cameras = state.fleet.camera_ids().await.len(),
        "Pipeline running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    state.shutdown().await;

    let alerts = state.alerts.stats();
    let events = state.events.stats();
    tracing::info!(
        alerts_submitted = alerts.submitted,
        alerts_rejected = alerts.rejected,
        events_submitted = events.submitted,
        events_rejected = events.rejected,
        "Stopped"
    );

    Ok(())
}
