//! camguard - multi-camera detection and alerting pipeline
//!
//! ## Architecture
//!
//! 1. ConfigStore - profile presets and JSON overrides
//! 2. StreamSource - per-camera acquisition thread with reconnect
//! 3. FrameBuffer - bounded drop-oldest frame queue
//! 4. Detection - detector service adapter
//! 5. Dispatcher - filtering, cooldown, alert tiers, persistence requests
//! 6. AlertRouter - queued alert delivery
//! 7. EventRecorder - queued event persistence
//! 8. HealthMonitor - heartbeat-derived camera status
//! 9. CameraRegistry - camera list at startup
//! 10. Fleet - per-camera lifecycle
//!
//! Acquisition runs on plain threads (blocking decoder reads); everything
//! downstream of the FrameBuffer runs on the tokio runtime.

pub mod alert_router;
pub mod camera_registry;
pub mod config_store;
pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod event_recorder;
pub mod fleet;
pub mod frame_buffer;
pub mod health_monitor;
pub mod state;
pub mod stream_source;
pub mod worker_pool;

pub use error::{Error, Result};
pub use state::AppState;
