//! CameraFleetManager - owns every camera's acquisition/dispatch pair
//!
//! ## Responsibilities
//!
//! - Start and stop cameras independently (no ordering between cameras)
//! - Bounded join on stop; a stuck acquisition thread is detached, not awaited
//! - Best-effort online/offline reports on start/stop
//! - Run the HealthMonitor alongside the cameras
//!
//! A failure inside one camera never reaches the fleet: start/stop results
//! are per camera and the manager keeps serving the others.

mod worker;

pub use worker::WorkerState;

use crate::config_store::{CameraConfig, PipelineConfig};
use crate::dispatcher::{DetectionDispatcher, DispatcherServices};
use crate::error::{Error, Result};
use crate::frame_buffer::FrameBuffer;
use crate::health_monitor::{CameraHealth, CameraStatus, HealthMonitor};
use crate::stream_source::{heartbeat, AcquisitionLoop, VideoSource};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use worker::{join_thread, CameraWorker, JoinOutcome};

/// Everything a camera worker needs
#[derive(Clone)]
pub struct FleetServices {
    pub source: Arc<dyn VideoSource>,
    pub dispatch: DispatcherServices,
    pub monitor: Arc<HealthMonitor>,
    pub config: Arc<PipelineConfig>,
}

/// Read-only view of one camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraSnapshot {
    pub camera_id: String,
    pub name: String,
    pub state: WorkerState,
    pub acquisition_halted: bool,
    pub buffered_frames: usize,
}

pub struct CameraFleetManager {
    services: FleetServices,
    workers: RwLock<HashMap<String, Arc<Mutex<CameraWorker>>>>,
    join_timeout: Duration,
    monitor_shutdown: watch::Sender<bool>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl CameraFleetManager {
    pub fn new(services: FleetServices) -> Self {
        let join_timeout = services.config.stop_join_timeout();
        let (monitor_shutdown, _) = watch::channel(false);
        Self {
            services,
            workers: RwLock::new(HashMap::new()),
            join_timeout,
            monitor_shutdown,
            monitor_task: Mutex::new(None),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Register a camera in the stopped state; false if the id is taken
    pub async fn add_camera(&self, camera: CameraConfig) -> bool {
        let mut workers = self.workers.write().await;
        if workers.contains_key(&camera.id) {
            tracing::warn!(camera_id = %camera.id, "Camera already registered");
            return false;
        }
        workers.insert(
            camera.id.clone(),
            Arc::new(Mutex::new(CameraWorker::new(camera))),
        );
        true
    }

    pub async fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn worker(&self, camera_id: &str) -> Result<Arc<Mutex<CameraWorker>>> {
        self.workers
            .read()
            .await
            .get(camera_id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown camera {}", camera_id)))
    }

    pub async fn state(&self, camera_id: &str) -> Option<WorkerState> {
        let worker = self.worker(camera_id).await.ok()?;
        let state = worker.lock().await.state;
        Some(state)
    }

    pub async fn snapshot(&self) -> Vec<CameraSnapshot> {
        let workers: Vec<_> = self.workers.read().await.values().cloned().collect();
        let mut snapshot = Vec::with_capacity(workers.len());
        for worker in workers {
            let w = worker.lock().await;
            snapshot.push(CameraSnapshot {
                camera_id: w.camera.id.clone(),
                name: w.camera.name.clone(),
                state: w.state,
                acquisition_halted: w.acquisition_halted(),
                buffered_frames: w.buffer.as_ref().map(|b| b.len()).unwrap_or(0),
            });
        }
        snapshot.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        snapshot
    }

    /// Current heartbeat-derived health of running cameras
    pub async fn health(&self) -> Vec<CameraHealth> {
        self.services.monitor.snapshot_at(Utc::now()).await
    }

    /// Start one camera; no-op if it is already running
    pub async fn start_camera(&self, camera_id: &str) -> Result<()> {
        let worker = self.worker(camera_id).await?;
        let mut w = worker.lock().await;

        if w.state != WorkerState::Stopped {
            tracing::debug!(camera_id = %camera_id, state = ?w.state, "Camera already running");
            return Ok(());
        }
        w.state = WorkerState::Starting;

        let config = &self.services.config;
        let stop = Arc::new(AtomicBool::new(false));
        let buffer = Arc::new(FrameBuffer::new(config.queue_depth));
        let (writer, reader) = heartbeat();
        // grace period until the first frame
        writer.beat();

        let acquisition = AcquisitionLoop::new(
            w.camera.clone(),
            self.services.source.clone(),
            buffer.clone(),
            writer,
            config.reconnect,
            stop.clone(),
        )
        .resize_to(if config.resize_on_acquire {
            config.detection_resolution
        } else {
            None
        });

        let thread_camera_id = camera_id.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("acq-{}", camera_id))
            .spawn(move || {
                let result = acquisition.run();
                if let Err(e) = &result {
                    tracing::error!(
                        camera_id = %thread_camera_id,
                        code = e.code(),
                        error = %e,
                        "Acquisition halted"
                    );
                }
                result
            });
        let acquisition_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                w.state = WorkerState::Stopped;
                tracing::error!(camera_id = %camera_id, error = %e, "Failed to spawn acquisition thread");
                return Err(Error::Io(e));
            }
        };

        let dispatcher = DetectionDispatcher::new(
            w.camera.clone(),
            config.clone(),
            self.services.dispatch.clone(),
        );
        let dispatch_handle = tokio::spawn(dispatcher.run(buffer.clone(), stop.clone()));

        self.services.monitor.watch(camera_id, reader.clone()).await;

        w.stop = stop;
        w.acquisition = Some(acquisition_handle);
        w.dispatch = Some(dispatch_handle);
        w.heartbeat = Some(reader);
        w.buffer = Some(buffer);
        w.state = WorkerState::Running;
        drop(w);

        tracing::info!(camera_id = %camera_id, "Camera started");
        self.services
            .monitor
            .report(camera_id, CameraStatus::Online)
            .await;
        Ok(())
    }

    /// Stop one camera, waiting at most the join timeout in total
    pub async fn stop_camera(&self, camera_id: &str) -> Result<()> {
        let worker = self.worker(camera_id).await?;
        let mut w = worker.lock().await;

        if w.state == WorkerState::Stopped {
            return Ok(());
        }
        w.state = WorkerState::Stopping;
        w.stop.store(true, Ordering::Release);
        // one budget for the whole stop, shared by both joins
        let deadline = Instant::now() + self.join_timeout;

        if let Some(handle) = w.acquisition.take() {
            match join_thread(handle, deadline).await {
                JoinOutcome::Joined(Ok(stats)) => tracing::debug!(
                    camera_id = %camera_id,
                    frames = stats.frames,
                    reconnects = stats.reconnects,
                    "Acquisition joined"
                ),
                // already logged by the thread
                JoinOutcome::Joined(Err(_)) => {}
                JoinOutcome::Panicked => {
                    tracing::error!(camera_id = %camera_id, "Acquisition thread panicked")
                }
                JoinOutcome::TimedOut => tracing::warn!(
                    camera_id = %camera_id,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "Acquisition did not stop in time, detaching"
                ),
            }
        }

        if let Some(mut task) = w.dispatch.take() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(camera_id = %camera_id, error = %e, "Dispatch task failed")
                }
                Err(_) => {
                    task.abort();
                    tracing::warn!(camera_id = %camera_id, "Dispatch task did not stop in time, aborted");
                }
            }
        }

        self.services.monitor.unwatch(camera_id).await;
        w.heartbeat = None;
        w.buffer = None;
        w.state = WorkerState::Stopped;
        drop(w);

        tracing::info!(camera_id = %camera_id, "Camera stopped");
        self.services
            .monitor
            .report(camera_id, CameraStatus::Offline)
            .await;
        Ok(())
    }

    /// Start every registered camera concurrently
    pub async fn start_all(&self) -> Vec<(String, Result<()>)> {
        let ids = self.camera_ids().await;
        let results =
            futures::future::join_all(ids.iter().map(|id| self.start_camera(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// Stop every registered camera concurrently
    pub async fn stop_all(&self) -> Vec<(String, Result<()>)> {
        let ids = self.camera_ids().await;
        let results =
            futures::future::join_all(ids.iter().map(|id| self.stop_camera(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// Spawn the health monitor task (once)
    pub async fn start_health_monitor(&self) {
        let mut task = self.monitor_task.lock().await;
        if task.is_some() {
            return;
        }
        let _ = self.monitor_shutdown.send(false);
        let rx = self.monitor_shutdown.subscribe();
        *task = Some(self.services.monitor.clone().spawn(rx));
    }

    /// Stop every camera, then the health monitor
    pub async fn shutdown(&self) {
        for (camera_id, result) in self.stop_all().await {
            if let Err(e) = result {
                tracing::warn!(camera_id = %camera_id, error = %e, "Camera stop failed");
            }
        }

        let _ = self.monitor_shutdown.send(true);
        if let Some(task) = self.monitor_task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }
    }
}
