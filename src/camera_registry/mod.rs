//! CameraRegistry - source of the camera list at fleet start
//!
//! - `HttpCameraRegistry`: `GET {API_BASE}/cameras` on the backend API
//! - `StaticCameraRegistry`: cameras listed in the pipeline config file

use crate::config_store::CameraConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait CameraRegistry: Send + Sync {
    async fn list_cameras(&self) -> Result<Vec<CameraConfig>>;
}

/// Fixed camera list
pub struct StaticCameraRegistry {
    cameras: Vec<CameraConfig>,
}

impl StaticCameraRegistry {
    pub fn new(cameras: Vec<CameraConfig>) -> Self {
        Self { cameras }
    }
}

#[async_trait]
impl CameraRegistry for StaticCameraRegistry {
    async fn list_cameras(&self) -> Result<Vec<CameraConfig>> {
        Ok(self.cameras.clone())
    }
}

/// Camera row as served by the backend API
#[derive(Debug, Deserialize)]
struct CameraRow {
    id: serde_json::Value,
    name: String,
    rtsp_url: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

impl CameraRow {
    fn into_config(self) -> Option<CameraConfig> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let address = self.rtsp_url.filter(|u| !u.trim().is_empty())?;
        Some(CameraConfig {
            id,
            name: self.name,
            stream_address: address,
            location: self.location,
        })
    }
}

pub struct HttpCameraRegistry {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCameraRegistry {
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

    fn parse(body: &str) -> Result<Vec<CameraConfig>> {
        let rows: Vec<CameraRow> = serde_json::from_str(body)?;
        let total = rows.len();
        let cameras: Vec<CameraConfig> = rows.into_iter().filter_map(CameraRow::into_config).collect();
        if cameras.len() < total {
            tracing::warn!(
                skipped = total - cameras.len(),
                "Cameras without a stream address skipped"
            );
        }
        Ok(cameras)
    }
}

#[async_trait]
impl CameraRegistry for HttpCameraRegistry {
    async fn list_cameras(&self) -> Result<Vec<CameraConfig>> {
        let url = format!("{}/cameras", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Config(format!(
                "camera registry returned {}",
                resp.status()
            )));
        }

        let cameras = Self::parse(&resp.text().await?)?;
        tracing::info!(count = cameras.len(), url = %url, "Cameras loaded from registry");
        Ok(cameras)
    }
}
