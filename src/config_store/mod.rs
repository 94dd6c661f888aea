//! ConfigStore - pipeline configuration
//!
//! ## Responsibilities
//!
//! - Preset selection (single camera / fleet)
//! - JSON file overrides on top of the preset
//! - Range validation before any camera starts
//!
//! All services read their thresholds from the `PipelineConfig` held here.

mod types;

pub use types::*;

use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Loaded pipeline configuration
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: PipelineConfig,
    source: Option<PathBuf>,
}

impl ConfigStore {
    /// Wrap an already-built configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source: None,
        })
    }

    /// Load the profile preset, then apply the JSON file at `path` on top
    pub fn load(path: Option<&Path>, profile: Profile) -> Result<Self> {
        let preset = PipelineConfig::for_profile(profile);

        let Some(path) = path else {
            tracing::info!(profile = ?profile, "No config file given, using preset");
            return Self::from_config(preset);
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::apply_overrides(preset, &raw)?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            profile = ?profile,
            cameras = config.cameras.len(),
            "Pipeline config loaded"
        );

        Ok(Self {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// Merge a JSON document onto a preset; keys absent from the document keep
    /// the preset value
    pub fn apply_overrides(preset: PipelineConfig, json: &str) -> Result<PipelineConfig> {
        let overrides: Value = serde_json::from_str(json)?;
        if !overrides.is_object() {
            return Err(Error::Config(
                "Pipeline config must be a JSON object".to_string(),
            ));
        }
        let mut base = serde_json::to_value(preset)?;
        merge(&mut base, overrides);
        Ok(serde_json::from_value(base)?)
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cameras(&self) -> &[CameraConfig] {
        &self.config.cameras
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge(slot, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_keep_preset_values() {
        let config = ConfigStore::apply_overrides(
            PipelineConfig::single_camera(),
            r#"{"cooldownSeconds": 30, "reconnect": {"attempts": 5}}"#,
        )
        .unwrap();

        assert_eq!(config.cooldown_seconds, 30);
        assert_eq!(config.reconnect.attempts, 5);
        // untouched nested and top-level keys come from the preset
        assert_eq!(config.reconnect.initial_delay_ms, 500);
        assert_eq!(config.queue_depth, 5);
        assert_eq!(config.confidence_threshold, 0.3);
    }

    #[test]
    fn test_overrides_cameras_and_window() {
        let config = ConfigStore::apply_overrides(
            PipelineConfig::fleet(),
            r#"{
                "alertWindow": {"start": "08:00", "end": "05:00"},
                "detectionResolution": null,
                "cameras": [
                    {"id": "1", "name": "Office", "stream_address": "rtsp://a", "location": "HQ"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.cameras.len(), 1);
        assert_eq!(config.cameras[0].location_label(), "HQ");
        assert!(config.detection_resolution.is_none());
        assert_eq!(config.alert_window.start.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn test_non_object_rejected() {
        let result = ConfigStore::apply_overrides(PipelineConfig::fleet(), "[1, 2]");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::fleet();
        config.confidence_threshold = -0.1;
        assert!(ConfigStore::from_config(config).is_err());
    }

    #[test]
    fn test_load_without_file_uses_preset() {
        let store = ConfigStore::load(None, Profile::SingleCamera).unwrap();
        assert_eq!(store.pipeline().queue_depth, 5);
        assert!(store.source().is_none());
        assert!(store.cameras().is_empty());
    }
}
