//! Detection capability adapter
//!
//! ## Responsibilities
//!
//! - `Detector` trait: frame in, tracked detections out
//! - HTTP detector client (multipart JPEG upload)
//! - Coordinate scaling from detection resolution back to the frame

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounding box (x1, y1, x2, y2), serialized as a 4-element array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Integer pixel corners, the form stored in event metadata
    pub fn to_pixels(&self) -> [i32; 4] {
        [
            self.x1.round() as i32,
            self.y1.round() as i32,
            self.x2.round() as i32,
            self.y2.round() as i32,
        ]
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Detection as returned by the capability, in detection-resolution pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "label", alias = "class_name")]
    pub class: String,
    pub confidence: f32,
    pub bbox: BBox,
    #[serde(default, alias = "id")]
    pub track_id: Option<i64>,
}

/// Tracked detection in original-frame coordinates, valid for one dispatch cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub track_id: i64,
    pub class: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub camera_id: String,
    pub timestamp: DateTime<Local>,
}

impl Detection {
    /// Attach camera and time; detections without a track id yield None
    pub fn from_raw(
        raw: RawDetection,
        camera_id: &str,
        timestamp: DateTime<Local>,
        scale: (f32, f32),
    ) -> Option<Self> {
        let track_id = raw.track_id?;
        Some(Self {
            track_id,
            class: raw.class,
            confidence: raw.confidence,
            bbox: raw.bbox.scale(scale.0, scale.1),
            camera_id: camera_id.to_string(),
            timestamp,
        })
    }
}

/// Ratio mapping detection-space coordinates onto the original frame
pub fn scale_factors(detected: (u32, u32), original: (u32, u32)) -> (f32, f32) {
    if detected.0 == 0 || detected.1 == 0 {
        return (1.0, 1.0);
    }
    (
        original.0 as f32 / detected.0 as f32,
        original.1 as f32 / detected.1 as f32,
    )
}

/// Object detection/tracking capability
///
/// `camera_id` keys the tracker session so track ids stay stable across
/// calls for the same stream.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, camera_id: &str, frame: &RgbImage) -> Result<Vec<RawDetection>>;
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

/// Detection server client
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
    jpeg_quality: u8,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jpeg_quality: 85,
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, camera_id: &str, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let url = format!("{}/v1/detect", self.base_url);
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;

        let form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("camera_id", camera_id.to_string())
            .text("persist", "true");

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detection(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Detection(format!(
                "detector returned {}",
                resp.status()
            )));
        }

        let body: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("invalid response: {}", e)))?;
        Ok(body.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detector_response() {
        let body: DetectResponse = serde_json::from_str(
            r#"{"detections": [
                {"class": "person", "confidence": 0.82, "bbox": [10, 20, 110, 220], "track_id": 7},
                {"class": "person", "confidence": 0.40, "bbox": [0, 0, 5, 5]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(body.detections.len(), 2);
        assert_eq!(body.detections[0].track_id, Some(7));
        assert_eq!(body.detections[0].bbox, BBox::new(10.0, 20.0, 110.0, 220.0));
        assert_eq!(body.detections[1].track_id, None);
    }

    #[test]
    fn test_missing_track_id_is_discarded() {
        let raw = RawDetection {
            class: "person".to_string(),
            confidence: 0.99,
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            track_id: None,
        };
        assert!(Detection::from_raw(raw, "cam-1", Local::now(), (1.0, 1.0)).is_none());
    }

    #[test]
    fn test_scale_back_to_original() {
        let scale = scale_factors((1280, 720), (1920, 1080));
        assert_eq!(scale, (1.5, 1.5));

        let raw = RawDetection {
            class: "person".to_string(),
            confidence: 0.7,
            bbox: BBox::new(100.0, 50.0, 200.0, 300.0),
            track_id: Some(3),
        };
        let det = Detection::from_raw(raw, "cam-1", Local::now(), scale).unwrap();
        assert_eq!(det.bbox, BBox::new(150.0, 75.0, 300.0, 450.0));
        assert_eq!(det.bbox.to_pixels(), [150, 75, 300, 450]);
    }

    #[test]
    fn test_scale_factors_degenerate() {
        assert_eq!(scale_factors((0, 0), (640, 480)), (1.0, 1.0));
        assert_eq!(scale_factors((640, 480), (640, 480)), (1.0, 1.0));
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let jpeg = encode_jpeg(&RgbImage::new(8, 8), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
