//! Annotated alert snapshots

use crate::detection::{encode_jpeg, Detection};
use crate::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;

/// Writes `alert_{8 hex}.jpg` files into one directory
pub struct SnapshotWriter {
    dir: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quality: 90,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Draw every detection box onto a copy of the frame
    pub fn render(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        for detection in detections {
            let [x1, y1, x2, y2] = detection.bbox.to_pixels();
            for inset in 0..BOX_THICKNESS {
                let left = (x1 + inset).clamp(0, width as i32 - 1);
                let top = (y1 + inset).clamp(0, height as i32 - 1);
                let right = (x2 - inset).clamp(0, width as i32 - 1);
                let bottom = (y2 - inset).clamp(0, height as i32 - 1);
                if right <= left || bottom <= top {
                    break;
                }
                let rect = Rect::at(left, top)
                    .of_size((right - left) as u32 + 1, (bottom - top) as u32 + 1);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }
        }
        canvas
    }

    /// Render and write the snapshot, returning its path
    pub async fn save(&self, frame: &RgbImage, detections: &[Detection]) -> Result<PathBuf> {
        let annotated = Self::render(frame, detections);
        let jpeg = encode_jpeg(&annotated, self.quality)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("alert_{}.jpg", &Uuid::new_v4().simple().to_string()[..8]);
        let path = self.dir.join(name);
        tokio::fs::write(&path, jpeg).await?;

        tracing::debug!(path = %path.display(), boxes = detections.len(), "Snapshot saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use chrono::Local;

    fn detection(bbox: BBox) -> Detection {
        Detection {
            track_id: 1,
            class: "person".to_string(),
            confidence: 0.9,
            bbox,
            camera_id: "cam-1".to_string(),
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_render_draws_box_edges() {
        let frame = RgbImage::new(32, 32);
        let out = SnapshotWriter::render(&frame, &[detection(BBox::new(4.0, 4.0, 20.0, 20.0))]);

        assert_eq!(*out.get_pixel(4, 10), BOX_COLOR);
        assert_eq!(*out.get_pixel(5, 10), BOX_COLOR);
        assert_eq!(*out.get_pixel(12, 12), Rgb([0, 0, 0]));
        // source frame untouched
        assert_eq!(*frame.get_pixel(4, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_clamps_out_of_frame_boxes() {
        let frame = RgbImage::new(16, 16);
        let out = SnapshotWriter::render(
            &frame,
            &[
                detection(BBox::new(-10.0, -10.0, 100.0, 100.0)),
                detection(BBox::new(5.0, 5.0, 5.0, 5.0)),
            ],
        );
        assert_eq!(*out.get_pixel(0, 0), BOX_COLOR);
    }

    #[tokio::test]
    async fn test_save_names_file() {
        let dir = std::env::temp_dir().join(format!("camguard-snap-{}", Uuid::new_v4()));
        let writer = SnapshotWriter::new(&dir);
        let path = writer.save(&RgbImage::new(8, 8), &[]).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("alert_") && name.ends_with(".jpg"));
        assert_eq!(name.len(), "alert_".len() + 8 + ".jpg".len());
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(dir);
    }
}
