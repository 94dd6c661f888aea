//! ffmpeg-backed video source
//!
//! Decodes the stream to raw RGB24 on ffmpeg's stdout and reads it back in
//! exact frame-sized chunks.

use super::{VideoSource, VideoStream};
use crate::config_store::Resolution;
use crate::{Error, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Spawns one ffmpeg process per opened stream
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    binary: String,
    output: Resolution,
}

impl FfmpegSource {
    pub fn new(output: Resolution) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            output,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn args(&self, address: &str) -> Vec<String> {
        let mut args = Vec::new();
        if address.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        let size = format!("{}x{}", self.output.width, self.output.height);
        let rest: [&str; 12] = [
            "-i", address, "-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size,
            "-loglevel", "error", "-",
        ];
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }
}

impl VideoSource for FfmpegSource {
    fn open(&self, address: &str) -> Result<Box<dyn VideoStream>> {
        let mut child = Command::new(&self.binary)
            .args(self.args(address))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;

        let mut stream = FfmpegStream {
            child,
            stdout,
            size: self.output,
            pending: None,
        };

        // ffmpeg starts even for unreachable addresses; the first frame is the
        // real open check
        match stream.read_raw()? {
            Some(first) => {
                stream.pending = Some(first);
                Ok(Box::new(stream))
            }
            None => Err(Error::FrameRead(format!(
                "ffmpeg produced no frames for {}",
                address
            ))),
        }
    }
}

struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
    size: Resolution,
    pending: Option<RgbImage>,
}

impl FfmpegStream {
    fn read_raw(&mut self) -> Result<Option<RgbImage>> {
        let mut buf = vec![0u8; self.size.rgb_frame_len()];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => Ok(RgbImage::from_raw(self.size.width, self.size.height, buf)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::FrameRead(e.to_string())),
        }
    }
}

impl VideoStream for FfmpegStream {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.read_raw()
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
