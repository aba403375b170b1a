//! Uncompressed video writer.
//!
//! Writes frames back to back, row-major with interleaved samples, to the output path.
//! Compressed codecs are not available; a requested codec other than raw is logged and
//! the stream is written uncompressed anyway.
//! On finalize a JSON sidecar (`<path>.json`) records the geometry and frame count needed
//! to read the stream back:
//!
//! ```json
//! {"width":752,"height":480,"channels":1,"fps":20,"frames":1200,
//!  "codec":"raw","requested_codec":"vp9","container":"matroska",
//!  "started":"2026-01-01T12:00:00+01:00"}
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use super::{EncoderSettings, Recorder, VideoCodec, VideoContainer};
use crate::frame::Frame;

/// Sidecar metadata describing a raw video file.
#[derive(Debug, Clone, Serialize)]
pub struct RawVideoMetadata {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Samples per pixel
    pub channels: u8,
    /// Nominal frame rate
    pub fps: u32,
    /// Frames written
    pub frames: u64,
    /// Always [`VideoCodec::Raw`]
    pub codec: VideoCodec,
    /// Codec the caller asked for
    pub requested_codec: VideoCodec,
    /// Container requested by the caller
    pub container: VideoContainer,
    /// Time recording was requested
    pub started: DateTime<Local>,
}

struct OpenStream {
    path: PathBuf,
    writer: BufWriter<File>,
    meta: RawVideoMetadata,
}

/// Recorder writing uncompressed frames to disk.
pub struct RawVideoRecorder {
    settings: EncoderSettings,
    stream: Option<OpenStream>,
}

impl RawVideoRecorder {
    /// Create an uninitialized recorder.
    pub fn new() -> Self {
        Self {
            settings: EncoderSettings {
                codec: VideoCodec::Raw,
                ..EncoderSettings::default()
            },
            stream: None,
        }
    }

    /// Path of the sidecar written next to `video`.
    pub fn sidecar_path(video: &Path) -> PathBuf {
        let mut name = video.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl Default for RawVideoRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for RawVideoRecorder {
    fn configure(&mut self, settings: &EncoderSettings) {
        if self.stream.is_none() {
            self.settings = *settings;
        }
    }

    fn initialize(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        is_color: bool,
        started: DateTime<Local>,
    ) -> Result<()> {
        if self.stream.is_some() {
            bail!("Recorder already initialized for another file");
        }
        if self.settings.codec != VideoCodec::Raw {
            tracing::warn!(
                requested = %self.settings.codec,
                "Raw recorder cannot encode this codec, writing uncompressed frames"
            );
        }
        if width == 0 || height == 0 {
            bail!("Invalid frame geometry {}x{}", width, height);
        }

        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        self.stream = Some(OpenStream {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            meta: RawVideoMetadata {
                width,
                height,
                channels: if is_color { 3 } else { 1 },
                fps,
                frames: 0,
                codec: VideoCodec::Raw,
                requested_codec: self.settings.codec,
                container: self.settings.container,
                started,
            },
        });

        tracing::debug!(
            path = ?path,
            dimensions = format!("{}x{}", width, height),
            fps,
            is_color,
            "Opened raw video stream"
        );
        Ok(())
    }

    fn encode_frame(&mut self, frame: &Frame) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("Recorder not initialized"))?;
        let meta = &stream.meta;
        if frame.width != meta.width || frame.height != meta.height || frame.channels != meta.channels
        {
            bail!(
                "Frame {}x{}x{} does not match stream {}x{}x{}",
                frame.width,
                frame.height,
                frame.channels,
                meta.width,
                meta.height,
                meta.channels
            );
        }
        stream
            .writer
            .write_all(&frame.data)
            .with_context(|| format!("Failed to write frame to {:?}", stream.path))?;
        stream.meta.frames += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        stream
            .writer
            .flush()
            .with_context(|| format!("Failed to flush {:?}", stream.path))?;

        let sidecar = Self::sidecar_path(&stream.path);
        let file =
            File::create(&sidecar).with_context(|| format!("Failed to create {:?}", sidecar))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &stream.meta)
            .with_context(|| format!("Failed to write {:?}", sidecar))?;

        tracing::info!(
            path = ?stream.path,
            frames = stream.meta.frames,
            "Wrote raw video"
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_frames_and_sidecar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.mkv");
        let mut rec = RawVideoRecorder::new();

        rec.initialize(&path, 4, 2, 20, false, Local::now()).unwrap();
        rec.encode_frame(&Frame::gray(4, 2, vec![7; 8])).unwrap();
        rec.encode_frame(&Frame::gray(4, 2, vec![9; 8])).unwrap();
        rec.finalize().unwrap();
        assert!(!rec.is_initialized());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..], &[9; 8]);

        let sidecar = std::fs::read_to_string(RawVideoRecorder::sidecar_path(&path)).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(meta["frames"], 2);
        assert_eq!(meta["channels"], 1);
        assert_eq!(meta["codec"], "raw");
        assert_eq!(meta["container"], "matroska");
    }

    #[test]
    fn compressed_codec_falls_back_to_raw() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.mkv");
        let mut rec = RawVideoRecorder::new();
        rec.configure(&EncoderSettings::default());
        rec.initialize(&path, 2, 2, 20, true, Local::now()).unwrap();
        rec.encode_frame(&Frame::zeros(2, 2, 3)).unwrap();
        rec.finalize().unwrap();

        assert_eq!(std::fs::read(&path).unwrap().len(), 12);
        let sidecar = std::fs::read_to_string(RawVideoRecorder::sidecar_path(&path)).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(meta["codec"], "raw");
        assert_eq!(meta["requested_codec"], "vp9");
    }

    #[test]
    fn sidecar_keeps_the_given_start_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.mkv");
        let started = Local::now() - chrono::Duration::seconds(5);
        let mut rec = RawVideoRecorder::new();
        rec.initialize(&path, 1, 1, 20, false, started).unwrap();
        rec.finalize().unwrap();

        let sidecar = std::fs::read_to_string(RawVideoRecorder::sidecar_path(&path)).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
        let written: DateTime<Local> = meta["started"].as_str().unwrap().parse().unwrap();
        assert_eq!(written, started);
    }

    #[test]
    fn rejects_mismatched_frames() {
        let dir = tempdir().unwrap();
        let mut rec = RawVideoRecorder::new();
        rec.initialize(&dir.path().join("x.avi"), 4, 4, 20, true, Local::now())
            .unwrap();
        assert!(rec.encode_frame(&Frame::zeros(4, 4, 1)).is_err());
        assert!(rec.encode_frame(&Frame::zeros(4, 4, 3)).is_ok());
    }

    #[test]
    fn finalize_without_initialize_is_noop() {
        let mut rec = RawVideoRecorder::new();
        rec.finalize().unwrap();
        assert!(rec.encode_frame(&Frame::zeros(1, 1, 1)).is_err());
    }
}
