//! Video recorder collaborators.
//!
//! The capture loop owns exactly one [`Recorder`] at a time. It configures and
//! initializes the recorder lazily, on the first frame processed while recording is
//! active, and finalizes it when recording stops or the loop exits. After a finalize the
//! loop asks its [`RecorderFactory`] for a fresh instance, so every recording session
//! starts a new file.

pub mod memory;
pub mod raw;

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

pub use memory::{MemoryRecorder, RecorderStats};
pub use raw::RawVideoRecorder;

/// Codec selection for recorded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// Uncompressed frames
    Raw,
    /// FFV1 (lossless)
    Ffv1,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// H.265 / HEVC
    H265,
    /// MPEG-4 part 2
    Mpeg4,
}

impl VideoCodec {
    /// True for codecs that never discard information.
    pub fn is_always_lossless(self) -> bool {
        matches!(self, VideoCodec::Raw | VideoCodec::Ffv1)
    }

    /// True for codecs with a lossless encoding mode.
    pub fn supports_lossless(self) -> bool {
        !matches!(self, VideoCodec::Mpeg4)
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VideoCodec::Raw => "raw",
            VideoCodec::Ffv1 => "ffv1",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Av1 => "av1",
            VideoCodec::H265 => "h265",
            VideoCodec::Mpeg4 => "mpeg4",
        };
        write!(f, "{}", label)
    }
}

/// Container format for recorded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    /// Matroska (.mkv)
    Matroska,
    /// AVI (.avi)
    Avi,
    /// MPEG-4 (.mp4)
    Mp4,
}

impl VideoContainer {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            VideoContainer::Matroska => "mkv",
            VideoContainer::Avi => "avi",
            VideoContainer::Mp4 => "mp4",
        }
    }
}

/// Encoder options handed to a recorder before it is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Codec
    pub codec: VideoCodec,
    /// Container
    pub container: VideoContainer,
    /// Request lossless encoding
    pub lossless: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Vp9,
            container: VideoContainer::Matroska,
            lossless: false,
        }
    }
}

/// Writes a sequential stream of frames to a video file.
pub trait Recorder: Send {
    /// Select codec, container and quality. Only takes effect before `initialize`.
    fn configure(&mut self, settings: &EncoderSettings);

    /// Open the output file for frames of the given geometry.
    ///
    /// `started` is the time recording was requested.
    fn initialize(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        is_color: bool,
        started: DateTime<Local>,
    ) -> Result<()>;

    /// Append one frame.
    fn encode_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output. A no-op on an uninitialized recorder.
    fn finalize(&mut self) -> Result<()>;

    /// True between a successful `initialize` and `finalize`.
    fn is_initialized(&self) -> bool;
}

/// Produces fresh recorders, one per recording session.
pub trait RecorderFactory: Send + Sync {
    /// Create an uninitialized recorder.
    fn create(&self) -> Box<dyn Recorder>;
}

impl<F> RecorderFactory for F
where
    F: Fn() -> Box<dyn Recorder> + Send + Sync,
{
    fn create(&self) -> Box<dyn Recorder> {
        self()
    }
}
