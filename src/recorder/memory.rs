//! In-memory recorder.
//!
//! Keeps every encoded frame in memory and counts lifecycle calls through a shared
//! [`RecorderStats`] handle, which survives the recorder being moved into the capture
//! thread. Useful for tests and for short diagnostic captures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::{EncoderSettings, Recorder};
use crate::frame::Frame;

/// One initialize..finalize span as seen by a [`MemoryRecorder`].
#[derive(Debug, Clone)]
pub struct RecordedSession {
    /// Output path passed to `initialize`
    pub path: PathBuf,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Nominal frame rate
    pub fps: u32,
    /// Color flag passed to `initialize`
    pub is_color: bool,
    /// Encoder options in effect at `initialize`
    pub settings: EncoderSettings,
    /// Start time passed to `initialize`
    pub started: DateTime<Local>,
    /// Frames encoded, in order
    pub frames: Vec<Frame>,
    /// Whether `finalize` was called
    pub finalized: bool,
}

#[derive(Debug, Default)]
struct StatsInner {
    initializations: usize,
    frames_encoded: usize,
    finalizations: usize,
    fail_initialize: Option<String>,
    sessions: Vec<RecordedSession>,
}

/// Shared view of everything the recorders built from it have done.
#[derive(Debug, Clone, Default)]
pub struct RecorderStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl RecorderStats {
    /// Create an empty stats handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful `initialize` calls.
    pub fn initializations(&self) -> usize {
        self.inner.lock().initializations
    }

    /// Frames passed to `encode_frame`.
    pub fn frames_encoded(&self) -> usize {
        self.inner.lock().frames_encoded
    }

    /// `finalize` calls on an initialized recorder.
    pub fn finalizations(&self) -> usize {
        self.inner.lock().finalizations
    }

    /// Snapshot of all sessions.
    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.inner.lock().sessions.clone()
    }

    /// Make every subsequent `initialize` fail with `reason`.
    pub fn fail_initialize(&self, reason: impl Into<String>) {
        self.inner.lock().fail_initialize = Some(reason.into());
    }
}

/// Recorder keeping frames in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    stats: RecorderStats,
    settings: EncoderSettings,
    session: Option<usize>,
}

impl MemoryRecorder {
    /// Create a recorder with its own stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder reporting into `stats`.
    pub fn with_stats(stats: RecorderStats) -> Self {
        Self {
            stats,
            ..Self::default()
        }
    }

    /// Stats handle of this recorder.
    pub fn stats(&self) -> RecorderStats {
        self.stats.clone()
    }
}

impl Recorder for MemoryRecorder {
    fn configure(&mut self, settings: &EncoderSettings) {
        if self.session.is_none() {
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
        let mut inner = self.stats.inner.lock();
        if let Some(reason) = &inner.fail_initialize {
            bail!("{}", reason);
        }
        if self.session.is_some() {
            bail!("Recorder already initialized");
        }
        inner.initializations += 1;
        inner.sessions.push(RecordedSession {
            path: path.to_path_buf(),
            width,
            height,
            fps,
            is_color,
            settings: self.settings,
            started,
            frames: Vec::new(),
            finalized: false,
        });
        self.session = Some(inner.sessions.len() - 1);
        Ok(())
    }

    fn encode_frame(&mut self, frame: &Frame) -> Result<()> {
        let Some(idx) = self.session else {
            bail!("Recorder not initialized");
        };
        let mut inner = self.stats.inner.lock();
        inner.frames_encoded += 1;
        inner.sessions[idx].frames.push(frame.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(idx) = self.session.take() {
            let mut inner = self.stats.inner.lock();
            inner.finalizations += 1;
            inner.sessions[idx].finalized = true;
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::VideoCodec;

    #[test]
    fn session_lifecycle_is_tracked() {
        let stats = RecorderStats::new();
        let mut rec = MemoryRecorder::with_stats(stats.clone());
        rec.configure(&EncoderSettings {
            codec: VideoCodec::Ffv1,
            ..EncoderSettings::default()
        });
        rec.initialize(Path::new("a.mkv"), 2, 2, 20, false, Local::now())
            .unwrap();
        rec.encode_frame(&Frame::zeros(2, 2, 1)).unwrap();
        rec.finalize().unwrap();
        rec.finalize().unwrap();

        assert_eq!(stats.initializations(), 1);
        assert_eq!(stats.frames_encoded(), 1);
        assert_eq!(stats.finalizations(), 1);
        let session = &stats.sessions()[0];
        assert!(session.finalized);
        assert_eq!(session.settings.codec, VideoCodec::Ffv1);
    }

    #[test]
    fn encode_before_initialize_fails() {
        let mut rec = MemoryRecorder::new();
        assert!(rec.encode_frame(&Frame::zeros(1, 1, 1)).is_err());
    }

    #[test]
    fn injected_initialize_failure() {
        let stats = RecorderStats::new();
        stats.fail_initialize("disk full");
        let mut rec = MemoryRecorder::with_stats(stats.clone());
        let err = rec
            .initialize(Path::new("a.mkv"), 1, 1, 20, false, Local::now())
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(!rec.is_initialized());
        assert_eq!(stats.initializations(), 0);
    }
}
