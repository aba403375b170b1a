//! Background capture loop.
//!
//! One [`CaptureTask`] exists per `run()`. Its thread polls the device, classifies each
//! poll, updates telemetry, builds the display copy of every frame, feeds the frame ring
//! and drives the recorder while recording is active.
//!
//! The loop exits when `running` is cleared, when its own cancel token is set, or after
//! a fatal failure. On every exit path an in-progress recording is finalized before the
//! thread ends.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::config::ScopeConfig;
use crate::device::ScopeDevice;
use crate::error::{MiniscopeError, Result};
use crate::frame::Frame;
use crate::recorder::{Recorder, RecorderFactory};
use crate::ring::FrameRing;
use crate::sink::MessageSink;
use crate::state::{AcquisitionState, Telemetry};
use crate::visualize;

/// Consecutive dropped frames tolerated before the session is abandoned.
pub const MAX_DROPPED_FRAMES: usize = 80;

/// State shared between the controller and its capture thread.
pub(crate) struct Shared {
    pub(crate) state: AcquisitionState,
    pub(crate) telemetry: Telemetry,
    pub(crate) device: Mutex<ScopeDevice>,
    pub(crate) config: RwLock<ScopeConfig>,
    pub(crate) recording_start: Mutex<Option<DateTime<Local>>>,
    pub(crate) ring: FrameRing,
    pub(crate) sink: MessageSink,
}

impl Shared {
    pub(crate) fn new(device: ScopeDevice, config: ScopeConfig) -> Self {
        Self {
            state: AcquisitionState::default(),
            telemetry: Telemetry::default(),
            device: Mutex::new(device),
            config: RwLock::new(config),
            recording_start: Mutex::new(None),
            ring: FrameRing::default(),
            sink: MessageSink::new(),
        }
    }

    /// The single path into the failed state.
    pub(crate) fn fail(&self, message: &str) {
        self.state.recording.store(false, Ordering::SeqCst);
        self.state.running.store(false, Ordering::SeqCst);
        self.state.failed.store(true, Ordering::SeqCst);
        error!(reason = message, "Capture failed");
        self.sink.emit(message);
    }
}

/// Handle to a running capture thread.
pub(crate) struct CaptureTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl CaptureTask {
    /// Spawn the capture thread. `running` must already be set.
    pub(crate) fn spawn(shared: Arc<Shared>, factory: Arc<dyn RecorderFactory>) -> Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let capture = CaptureLoop {
            recorder: factory.create(),
            factory,
            shared,
            cancel: Arc::clone(&cancel),
            placeholder: Frame::dropped_placeholder(),
            last_frame_at: None,
        };

        let handle = thread::Builder::new()
            .name("miniscope-capture".to_string())
            .spawn(move || capture.run())
            .map_err(MiniscopeError::Spawn)?;

        Ok(Self { cancel, handle })
    }

    /// Signal cancellation and wait for the thread to finish its current iteration.
    pub(crate) fn cancel_and_join(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Err(e) = self.handle.join() {
            error!("Capture thread panicked: {:?}", e);
        }
    }
}

struct CaptureLoop {
    shared: Arc<Shared>,
    factory: Arc<dyn RecorderFactory>,
    cancel: Arc<AtomicBool>,
    recorder: Box<dyn Recorder>,
    placeholder: Frame,
    last_frame_at: Option<Instant>,
}

impl CaptureLoop {
    fn run(mut self) {
        info!("Capture loop started");
        self.shared
            .telemetry
            .dropped_frames
            .store(0, Ordering::SeqCst);

        while self.shared.state.running() && !self.cancel.load(Ordering::SeqCst) {
            if self.step().is_break() {
                break;
            }
        }

        if self.recorder.is_initialized() {
            self.finalize_recorder();
        }
        self.shared.state.running.store(false, Ordering::SeqCst);
        debug!("Capture loop exiting");
    }

    fn step(&mut self) -> ControlFlow<()> {
        if self.shared.state.external_trigger() {
            self.poll_trigger();
        }

        if !self.shared.device.lock().grab() {
            self.shared.fail("Failed to grab frame.");
            return ControlFlow::Break(());
        }

        let retrieved = self.shared.device.lock().retrieve();
        let raw = match retrieved {
            Ok(frame) => frame,
            Err(e) => return self.handle_dropped_frame(&e),
        };

        self.update_fps();
        self.correct_drift();

        let (display, recorded) = self.visualize(raw);

        let recording = self.shared.state.recording_requested();
        if recording && !self.recorder.is_initialized() {
            if self.start_recorder(&recorded).is_break() {
                return ControlFlow::Break(());
            }
        } else if !recording && self.recorder.is_initialized() {
            self.finalize_recorder();
        }

        if self.shared.ring.push(display).is_some() {
            trace!("Frame ring full, evicted oldest frame");
        }
        if recording && self.recorder.is_initialized() {
            if let Err(e) = self.recorder.encode_frame(&recorded) {
                warn!(error = %e, "Failed to encode frame");
            }
        }

        ControlFlow::Continue(())
    }

    fn poll_trigger(&self) {
        let active = self.shared.device.lock().trigger_active();
        match active {
            Ok(true) => {
                if !self.shared.state.recording.swap(true, Ordering::SeqCst) {
                    *self.shared.recording_start.lock() = Some(Local::now());
                    info!("External trigger started recording");
                }
            }
            Ok(false) => {
                if self.shared.state.recording.swap(false, Ordering::SeqCst) {
                    info!("External trigger stopped recording");
                }
            }
            Err(e) => warn!(error = %e, "Unable to read trigger state"),
        }
    }

    fn handle_dropped_frame(&mut self, err: &anyhow::Error) -> ControlFlow<()> {
        // A missing or corrupted frame is never recorded
        self.shared.state.recording.store(false, Ordering::SeqCst);

        let dropped = self
            .shared
            .telemetry
            .dropped_frames
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        warn!(error = %err, dropped, "Dropped frame");
        self.shared.sink.emit("Dropped frame.");
        self.shared.ring.push(self.placeholder.clone());

        self.shared.sink.emit("Reconnecting Miniscope...");
        let index = self.shared.config.read().device.camera_index;
        if let Err(e) = self.shared.device.lock().reopen(index) {
            warn!(error = %e, index, "Reopening camera failed");
        }
        self.shared.sink.emit("Miniscope reconnected.");

        if dropped > MAX_DROPPED_FRAMES {
            self.shared.fail("Too many dropped frames. Giving up.");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.last_frame_at {
            let secs = now.duration_since(previous).as_secs_f64();
            if secs > 0.0 {
                let fps = (1.0 / secs).round().min(u32::MAX as f64) as u32;
                self.shared
                    .telemetry
                    .current_fps
                    .store(fps, Ordering::Relaxed);
            }
        }
        self.last_frame_at = Some(now);
    }

    fn correct_drift(&self) {
        if self.shared.telemetry.dropped_frames() == 0 {
            return;
        }

        self.shared.sink.emit("Sending settings again.");
        let device = self.shared.config.read().device.clone();
        if let Err(e) = self.shared.device.lock().apply_settings(
            device.exposure,
            device.gain,
            device.excitation,
        ) {
            warn!(error = %e, "Failed to resend device settings");
        }
        self.shared
            .telemetry
            .dropped_frames
            .store(0, Ordering::SeqCst);
    }

    /// Returns `(display, recorded)`.
    fn visualize(&self, raw: Frame) -> (Frame, Frame) {
        let vis = self.shared.config.read().visualization.clone();

        if vis.use_color {
            let display = visualize::mask_channels(&raw, vis.channel_mask());
            return (display, raw);
        }

        let gray = visualize::to_grayscale(&raw);
        let (min, max) = visualize::min_max(&gray);
        self.shared.telemetry.min_fluor.store(min, Ordering::Relaxed);
        self.shared.telemetry.max_fluor.store(max, Ordering::Relaxed);

        let display = if vis.min_fluor_display == 0 && vis.max_fluor_display == u8::MAX {
            gray.clone()
        } else {
            visualize::rescale(&gray, vis.min_fluor_display, vis.max_fluor_display)
        };
        (display, gray)
    }

    fn start_recorder(&mut self, first: &Frame) -> ControlFlow<()> {
        self.shared.sink.emit("Recording enabled.");

        let (path, encoder, fps) = {
            let config = self.shared.config.read();
            (
                config.recording.video_filename.clone(),
                config.encoder_settings(),
                config.device.fps,
            )
        };
        let started = (*self.shared.recording_start.lock()).unwrap_or_else(Local::now);

        self.recorder.configure(&encoder);
        if let Err(e) = self.recorder.initialize(
            &path,
            first.width,
            first.height,
            fps,
            first.is_color(),
            started,
        ) {
            self.shared
                .fail(&format!("Unable to initialize recording: {:#}", e));
            return ControlFlow::Break(());
        }

        info!(
            path = ?path,
            codec = %encoder.codec,
            dimensions = format!("{}x{}", first.width, first.height),
            "Initialized video recording"
        );
        self.shared.sink.emit("Initialized video recording.");
        ControlFlow::Continue(())
    }

    fn finalize_recorder(&mut self) {
        if let Err(e) = self.recorder.finalize() {
            warn!(error = %e, "Failed to finalize recording");
        }
        self.recorder = self.factory.create();
        info!("Recording finalized");
        self.shared.sink.emit("Recording finalized.");
    }
}
