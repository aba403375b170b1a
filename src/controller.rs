//! The acquisition controller.
//!
//! [`Miniscope`] owns the device, the configuration and the capture thread. Every method
//! takes `&self`; the controller can be shared behind an `Arc` between a UI thread that
//! polls [`Miniscope::current_frame`] and a control thread that drives the lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► run() ──► start_recording() ──► stop_recording() ──► stop() ──► disconnect()
//!                 ▲                                                    │
//!                 └──────────── run() recovers from a failure ◄────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use miniscope::{Miniscope, MockDevice, MemoryRecorder, Recorder};
//!
//! let (device, _control) = MockDevice::new(752, 480, 3);
//! let scope = Miniscope::new(Box::new(device), || {
//!     Box::new(MemoryRecorder::new()) as Box<dyn Recorder>
//! });
//! scope.set_on_message(|msg| println!("{msg}"));
//! scope.connect()?;
//! scope.run()?;
//! scope.start_recording("/data/session1.mkv")?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::capture::{CaptureTask, Shared};
use crate::config::ScopeConfig;
use crate::device::{clamp_excitation, clamp_exposure, DeviceHandle, ScopeDevice};
use crate::error::{MiniscopeError, Result};
use crate::frame::Frame;
use crate::recorder::{RecorderFactory, VideoCodec, VideoContainer};
use crate::state::StateSnapshot;
use crate::visualize::ChannelMask;

/// Controller for one miniscope camera.
pub struct Miniscope {
    shared: Arc<Shared>,
    recorder_factory: Arc<dyn RecorderFactory>,
    capture: Mutex<Option<CaptureTask>>,
}

impl Miniscope {
    /// Create a controller with default configuration.
    pub fn new<F>(device: Box<dyn DeviceHandle>, recorder_factory: F) -> Self
    where
        F: RecorderFactory + 'static,
    {
        Self::build(device, Arc::new(recorder_factory), ScopeConfig::default())
    }

    /// Create a controller from a loaded configuration.
    pub fn with_config<F>(
        device: Box<dyn DeviceHandle>,
        recorder_factory: F,
        config: ScopeConfig,
    ) -> Result<Self>
    where
        F: RecorderFactory + 'static,
    {
        config.validate()?;
        Ok(Self::build(device, Arc::new(recorder_factory), config))
    }

    fn build(
        device: Box<dyn DeviceHandle>,
        recorder_factory: Arc<dyn RecorderFactory>,
        config: ScopeConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(ScopeDevice::new(device), config)),
            recorder_factory,
            capture: Mutex::new(None),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Open the camera, initialize the sensor and push the configured settings.
    ///
    /// On failure the device is released again and `connected` stays false.
    pub fn connect(&self) -> Result<()> {
        if self.shared.state.connected() {
            warn!("Tried to reconnect already connected camera");
            return Err(MiniscopeError::AlreadyConnected);
        }

        let device_config = self.shared.config.read().device.clone();
        let index = device_config.camera_index;
        {
            let mut device = self.shared.device.lock();
            if let Err(e) = device.open(index) {
                error!(index, error = %e, "Unable to open camera");
                return Err(MiniscopeError::DeviceOpen {
                    index,
                    message: format!("{:#}", e),
                });
            }

            let configured = device.initialize_sensor().and_then(|()| {
                device.apply_settings(
                    device_config.exposure,
                    device_config.gain,
                    device_config.excitation,
                )
            });
            if let Err(e) = configured {
                device.close();
                error!(index, error = %e, "Unable to configure camera");
                return Err(MiniscopeError::DeviceOpen {
                    index,
                    message: format!("{:#}", e),
                });
            }
        }

        self.shared.telemetry.reset();
        self.shared.state.failed.store(false, Ordering::SeqCst);
        self.shared.state.connected.store(true, Ordering::SeqCst);

        info!(index, "Camera connected");
        self.shared
            .sink
            .emit(&format!("Initialized camera {}", index));
        Ok(())
    }

    /// Stop acquisition and release the camera. Idempotent.
    pub fn disconnect(&self) {
        self.stop();

        let was_connected = self.shared.state.connected.swap(false, Ordering::SeqCst);
        self.shared.device.lock().close();
        self.shared.telemetry.reset();

        if was_connected {
            let index = self.shared.config.read().device.camera_index;
            info!(index, "Camera disconnected");
            self.shared
                .sink
                .emit(&format!("Disconnected camera {}", index));
        }
    }

    /// Start (or restart) the capture thread.
    ///
    /// After a failed session this first reconnects the camera.
    pub fn run(&self) -> Result<()> {
        if !self.shared.state.connected() {
            return Err(MiniscopeError::NotConnected);
        }

        if self.shared.state.failed() {
            self.shared
                .sink
                .emit("Reconnecting to recover from previous failure.");
            self.disconnect();
            self.connect()
                .map_err(|e| MiniscopeError::ReconnectFailed(Box::new(e)))?;
        }

        let mut capture = self.capture.lock();
        if let Some(previous) = capture.take() {
            previous.cancel_and_join();
        }

        self.shared.state.running.store(true, Ordering::SeqCst);
        match CaptureTask::spawn(Arc::clone(&self.shared), Arc::clone(&self.recorder_factory)) {
            Ok(task) => *capture = Some(task),
            Err(e) => {
                self.shared.state.running.store(false, Ordering::SeqCst);
                error!(error = %e, "Unable to start capture");
                return Err(e);
            }
        }

        info!("Acquisition started");
        Ok(())
    }

    /// Stop acquisition and wait for the capture thread to exit. No-op when idle.
    pub fn stop(&self) {
        // Flags are cleared and the task joined under the same lock run() spawns under
        let mut capture = self.capture.lock();
        self.shared.state.running.store(false, Ordering::SeqCst);
        self.shared.state.recording.store(false, Ordering::SeqCst);

        if let Some(task) = capture.take() {
            task.cancel_and_join();
            info!("Acquisition stopped");
        }
    }

    /// Request recording to `path`, starting acquisition if needed.
    ///
    /// An empty path keeps the previously configured file name. The recorder itself is
    /// opened by the capture thread on the next frame.
    pub fn start_recording<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if !self.shared.state.connected() {
            return Err(MiniscopeError::NotConnected);
        }
        if !self.shared.state.running() {
            self.run()?;
        }

        let path = path.as_ref();
        if !path.as_os_str().is_empty() {
            self.shared.config.write().recording.video_filename = path.to_path_buf();
        }
        *self.shared.recording_start.lock() = Some(Local::now());
        self.shared.state.recording.store(true, Ordering::SeqCst);

        info!(path = ?self.video_filename(), "Recording requested");
        Ok(())
    }

    /// Stop recording. The capture thread finalizes the file on its next iteration.
    pub fn stop_recording(&self) {
        self.shared.state.recording.store(false, Ordering::SeqCst);
    }

    // ---------------------------------------------------------------------
    // State & telemetry
    // ---------------------------------------------------------------------

    /// Camera is open.
    pub fn connected(&self) -> bool {
        self.shared.state.connected()
    }

    /// Capture thread is active.
    pub fn running(&self) -> bool {
        self.shared.state.running()
    }

    /// Frames are being recorded (`running && recording`).
    pub fn recording(&self) -> bool {
        self.shared.state.running() && self.shared.state.recording_requested()
    }

    /// Last capture session ended in an unrecoverable error.
    pub fn failed(&self) -> bool {
        self.shared.state.failed()
    }

    /// Snapshot of all lifecycle flags.
    pub fn state(&self) -> StateSnapshot {
        self.shared.state.snapshot()
    }

    /// Frame rate measured between the last two frames.
    pub fn current_fps(&self) -> u32 {
        self.shared.telemetry.current_fps()
    }

    /// Consecutive dropped frames.
    pub fn dropped_frames_count(&self) -> usize {
        self.shared.telemetry.dropped_frames()
    }

    /// Darkest value observed in the last grayscale frame.
    pub fn min_fluor(&self) -> u8 {
        self.shared.telemetry.min_fluor()
    }

    /// Brightest value observed in the last grayscale frame.
    pub fn max_fluor(&self) -> u8 {
        self.shared.telemetry.max_fluor()
    }

    /// Pop the oldest display frame. Never blocks.
    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.ring.pop_oldest()
    }

    /// When the current (or last) recording was requested.
    pub fn recording_start(&self) -> Option<DateTime<Local>> {
        *self.shared.recording_start.lock()
    }

    /// Register the status message callback, replacing any previous one.
    ///
    /// The callback may run on the capture thread and must not call back into the
    /// controller.
    pub fn set_on_message<F>(&self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.shared.sink.set_callback(callback);
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> ScopeConfig {
        self.shared.config.read().clone()
    }

    // ---------------------------------------------------------------------
    // Device settings
    // ---------------------------------------------------------------------

    /// Camera index used by the next `connect()`.
    pub fn camera_index(&self) -> u32 {
        self.shared.config.read().device.camera_index
    }

    /// Select the camera for the next `connect()`.
    pub fn set_camera_index(&self, index: u32) {
        self.shared.config.write().device.camera_index = index;
    }

    /// Exposure setting.
    pub fn exposure(&self) -> i32 {
        self.shared.config.read().device.exposure
    }

    /// Set exposure, clamped to `[1, 100]`.
    pub fn set_exposure(&self, value: i32) {
        let value = clamp_exposure(value);
        self.shared.config.write().device.exposure = value;
        if self.connected() {
            if let Err(e) = self.shared.device.lock().set_exposure(value) {
                warn!(error = %e, value, "Failed to push exposure");
            }
        }
    }

    /// Gain setting.
    pub fn gain(&self) -> i32 {
        self.shared.config.read().device.gain
    }

    /// Set gain.
    pub fn set_gain(&self, value: i32) {
        self.shared.config.write().device.gain = value;
        if self.connected() {
            if let Err(e) = self.shared.device.lock().set_gain(value) {
                warn!(error = %e, value, "Failed to push gain");
            }
        }
    }

    /// Excitation LED setting.
    pub fn excitation(&self) -> i32 {
        self.shared.config.read().device.excitation
    }

    /// Set excitation LED power, clamped to `[0, 100]`.
    pub fn set_excitation(&self, value: i32) {
        let value = clamp_excitation(value);
        self.shared.config.write().device.excitation = value;
        if self.connected() {
            if let Err(e) = self.shared.device.lock().set_excitation(value) {
                warn!(error = %e, value, "Failed to push excitation");
            }
        }
    }

    /// Nominal frame rate written to recordings.
    pub fn fps(&self) -> u32 {
        self.shared.config.read().device.fps
    }

    /// Set the nominal frame rate. Zero is raised to one.
    pub fn set_fps(&self, fps: u32) {
        self.shared.config.write().device.fps = fps.max(1);
    }

    /// Recording follows the external trigger line.
    pub fn external_record_trigger(&self) -> bool {
        self.shared.state.external_trigger()
    }

    /// Enable or disable trigger-driven recording.
    pub fn set_external_record_trigger(&self, enabled: bool) {
        self.shared
            .state
            .external_trigger
            .store(enabled, Ordering::SeqCst);
    }

    // ---------------------------------------------------------------------
    // Visualization
    // ---------------------------------------------------------------------

    /// Color preview enabled.
    pub fn use_color(&self) -> bool {
        self.shared.config.read().visualization.use_color
    }

    /// Switch between color and grayscale preview.
    pub fn set_use_color(&self, color: bool) {
        self.shared.config.write().visualization.use_color = color;
    }

    /// Planes shown in color mode.
    pub fn visible_channels(&self) -> ChannelMask {
        self.shared.config.read().visualization.channel_mask()
    }

    /// Choose the planes shown in color mode.
    pub fn set_visible_channels(&self, red: bool, green: bool, blue: bool) {
        let mut config = self.shared.config.write();
        config.visualization.show_red = red;
        config.visualization.show_green = green;
        config.visualization.show_blue = blue;
    }

    /// Display intensity window `(min, max)` for grayscale preview.
    pub fn display_range(&self) -> (u8, u8) {
        let config = self.shared.config.read();
        (
            config.visualization.min_fluor_display,
            config.visualization.max_fluor_display,
        )
    }

    /// Set the display intensity window. Requires `min < max`.
    pub fn set_display_range(&self, min: u8, max: u8) -> Result<()> {
        if min >= max {
            return Err(MiniscopeError::InvalidDisplayRange { min, max });
        }
        let mut config = self.shared.config.write();
        config.visualization.min_fluor_display = min;
        config.visualization.max_fluor_display = max;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Recording settings
    // ---------------------------------------------------------------------

    /// Output file of the next recording session.
    pub fn video_filename(&self) -> PathBuf {
        self.shared.config.read().recording.video_filename.clone()
    }

    /// Set the output file for the next recording session.
    pub fn set_video_filename<P: Into<PathBuf>>(&self, path: P) {
        self.shared.config.write().recording.video_filename = path.into();
    }

    /// Recording codec.
    pub fn video_codec(&self) -> VideoCodec {
        self.shared.config.read().recording.codec
    }

    /// Select the recording codec. Takes effect on the next recording session.
    pub fn set_video_codec(&self, codec: VideoCodec) {
        self.shared.config.write().recording.codec = codec;
    }

    /// Recording container.
    pub fn video_container(&self) -> VideoContainer {
        self.shared.config.read().recording.container
    }

    /// Select the recording container. Takes effect on the next recording session.
    pub fn set_video_container(&self, container: VideoContainer) {
        self.shared.config.write().recording.container = container;
    }

    /// Lossless recording requested.
    pub fn record_lossless(&self) -> bool {
        self.shared.config.read().recording.lossless
    }

    /// Request lossless recording. Takes effect on the next recording session.
    pub fn set_record_lossless(&self, lossless: bool) {
        self.shared.config.write().recording.lossless = lossless;
    }
}

impl Drop for Miniscope {
    fn drop(&mut self) {
        self.stop();
        if self.connected() {
            if let Err(e) = self.shared.device.lock().set_excitation(0) {
                warn!(error = %e, "Failed to switch off excitation LED");
            }
        }
        self.disconnect();
    }
}

impl std::fmt::Debug for Miniscope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miniscope")
            .field("state", &self.state())
            .field("camera_index", &self.camera_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockDevice, MockDeviceControl, PropertyChannel};
    use crate::recorder::{MemoryRecorder, Recorder};

    fn scope() -> (Miniscope, MockDeviceControl) {
        let (device, control) = MockDevice::new(8, 6, 3);
        let scope = Miniscope::new(Box::new(device), || {
            Box::new(MemoryRecorder::new()) as Box<dyn Recorder>
        });
        (scope, control)
    }

    #[test]
    fn exposure_is_clamped_and_stored() {
        let (scope, _control) = scope();
        for (input, expected) in [(-5, 1), (0, 1), (1, 1), (42, 42), (100, 100), (101, 100)] {
            scope.set_exposure(input);
            assert_eq!(scope.exposure(), expected);
        }
    }

    #[test]
    fn excitation_is_clamped_and_pushed_when_connected() {
        let (scope, control) = scope();
        scope.set_excitation(150);
        assert_eq!(scope.excitation(), 100);
        assert!(control.last_property(PropertyChannel::Hue).is_none());

        scope.connect().unwrap();
        scope.set_excitation(-3);
        assert_eq!(scope.excitation(), 0);
        assert_eq!(control.last_property(PropertyChannel::Hue), Some(0.0));
    }

    #[test]
    fn connect_pushes_configured_settings() {
        let (scope, control) = scope();
        scope.set_gain(48);
        scope.connect().unwrap();
        assert_eq!(control.last_property(PropertyChannel::Gain), Some(0.48));
        assert_eq!(control.last_property(PropertyChannel::Brightness), Some(1.0));
        assert_eq!(control.last_property(PropertyChannel::Hue), Some(0.005));
    }

    #[test]
    fn display_range_rejects_empty_window() {
        let (scope, _control) = scope();
        assert!(matches!(
            scope.set_display_range(100, 100),
            Err(MiniscopeError::InvalidDisplayRange { .. })
        ));
        assert_eq!(scope.display_range(), (0, 255));
        scope.set_display_range(10, 200).unwrap();
        assert_eq!(scope.display_range(), (10, 200));
    }

    #[test]
    fn lifecycle_preconditions() {
        let (scope, _control) = scope();
        assert!(matches!(scope.run(), Err(MiniscopeError::NotConnected)));
        assert!(matches!(
            scope.start_recording("x.mkv"),
            Err(MiniscopeError::NotConnected)
        ));
        scope.connect().unwrap();
        let err = scope.connect().unwrap_err();
        assert!(err.is_lifecycle());
        assert!(scope.connected());
    }

    #[test]
    fn failed_open_leaves_controller_disconnected() {
        let (scope, control) = scope();
        control.set_fail_open(true);
        assert!(matches!(
            scope.connect(),
            Err(MiniscopeError::DeviceOpen { index: 0, .. })
        ));
        assert!(!scope.connected());
    }

    #[test]
    fn with_config_validates_and_applies() {
        let factory = || Box::new(MemoryRecorder::new()) as Box<dyn Recorder>;

        let mut config = ScopeConfig::default();
        config.device.excitation = 400;
        let (device, _control) = MockDevice::new(4, 4, 1);
        assert!(Miniscope::with_config(Box::new(device), factory, config).is_err());

        let mut config = ScopeConfig::default();
        config.device.camera_index = 5;
        config.recording.codec = VideoCodec::H265;
        let (device, control) = MockDevice::new(4, 4, 1);
        let scope = Miniscope::with_config(Box::new(device), factory, config).unwrap();
        assert_eq!(scope.video_codec(), VideoCodec::H265);
        scope.connect().unwrap();
        assert_eq!(control.opened_index(), Some(5));
    }

    #[test]
    fn drop_switches_led_off_and_releases_camera() {
        let (scope, control) = scope();
        scope.connect().unwrap();
        drop(scope);
        assert_eq!(control.last_property(PropertyChannel::Hue), Some(0.0));
        assert!(!control.is_open());
    }
}
