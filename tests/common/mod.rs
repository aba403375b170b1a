//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use miniscope::{
    MemoryRecorder, Miniscope, MockDevice, MockDeviceControl, Recorder, RecorderStats,
};
use parking_lot::Mutex;

/// Default upper bound for waiting on the capture thread.
pub const WAIT: Duration = Duration::from_secs(5);

/// A controller wired to a mock device and an in-memory recorder.
pub struct Rig {
    pub scope: Miniscope,
    pub control: MockDeviceControl,
    pub stats: RecorderStats,
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl Rig {
    /// Color mock producing 8x6 frames every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self::with_geometry(8, 6, 3, interval)
    }

    pub fn with_geometry(width: u32, height: u32, channels: u8, interval: Duration) -> Self {
        let (device, control) = MockDevice::new(width, height, channels);
        control.set_frame_interval(interval);

        let stats = RecorderStats::new();
        let factory_stats = stats.clone();
        let scope = Miniscope::new(Box::new(device), move || {
            Box::new(MemoryRecorder::with_stats(factory_stats.clone())) as Box<dyn Recorder>
        });

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        scope.set_on_message(move |msg| sink.lock().push(msg.to_string()));

        Self {
            scope,
            control,
            stats,
            messages,
        }
    }

    /// Number of times `message` was emitted.
    pub fn count(&self, message: &str) -> usize {
        self.messages.lock().iter().filter(|m| *m == message).count()
    }

    /// True if `message` was emitted at least once.
    pub fn saw(&self, message: &str) -> bool {
        self.count(message) > 0
    }

    /// True if any message starts with `prefix`.
    pub fn saw_prefix(&self, prefix: &str) -> bool {
        self.messages.lock().iter().any(|m| m.starts_with(prefix))
    }

    /// Pop every queued display frame.
    pub fn drain_frames(&self) -> Vec<miniscope::Frame> {
        std::iter::from_fn(|| self.scope.current_frame()).collect()
    }
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
