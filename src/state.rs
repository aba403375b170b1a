//! Acquisition state flags and capture telemetry.
//!
//! Every field is an independent atomic. Compound transitions (for example "clear
//! recording and running, set failed") are a sequence of stores, so a reader may briefly
//! observe only part of one. Individual values are never torn.
//!
//! The intended combinations are documented on [`StateSnapshot::invariants_hold`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

/// Lifecycle flags shared between the caller and the capture thread.
#[derive(Debug, Default)]
pub struct AcquisitionState {
    pub(crate) connected: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) recording: AtomicBool,
    pub(crate) failed: AtomicBool,
    pub(crate) external_trigger: AtomicBool,
}

impl AcquisitionState {
    /// Device handle is open.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Capture loop is active (or about to be).
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Raw recording request flag, independent of `running`.
    pub fn recording_requested(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// The last capture session ended in an unrecoverable error.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Recording follows the external trigger line.
    pub fn external_trigger(&self) -> bool {
        self.external_trigger.load(Ordering::SeqCst)
    }

    /// Copy of all flags.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            connected: self.connected(),
            running: self.running(),
            recording: self.recording_requested(),
            failed: self.failed(),
            external_trigger: self.external_trigger(),
        }
    }
}

/// Point-in-time copy of [`AcquisitionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    /// Device handle open
    pub connected: bool,
    /// Capture loop active
    pub running: bool,
    /// Recording requested
    pub recording: bool,
    /// Last session failed
    pub failed: bool,
    /// External trigger enabled
    pub external_trigger: bool,
}

impl StateSnapshot {
    /// `recording ⇒ running ⇒ connected`, and a failed session is never running.
    ///
    /// Only meaningful for snapshots taken while no transition is in flight.
    pub fn invariants_hold(&self) -> bool {
        (!self.recording || self.running)
            && (!self.running || self.connected)
            && !(self.failed && self.running)
    }
}

/// Counters written by the capture thread and read by callers.
#[derive(Debug)]
pub struct Telemetry {
    pub(crate) current_fps: AtomicU32,
    pub(crate) dropped_frames: AtomicUsize,
    pub(crate) min_fluor: AtomicU8,
    pub(crate) max_fluor: AtomicU8,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            current_fps: AtomicU32::new(0),
            dropped_frames: AtomicUsize::new(0),
            min_fluor: AtomicU8::new(0),
            max_fluor: AtomicU8::new(255),
        }
    }
}

impl Telemetry {
    /// Frame rate derived from the last inter-frame interval.
    pub fn current_fps(&self) -> u32 {
        self.current_fps.load(Ordering::Relaxed)
    }

    /// Consecutive dropped frames since the last successful frame.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Darkest value of the last grayscale frame.
    pub fn min_fluor(&self) -> u8 {
        self.min_fluor.load(Ordering::Relaxed)
    }

    /// Brightest value of the last grayscale frame.
    pub fn max_fluor(&self) -> u8 {
        self.max_fluor.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.current_fps.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
    }
}
