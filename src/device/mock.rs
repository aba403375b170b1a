//! Simulated scope for testing without hardware.
//!
//! [`MockDevice`] produces a moving diagonal gradient at a configurable frame interval.
//! Faults are injected through the paired [`MockDeviceControl`], which stays usable
//! after the device has been moved into a controller:
//!
//! ```rust,ignore
//! let (device, control) = MockDevice::new(752, 480, 3);
//! let scope = Miniscope::new(Box::new(device), recorder_factory);
//! control.fail_retrieves(3); // next three retrieves fault
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;

use super::{DeviceHandle, PropertyChannel};
use crate::frame::Frame;

/// Fault injected into the next retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveFault {
    /// The backend reports no frame.
    NoFrame,
    /// The backend raises an internal library error.
    LibraryError,
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    opened_index: Option<u32>,
    open_count: u32,
    close_count: u32,
    fail_open: bool,
    properties: Vec<(PropertyChannel, f64)>,
    gpio: u32,
    grab_budget: Option<u64>,
    grabs: u64,
    pending_faults: Vec<RetrieveFault>,
    retrieves_ok: u64,
    retrieves_failed: u64,
    frame_interval: Duration,
}

/// Handle for scripting faults and inspecting a [`MockDevice`].
#[derive(Clone)]
pub struct MockDeviceControl {
    state: Arc<Mutex<MockState>>,
}

impl MockDeviceControl {
    /// Make the next `count` retrieves fail.
    pub fn fail_retrieves(&self, count: usize) {
        self.queue_faults(std::iter::repeat(RetrieveFault::NoFrame).take(count));
    }

    /// Queue specific retrieve faults, consumed in order.
    pub fn queue_faults<I>(&self, faults: I)
    where
        I: IntoIterator<Item = RetrieveFault>,
    {
        let mut state = self.state.lock();
        // Stored reversed so the next fault is popped from the end
        let mut queued: Vec<RetrieveFault> = faults.into_iter().collect();
        queued.reverse();
        queued.append(&mut state.pending_faults);
        state.pending_faults = queued;
    }

    /// Let `count` more grabs succeed, then fail every grab after that.
    pub fn fail_grabs_after(&self, count: u64) {
        let mut state = self.state.lock();
        state.grab_budget = Some(state.grabs + count);
    }

    /// Remove a limit set by [`fail_grabs_after`](Self::fail_grabs_after).
    pub fn allow_all_grabs(&self) {
        self.state.lock().grab_budget = None;
    }

    /// Make subsequent `open` calls fail (or succeed again).
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Set the GPIO status word returned from the `Saturation` channel.
    pub fn set_gpio(&self, gpio: u32) {
        self.state.lock().gpio = gpio;
    }

    /// Delay applied inside every retrieve.
    pub fn set_frame_interval(&self, interval: Duration) {
        self.state.lock().frame_interval = interval;
    }

    /// True while the device is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Index passed to the most recent successful open.
    pub fn opened_index(&self) -> Option<u32> {
        self.state.lock().opened_index
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    /// Number of closes of an open device.
    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }

    /// Number of frames delivered.
    pub fn retrieves_ok(&self) -> u64 {
        self.state.lock().retrieves_ok
    }

    /// Number of faulted retrieves.
    pub fn retrieves_failed(&self) -> u64 {
        self.state.lock().retrieves_failed
    }

    /// Number of retrieve faults still queued.
    pub fn pending_faults(&self) -> usize {
        self.state.lock().pending_faults.len()
    }

    /// Every property write, oldest first.
    pub fn property_writes(&self) -> Vec<(PropertyChannel, f64)> {
        self.state.lock().properties.clone()
    }

    /// Most recent value written to `channel`.
    pub fn last_property(&self, channel: PropertyChannel) -> Option<f64> {
        self.state
            .lock()
            .properties
            .iter()
            .rev()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, v)| *v)
    }

    /// Forget recorded property writes.
    pub fn clear_property_writes(&self) {
        self.state.lock().properties.clear();
    }
}

/// Simulated scope implementing [`DeviceHandle`].
pub struct MockDevice {
    width: u32,
    height: u32,
    channels: u8,
    frame_number: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Create a device producing `width` × `height` frames with `channels` samples per
    /// pixel, plus its control handle.
    pub fn new(width: u32, height: u32, channels: u8) -> (Self, MockDeviceControl) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let device = Self {
            width,
            height,
            channels,
            frame_number: 0,
            state: Arc::clone(&state),
        };
        (device, MockDeviceControl { state })
    }

    fn pattern(&self) -> Frame {
        let n = self.channels as usize;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * n);
        for y in 0..self.height as u64 {
            for x in 0..self.width as u64 {
                let base = x + y + self.frame_number;
                for c in 0..n as u64 {
                    data.push(((base + c * 40) % 256) as u8);
                }
            }
        }
        Frame::from_bytes(self.width, self.height, self.channels, data)
    }
}

impl DeviceHandle for MockDevice {
    fn open(&mut self, index: u32) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_open {
            bail!("Mock camera {index} unavailable");
        }
        state.open = true;
        state.opened_index = Some(index);
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn set_property(&mut self, channel: PropertyChannel, value: f64) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            bail!("Mock camera not open");
        }
        state.properties.push((channel, value));
        Ok(())
    }

    fn get_property(&mut self, channel: PropertyChannel) -> Result<f64> {
        let state = self.state.lock();
        if !state.open {
            bail!("Mock camera not open");
        }
        match channel {
            PropertyChannel::Saturation => Ok(state.gpio as f64),
            other => Ok(state
                .properties
                .iter()
                .rev()
                .find(|(ch, _)| *ch == other)
                .map(|(_, v)| *v)
                .unwrap_or(0.0)),
        }
    }

    fn grab(&mut self) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            return false;
        }
        state.grabs += 1;
        match state.grab_budget {
            Some(budget) => state.grabs <= budget,
            None => true,
        }
    }

    fn retrieve(&mut self) -> Result<Frame> {
        let (interval, fault) = {
            let mut state = self.state.lock();
            if !state.open {
                state.retrieves_failed += 1;
                return Err(anyhow!("Mock camera not open"));
            }
            (state.frame_interval, state.pending_faults.pop())
        };

        if !interval.is_zero() {
            std::thread::sleep(interval);
        }

        if let Some(fault) = fault {
            self.state.lock().retrieves_failed += 1;
            return match fault {
                RetrieveFault::NoFrame => Err(anyhow!("No frame available")),
                RetrieveFault::LibraryError => {
                    Err(anyhow!("Internal capture library error during retrieve"))
                }
            };
        }

        let frame = self.pattern();
        self.frame_number += 1;
        self.state.lock().retrieves_ok += 1;
        Ok(frame)
    }
}
