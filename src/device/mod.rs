//! Device handle abstraction and the scope command adapter.
//!
//! The scope is driven through a generic camera-capture interface whose property slots
//! are repurposed as a command channel:
//!
//! | Property     | Meaning on the scope                                    |
//! |--------------|---------------------------------------------------------|
//! | `Brightness` | sensor exposure, `value / 100`                          |
//! | `Gain`       | sensor gain, `value / 100`                              |
//! | `Hue`        | excitation LED power, `[0, 100]` mapped onto `[0, 0.5]` |
//! | `Saturation` | write: sensor commands; read: GPIO/trigger status bits  |
//!
//! That mapping lives only in [`ScopeDevice`]. The capture loop and controller talk in
//! terms of exposure, gain, excitation and trigger state.

pub mod mock;

use anyhow::Result;

use crate::frame::Frame;

pub use mock::{MockDevice, MockDeviceControl, RetrieveFault};

/// Written to the `Saturation` channel to initialize the CMOS sensor (frame rate, gain
/// and exposure control enabled).
pub const SET_CMOS_SETTINGS: u32 = 0x01;

/// GPIO status bit set while the external record trigger line is asserted.
pub const TRIG_RECORD_EXT: u32 = 0x02;

/// Lowest accepted exposure setting.
pub const EXPOSURE_MIN: i32 = 1;

/// Highest accepted exposure setting.
pub const EXPOSURE_MAX: i32 = 100;

/// Highest accepted excitation setting.
pub const EXCITATION_MAX: i32 = 100;

/// Camera property slots used by the scope protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyChannel {
    /// Exposure
    Brightness,
    /// Gain
    Gain,
    /// Excitation LED
    Hue,
    /// Sensor commands and GPIO status
    Saturation,
}

/// Low-level camera capture primitives.
///
/// Implementations wrap a concrete capture backend. All methods are blocking; the
/// controller serializes every call behind one lock.
pub trait DeviceHandle: Send {
    /// Open the camera at `index`.
    fn open(&mut self, index: u32) -> Result<()>;

    /// Release the camera. Must be safe to call on a closed handle.
    fn close(&mut self);

    /// True while the handle is open.
    fn is_open(&self) -> bool;

    /// Write a property slot.
    fn set_property(&mut self, channel: PropertyChannel, value: f64) -> Result<()>;

    /// Read a property slot.
    fn get_property(&mut self, channel: PropertyChannel) -> Result<f64>;

    /// Latch the next frame. `false` means the device cannot deliver frames at all.
    fn grab(&mut self) -> bool;

    /// Transfer the latched frame. Any fault, including backend exceptions, is an `Err`.
    fn retrieve(&mut self) -> Result<Frame>;
}

/// Clamp an exposure request into the accepted range.
pub fn clamp_exposure(value: i32) -> i32 {
    value.clamp(EXPOSURE_MIN, EXPOSURE_MAX)
}

/// Clamp an excitation request into the accepted range.
pub fn clamp_excitation(value: i32) -> i32 {
    value.clamp(0, EXCITATION_MAX)
}

/// Device value written to the LED channel for an excitation setting.
///
/// The LED is at full brightness at 50% drive, so the setting is halved to give a finer
/// step size.
pub fn led_power(excitation: i32) -> f64 {
    clamp_excitation(excitation) as f64 / 2.0 / 100.0
}

/// Scope-specific command adapter over a [`DeviceHandle`].
pub struct ScopeDevice {
    handle: Box<dyn DeviceHandle>,
}

impl ScopeDevice {
    /// Wrap a device handle.
    pub fn new(handle: Box<dyn DeviceHandle>) -> Self {
        Self { handle }
    }

    /// Open the camera at `index`.
    pub fn open(&mut self, index: u32) -> Result<()> {
        self.handle.open(index)
    }

    /// Release the camera.
    pub fn close(&mut self) {
        self.handle.close();
    }

    /// True while the camera is open.
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Close and reopen the camera at `index`.
    pub fn reopen(&mut self, index: u32) -> Result<()> {
        self.handle.close();
        self.handle.open(index)
    }

    /// Send the sensor initialization command.
    pub fn initialize_sensor(&mut self) -> Result<()> {
        self.handle
            .set_property(PropertyChannel::Saturation, SET_CMOS_SETTINGS as f64)
    }

    /// Push an exposure setting (expected in `[1, 100]`).
    pub fn set_exposure(&mut self, exposure: i32) -> Result<()> {
        self.handle
            .set_property(PropertyChannel::Brightness, exposure as f64 / 100.0)
    }

    /// Push a gain setting.
    pub fn set_gain(&mut self, gain: i32) -> Result<()> {
        self.handle
            .set_property(PropertyChannel::Gain, gain as f64 / 100.0)
    }

    /// Push an excitation setting (expected in `[0, 100]`).
    pub fn set_excitation(&mut self, excitation: i32) -> Result<()> {
        self.handle
            .set_property(PropertyChannel::Hue, led_power(excitation))
    }

    /// Push all three acquisition settings.
    pub fn apply_settings(&mut self, exposure: i32, gain: i32, excitation: i32) -> Result<()> {
        self.set_exposure(exposure)?;
        self.set_gain(gain)?;
        self.set_excitation(excitation)
    }

    /// Read the GPIO status word.
    pub fn gpio_state(&mut self) -> Result<u32> {
        let raw = self.handle.get_property(PropertyChannel::Saturation)?;
        Ok(raw.max(0.0) as u32)
    }

    /// True while the external record trigger is asserted.
    pub fn trigger_active(&mut self) -> Result<bool> {
        let state = self.gpio_state()?;
        tracing::debug!(gpio = state, "GPIO state");
        Ok(state & TRIG_RECORD_EXT == TRIG_RECORD_EXT)
    }

    /// Latch the next frame.
    pub fn grab(&mut self) -> bool {
        self.handle.grab()
    }

    /// Transfer the latched frame.
    pub fn retrieve(&mut self) -> Result<Frame> {
        self.handle.retrieve()
    }
}
