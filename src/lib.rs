//! # Miniscope Acquisition Library
//!
//! This crate drives a single miniature fluorescence microscope camera. It manages the
//! acquisition lifecycle (connect, run, record, fail, recover), runs the background
//! capture loop that polls the camera, and multiplexes captured frames to a live-preview
//! queue and an optional video recorder.
//!
//! ## Crate Structure
//!
//! - **`controller`**: The `Miniscope` controller, the public entry point. Owns the device,
//!   configuration and capture thread.
//! - **`capture`**: The background capture loop: trigger polling, dropped-frame recovery,
//!   drift correction, visualization and recorder orchestration.
//! - **`device`**: The `DeviceHandle` trait consumed from a capture backend, the scope
//!   command adapter built on it, and a scriptable `MockDevice`.
//! - **`recorder`**: The `Recorder` trait, codec/container selection, and the raw and
//!   in-memory recorders.
//! - **`ring`**: The bounded, overwrite-oldest display frame queue.
//! - **`sink`**: The single-slot status message callback.
//! - **`state`**: Lifecycle flags and capture telemetry.
//! - **`frame`** / **`visualize`**: Frame storage and display transforms.
//! - **`config`**: Figment-based configuration (defaults, TOML file, environment).
//! - **`logging`**: Optional `tracing` subscriber setup.
//! - **`error`**: The `MiniscopeError` enum returned by the controller API.

pub mod capture;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod frame;
pub mod logging;
pub mod recorder;
pub mod ring;
pub mod sink;
pub mod state;
pub mod visualize;

pub use config::ScopeConfig;
pub use controller::Miniscope;
pub use device::{DeviceHandle, MockDevice, MockDeviceControl, PropertyChannel, RetrieveFault};
pub use error::{MiniscopeError, Result};
pub use frame::Frame;
pub use recorder::{
    EncoderSettings, MemoryRecorder, RawVideoRecorder, Recorder, RecorderFactory, RecorderStats,
    VideoCodec, VideoContainer,
};
pub use state::StateSnapshot;
pub use visualize::ChannelMask;
