//! Custom error types for the miniscope driver.
//!
//! This module defines `MiniscopeError`, the error type returned by the controller API.
//! Using the `thiserror` crate, it provides a consistent way to report the failures a
//! caller can act on synchronously.
//!
//! ## Error Hierarchy
//!
//! - **`AlreadyConnected` / `NotConnected`**: lifecycle misuse. Returned before any state
//!   is touched, so the controller is left exactly as it was.
//! - **`DeviceOpen`**: the device handle could not be opened at the configured index.
//! - **`ReconnectFailed`**: `run()` tried to recover from a failed capture session and the
//!   reconnect itself failed.
//! - **`InvalidDisplayRange`**: a rejected display intensity window.
//! - **`Spawn`**: the operating system refused to start the capture thread.
//! - **`Config` / `Configuration`**: configuration extraction and validation errors.
//! - **`Io`**: wraps `std::io::Error`.
//!
//! Failures inside the capture loop never travel back as values. They are reported as
//! status messages through the message sink and by the `failed` flag.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, MiniscopeError>;

/// Errors returned by the miniscope controller API.
#[derive(Error, Debug)]
pub enum MiniscopeError {
    /// `connect()` was called on a controller that is already connected.
    #[error("Tried to reconnect already connected camera")]
    AlreadyConnected,

    /// An operation that needs an open device was called while disconnected.
    #[error("Camera is not connected")]
    NotConnected,

    /// The low-level device handle refused to open.
    #[error("Unable to open camera {index}: {message}")]
    DeviceOpen {
        /// Camera index passed to the device handle
        index: u32,
        /// Backend error text
        message: String,
    },

    /// Recovery from a failed capture session did not manage to reconnect.
    #[error("Unable to recover from previous failure: {0}")]
    ReconnectFailed(Box<MiniscopeError>),

    /// Display range must satisfy `min < max <= 255`.
    #[error("Invalid display range [{min}, {max}]: minimum must be below maximum, maximum at most 255")]
    InvalidDisplayRange {
        /// Requested lower bound
        min: u8,
        /// Requested upper bound
        max: u8,
    },

    /// The capture thread could not be spawned.
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    /// Configuration extraction failed (file syntax, type mismatch, bad env override).
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for MiniscopeError {
    fn from(err: figment::Error) -> Self {
        MiniscopeError::Config(Box::new(err))
    }
}

impl MiniscopeError {
    /// Lifecycle misuse errors leave the controller untouched and can simply be retried
    /// once the precondition holds.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            MiniscopeError::AlreadyConnected | MiniscopeError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_are_classified() {
        assert!(MiniscopeError::AlreadyConnected.is_lifecycle());
        assert!(MiniscopeError::NotConnected.is_lifecycle());
        assert!(!MiniscopeError::Configuration("bad".into()).is_lifecycle());
    }

    #[test]
    fn reconnect_failure_wraps_cause() {
        let err = MiniscopeError::ReconnectFailed(Box::new(MiniscopeError::DeviceOpen {
            index: 2,
            message: "no such device".into(),
        }));
        let text = err.to_string();
        assert!(text.contains("Unable to open camera 2"));
        assert!(text.contains("no such device"));
    }

    #[test]
    fn display_range_message_names_bounds() {
        let err = MiniscopeError::InvalidDisplayRange { min: 40, max: 10 };
        assert!(err.to_string().contains("[40, 10]"));
    }
}
