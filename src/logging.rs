//! Tracing setup for applications embedding the driver.
//!
//! The driver itself only emits `tracing` events; installing a subscriber is up to the
//! host application. `RUST_LOG` overrides the configured level. Status messages delivered
//! without a registered callback appear as info events on the `miniscope::status` target.
//!
//! # Example
//! ```no_run
//! use miniscope::{config::ScopeConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScopeConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Acquisition host started");
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ScopeConfig;
use crate::error::{MiniscopeError, Result};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines with thread names, for the acquisition console
    Compact,
    /// JSON lines for log aggregation
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level used when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from the scope configuration
    pub fn from_scope_config(config: &ScopeConfig) -> Result<Self> {
        Ok(Self {
            level: parse_log_level(&config.logging.level)?,
            ..Default::default()
        })
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize tracing from the scope configuration
pub fn init_from_config(config: &ScopeConfig) -> Result<()> {
    init(TracingConfig::from_scope_config(config)?)
}

/// Install a global subscriber.
///
/// Idempotent: if a global subscriber is already installed this returns `Ok(())`.
pub fn init(config: TracingConfig) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let layer = match config.format {
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_thread_names(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| MiniscopeError::Configuration(format!("Failed to initialize tracing: {}", e)))
}

/// Parse log level string into tracing Level
pub(crate) fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(MiniscopeError::Configuration(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))),
    }
}

// Installing the global subscriber is covered in tests/logging_init.rs, outside this
// binary, so it cannot shadow the #[traced_test] subscribers used here.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_tracing_config_from_scope_config() {
        let mut config = ScopeConfig::default();
        config.logging.level = "debug".to_string();
        let tracing_config = TracingConfig::from_scope_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, OutputFormat::Compact);

        config.logging.level = "loud".to_string();
        assert!(TracingConfig::from_scope_config(&config).is_err());
    }
}
