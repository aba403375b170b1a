//! Scope configuration using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`ScopeConfig::default`])
//! 2. A TOML file (optional, `config/miniscope.toml` for [`ScopeConfig::load`])
//! 3. Environment variables prefixed with `MINISCOPE_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use miniscope::config::ScopeConfig;
//!
//! // MINISCOPE_DEVICE__EXPOSURE=40 overrides [device] exposure
//! let config = ScopeConfig::load()?;
//! config.validate()?;
//! println!("Camera index: {}", config.device.camera_index);
//! # Ok::<(), miniscope::MiniscopeError>(())
//! ```

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::device::{EXCITATION_MAX, EXPOSURE_MAX, EXPOSURE_MIN};
use crate::error::{MiniscopeError, Result};
use crate::recorder::{EncoderSettings, VideoCodec, VideoContainer};
use crate::visualize::ChannelMask;

/// Default configuration file location used by [`ScopeConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "config/miniscope.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "MINISCOPE_";

/// Top-level scope configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScopeConfig {
    /// Camera and sensor settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Live display settings
    #[serde(default)]
    pub visualization: VisualizationConfig,
    /// Video recording settings
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Camera and sensor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capture device index
    pub camera_index: u32,
    /// Sensor exposure, 1..=100
    pub exposure: i32,
    /// Sensor gain
    pub gain: i32,
    /// Excitation LED power, 0..=100
    pub excitation: i32,
    /// Nominal frame rate used for recording
    pub fps: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            exposure: 100,
            gain: 32,
            excitation: 1,
            fps: 20,
        }
    }
}

/// Live display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// Show color frames instead of grayscale
    pub use_color: bool,
    /// Red channel visible (color mode)
    pub show_red: bool,
    /// Green channel visible (color mode)
    pub show_green: bool,
    /// Blue channel visible (color mode)
    pub show_blue: bool,
    /// Lower display intensity bound (grayscale mode)
    pub min_fluor_display: u8,
    /// Upper display intensity bound (grayscale mode)
    pub max_fluor_display: u8,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            use_color: false,
            show_red: true,
            show_green: true,
            show_blue: true,
            min_fluor_display: 0,
            max_fluor_display: 255,
        }
    }
}

impl VisualizationConfig {
    /// Visible channel selection
    pub fn channel_mask(&self) -> ChannelMask {
        ChannelMask {
            red: self.show_red,
            green: self.show_green,
            blue: self.show_blue,
        }
    }
}

/// Video recording settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Output path for the next recording session
    pub video_filename: PathBuf,
    /// Codec
    pub codec: VideoCodec,
    /// Container
    pub container: VideoContainer,
    /// Request lossless encoding
    pub lossless: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let encoder = EncoderSettings::default();
        Self {
            video_filename: PathBuf::new(),
            codec: encoder.codec,
            container: encoder.container,
            lossless: encoder.lossless,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ScopeConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path.as_ref(), ENV_PREFIX).extract()?)
    }

    /// Layered provider chain with a custom environment prefix.
    pub fn figment(path: &Path, env_prefix: &str) -> Figment {
        Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        if !(EXPOSURE_MIN..=EXPOSURE_MAX).contains(&device.exposure) {
            return Err(MiniscopeError::Configuration(format!(
                "Invalid exposure {}. Must be {}-{}",
                device.exposure, EXPOSURE_MIN, EXPOSURE_MAX
            )));
        }
        if !(0..=EXCITATION_MAX).contains(&device.excitation) {
            return Err(MiniscopeError::Configuration(format!(
                "Invalid excitation {}. Must be 0-{}",
                device.excitation, EXCITATION_MAX
            )));
        }
        if device.fps == 0 {
            return Err(MiniscopeError::Configuration(
                "Frame rate must be positive".to_string(),
            ));
        }

        let vis = &self.visualization;
        if vis.min_fluor_display >= vis.max_fluor_display {
            return Err(MiniscopeError::InvalidDisplayRange {
                min: vis.min_fluor_display,
                max: vis.max_fluor_display,
            });
        }

        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }

    /// Encoder options derived from the recording section
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            codec: self.recording.codec,
            container: self.recording.container,
            lossless: self.recording.lossless,
        }
    }
}
