use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShareConfig {
    pub capture: CaptureConfig,
    pub broadcast: BroadcastConfig,
    pub selection: SelectionConfig,
    pub view: ViewConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Ideal capture width requested from the source
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,

    /// Ideal capture height requested from the source
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,

    /// Ideal capture frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Capture system audio along with the screen
    #[serde(default = "default_audio")]
    pub audio: bool,

    /// Physical screen size (width, height) used to scale mask rectangles
    #[serde(default = "default_screen_resolution")]
    pub screen_resolution: (u32, u32),

    /// X11 display name for the GStreamer source (e.g. ":0")
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BroadcastConfig {
    /// Name of the broadcast channel
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Interval between frame samples in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Number of messages buffered per subscriber
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SelectionConfig {
    #[serde(default = "default_crop_min")]
    pub crop_min_width: f64,

    #[serde(default = "default_crop_min")]
    pub crop_min_height: f64,

    #[serde(default = "default_section_min")]
    pub section_min_width: f64,

    #[serde(default = "default_section_min")]
    pub section_min_height: f64,

    /// Pixels added or removed by the width/height buttons
    #[serde(default = "default_adjust_step")]
    pub adjust_step: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ViewConfig {
    /// Viewports at or below this width use the mobile layout
    #[serde(default = "default_mobile_breakpoint")]
    pub mobile_breakpoint: f64,

    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,

    /// Delay before an auto-detected mode is applied
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Initial viewport size (width, height)
    #[serde(default = "default_viewport")]
    pub viewport: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// File holding the persisted "sharing active" flag
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// How long a notification stays visible in milliseconds
    #[serde(default = "default_notification_ms")]
    pub notification_ms: u64,
}

impl BroadcastConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl ViewConfig {
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl ShareConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sharecast.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("capture.ideal_width", default_ideal_width())?
            .set_default("capture.ideal_height", default_ideal_height())?
            .set_default("capture.frame_rate", default_frame_rate())?
            .set_default("capture.audio", default_audio())?
            .set_default(
                "capture.screen_resolution",
                vec![
                    default_screen_resolution().0,
                    default_screen_resolution().1,
                ],
            )?
            .set_default("broadcast.channel_name", default_channel_name())?
            .set_default("broadcast.sample_interval_ms", default_sample_interval_ms())?
            .set_default("broadcast.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default(
                "broadcast.channel_capacity",
                default_channel_capacity() as u64,
            )?
            .set_default("selection.crop_min_width", default_crop_min())?
            .set_default("selection.crop_min_height", default_crop_min())?
            .set_default("selection.section_min_width", default_section_min())?
            .set_default("selection.section_min_height", default_section_min())?
            .set_default("selection.adjust_step", default_adjust_step())?
            .set_default("view.mobile_breakpoint", default_mobile_breakpoint())?
            .set_default("view.resize_debounce_ms", default_resize_debounce_ms())?
            .set_default("view.settle_delay_ms", default_settle_delay_ms())?
            .set_default(
                "view.viewport",
                vec![default_viewport().0, default_viewport().1],
            )?
            .set_default("system.state_file", default_state_file())?
            .set_default("system.notification_ms", default_notification_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SHARECAST_ prefix
            .add_source(Environment::with_prefix("SHARECAST").separator("__"))
            .build()?;

        let config: ShareConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.ideal_width == 0 || self.capture.ideal_height == 0 {
            return Err(ConfigError::Message(
                "Capture size must be greater than 0".to_string(),
            ));
        }

        if self.capture.frame_rate == 0 {
            return Err(ConfigError::Message(
                "Capture frame_rate must be greater than 0".to_string(),
            ));
        }

        if self.capture.screen_resolution.0 == 0 || self.capture.screen_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Screen resolution must be greater than 0".to_string(),
            ));
        }

        if self.broadcast.channel_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Broadcast channel_name must not be empty".to_string(),
            ));
        }

        if self.broadcast.sample_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Broadcast sample_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.broadcast.jpeg_quality == 0 || self.broadcast.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Broadcast jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.broadcast.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Broadcast channel_capacity must be greater than 0".to_string(),
            ));
        }

        let minimums = [
            self.selection.crop_min_width,
            self.selection.crop_min_height,
            self.selection.section_min_width,
            self.selection.section_min_height,
        ];
        if minimums.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(ConfigError::Message(
                "Selection minimums must be positive".to_string(),
            ));
        }

        if self.view.viewport.0 == 0 || self.view.viewport.1 == 0 {
            return Err(ConfigError::Message(
                "View viewport must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                ideal_width: default_ideal_width(),
                ideal_height: default_ideal_height(),
                frame_rate: default_frame_rate(),
                audio: default_audio(),
                screen_resolution: default_screen_resolution(),
                display_name: None,
            },
            broadcast: BroadcastConfig {
                channel_name: default_channel_name(),
                sample_interval_ms: default_sample_interval_ms(),
                jpeg_quality: default_jpeg_quality(),
                channel_capacity: default_channel_capacity(),
            },
            selection: SelectionConfig {
                crop_min_width: default_crop_min(),
                crop_min_height: default_crop_min(),
                section_min_width: default_section_min(),
                section_min_height: default_section_min(),
                adjust_step: default_adjust_step(),
            },
            view: ViewConfig {
                mobile_breakpoint: default_mobile_breakpoint(),
                resize_debounce_ms: default_resize_debounce_ms(),
                settle_delay_ms: default_settle_delay_ms(),
                viewport: default_viewport(),
            },
            system: SystemConfig {
                state_file: default_state_file(),
                notification_ms: default_notification_ms(),
            },
        }
    }
}

// Default value functions
fn default_ideal_width() -> u32 {
    1920
}
fn default_ideal_height() -> u32 {
    1080
}
fn default_frame_rate() -> u32 {
    30
}
fn default_audio() -> bool {
    true
}
fn default_screen_resolution() -> (u32, u32) {
    (1920, 1080)
}

fn default_channel_name() -> String {
    "screen-share-channel".to_string()
}
fn default_sample_interval_ms() -> u64 {
    100
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_channel_capacity() -> usize {
    64
}

fn default_crop_min() -> f64 {
    50.0
}
fn default_section_min() -> f64 {
    100.0
}
fn default_adjust_step() -> f64 {
    20.0
}

fn default_mobile_breakpoint() -> f64 {
    768.0
}
fn default_resize_debounce_ms() -> u64 {
    250
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_viewport() -> (u32, u32) {
    (1280, 720)
}

fn default_state_file() -> String {
    "./sharecast-state.json".to_string()
}
fn default_notification_ms() -> u64 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ShareConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast.sample_interval(), Duration::from_millis(100));
        assert_eq!(config.selection.crop_min_width, 50.0);
        assert_eq!(config.selection.section_min_height, 100.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ShareConfig::default();
        config.broadcast.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.broadcast.jpeg_quality = 80;
        config.selection.crop_min_width = -1.0;
        assert!(config.validate().is_err());

        config.selection.crop_min_width = 50.0;
        config.capture.frame_rate = 0;
        assert!(config.validate().is_err());

        config.capture.frame_rate = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[broadcast]\nsample_interval_ms = 250\njpeg_quality = 60\n\n[view]\nmobile_breakpoint = 600.0"
        )
        .unwrap();

        let config = ShareConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.broadcast.sample_interval_ms, 250);
        assert_eq!(config.broadcast.jpeg_quality, 60);
        assert_eq!(config.view.mobile_breakpoint, 600.0);
        assert_eq!(config.capture.ideal_width, 1920);
        assert_eq!(config.broadcast.channel_name, "screen-share-channel");
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let rendered = toml::to_string_pretty(&ShareConfig::default()).unwrap();
        let parsed: ShareConfig = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed.broadcast.channel_name, "screen-share-channel");
        assert_eq!(parsed.view.viewport, (1280, 720));
    }
}
