use crate::config::{CaptureConfig, ShareConfig};
use serde::{Deserialize, Serialize};

/// Video preferences; sources treat them as ideals, not hard limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
    /// X display to capture, platform default when unset
    pub display_name: Option<String>,
}

/// What to ask a capture source for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: VideoConstraints,
    pub audio: bool,
}

impl CaptureConstraints {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            video: VideoConstraints {
                ideal_width: config.ideal_width,
                ideal_height: config.ideal_height,
                ideal_frame_rate: config.frame_rate,
                display_name: config.display_name.clone(),
            },
            audio: config.audio,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from_config(&ShareConfig::default().capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints() {
        let constraints = CaptureConstraints::default();
        assert_eq!(constraints.video.ideal_width, 1920);
        assert_eq!(constraints.video.ideal_height, 1080);
        assert_eq!(constraints.video.ideal_frame_rate, 30);
        assert!(constraints.audio);
    }
}
