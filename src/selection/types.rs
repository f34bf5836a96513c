use crate::config::SelectionConfig;
use crate::geometry::Rectangle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which selection overlay is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Free-form crop of the shared area
    Crop,
    /// Section of the screen, adjusted mainly through resize handles
    Section,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Crop => "crop",
            SelectionMode::Section => "section",
        }
    }

    pub fn other(&self) -> SelectionMode {
        match self {
            SelectionMode::Crop => SelectionMode::Section,
            SelectionMode::Section => SelectionMode::Crop,
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a live selection session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPhase {
    #[default]
    Idle,
    Drawing,
    Resizing,
    Confirmed,
}

impl SelectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPhase::Idle => "idle",
            SelectionPhase::Drawing => "drawing",
            SelectionPhase::Resizing => "resizing",
            SelectionPhase::Confirmed => "confirmed",
        }
    }
}

/// Minimum accepted size for one selection mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionLimits {
    pub min_width: f64,
    pub min_height: f64,
}

impl SelectionLimits {
    pub fn new(min_width: f64, min_height: f64) -> Self {
        Self {
            min_width,
            min_height,
        }
    }

    pub fn for_mode(mode: SelectionMode, config: &SelectionConfig) -> Self {
        match mode {
            SelectionMode::Crop => Self::new(config.crop_min_width, config.crop_min_height),
            SelectionMode::Section => {
                Self::new(config.section_min_width, config.section_min_height)
            }
        }
    }
}

/// Rectangle handed to the capture pipeline on confirm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmedSelection {
    pub mode: SelectionMode,
    pub rectangle: Rectangle,
}
