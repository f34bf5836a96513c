use crate::error::{CaptureError, SelectionError, ShareError};
use crate::geometry::{HandleDirection, Point};
use crate::selection::SelectionMode;
use crate::view_mode::ViewMode;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Everything the app reacts to, from the keyboard, the CLI or a test
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    ToggleSharing,
    StartSharing,
    StopSharing,
    ToggleCropMode,
    ToggleSectionMode,
    SetViewMode(ViewMode),
    TogglePause,
    ToggleFullscreen,
    /// Cancel the active selection, otherwise leave fullscreen
    Escape,
    ConfirmSelection,
    CancelSelection,
    /// Grow or shrink the selection by whole adjust steps
    AdjustSelection {
        width_steps: i32,
        height_steps: i32,
    },
    Pointer(PointerEvent),
    Resize {
        width: f64,
        height: f64,
    },
    Quit,
}

/// Pointer input routed to the active selection overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
    HandleDown(HandleDirection, Point),
    HandleMove(Point),
    HandleUp,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    /// The capture ended while running non-interactively
    StreamEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Info => f.write_str("info"),
            NotificationLevel::Success => f.write_str("success"),
            NotificationLevel::Error => f.write_str("error"),
        }
    }
}

/// Transient message shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    /// How long the view keeps it visible
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonState {
    pub label: &'static str,
    pub enabled: bool,
}

impl ButtonState {
    fn new(label: &'static str, enabled: bool) -> Self {
        Self { label, enabled }
    }
}

/// Enabled flags and labels of every control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub start: ButtonState,
    pub crop: ButtonState,
    pub section: ButtonState,
    pub pause: ButtonState,
    pub stop: ButtonState,
    pub fullscreen: ButtonState,
    pub view_mode: ViewMode,
}

/// Inputs the control state is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlInputs {
    pub supported: bool,
    pub connecting: bool,
    pub sharing: bool,
    pub paused: bool,
    pub selection: Option<SelectionMode>,
    pub view_mode: ViewMode,
}

impl ControlState {
    pub fn derive(inputs: ControlInputs) -> Self {
        let crop_mode = inputs.selection == Some(SelectionMode::Crop);
        let section_mode = inputs.selection == Some(SelectionMode::Section);
        let busy = inputs.sharing || inputs.connecting;

        let start_label = if inputs.connecting {
            "Connecting..."
        } else if inputs.sharing {
            "Sharing..."
        } else if crop_mode {
            "Select Area First"
        } else if section_mode {
            "Select Section First"
        } else {
            "Start Sharing"
        };

        Self {
            start: ButtonState::new(
                start_label,
                inputs.supported && !busy && inputs.selection.is_none(),
            ),
            crop: ButtonState::new(
                if crop_mode { "Selecting..." } else { "Crop Area" },
                !busy && !section_mode,
            ),
            section: ButtonState::new(
                if section_mode {
                    "Selecting..."
                } else {
                    "Select Section"
                },
                !busy && !crop_mode,
            ),
            pause: ButtonState::new(
                if inputs.paused { "Resume" } else { "Pause" },
                inputs.sharing,
            ),
            stop: ButtonState::new("Stop Sharing", inputs.sharing),
            fullscreen: ButtonState::new("Fullscreen", inputs.sharing),
            view_mode: inputs.view_mode,
        }
    }
}

/// How a capture was started; decides the status line and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingKind {
    Full,
    Cropped,
    Section,
}

impl SharingKind {
    pub fn from_selection(mode: SelectionMode) -> Self {
        match mode {
            SelectionMode::Crop => SharingKind::Cropped,
            SelectionMode::Section => SharingKind::Section,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            SharingKind::Full => "Sharing",
            SharingKind::Cropped => "Sharing (Cropped)",
            SharingKind::Section => "Sharing (Section)",
        }
    }

    pub fn starting_message(&self) -> &'static str {
        match self {
            SharingKind::Full => "Starting screen share...",
            SharingKind::Cropped => "Starting cropped screen share...",
            SharingKind::Section => "Starting section screen share...",
        }
    }

    pub fn started_message(&self) -> &'static str {
        match self {
            SharingKind::Full => "Screen sharing started successfully!",
            SharingKind::Cropped => "Cropped screen sharing started!",
            SharingKind::Section => "Section screen sharing started!",
        }
    }
}

/// Text shown to the user for an error
pub trait UserMessage {
    fn user_message(&self) -> String;
}

impl UserMessage for CaptureError {
    fn user_message(&self) -> String {
        let message = match self {
            CaptureError::PermissionDenied => {
                "Screen sharing was denied. Please allow screen sharing and try again."
            }
            CaptureError::SourceNotFound => "No screen sharing source found.",
            CaptureError::Unsupported { .. } => "Screen sharing is not supported in this browser.",
            CaptureError::SourceUnreadable { .. } => "Screen sharing source is not readable.",
            CaptureError::ConstraintsUnsatisfiable { .. } => {
                "Screen sharing constraints cannot be satisfied."
            }
            CaptureError::SecurityRestricted => {
                "Screen sharing is not allowed due to security restrictions."
            }
            CaptureError::Unknown { .. } | CaptureError::InvalidTransition { .. } => {
                "An error occurred while starting screen share."
            }
        };
        message.to_string()
    }
}

impl UserMessage for ShareError {
    fn user_message(&self) -> String {
        match self {
            ShareError::Capture(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Text shown for a selection error in `mode`
pub fn selection_message(mode: SelectionMode, error: &SelectionError) -> String {
    match (mode, error) {
        (SelectionMode::Crop, SelectionError::SelectionTooSmall { .. }) => {
            "Selection too small. Please select a larger area.".to_string()
        }
        (SelectionMode::Section, SelectionError::SelectionTooSmall { .. }) => {
            "Section too small. Please select a larger area.".to_string()
        }
        (SelectionMode::Crop, SelectionError::NoActiveSelection)
        | (SelectionMode::Crop, SelectionError::InvalidTransition { .. }) => {
            "Please select an area first".to_string()
        }
        (SelectionMode::Section, SelectionError::NoActiveSelection)
        | (SelectionMode::Section, SelectionError::InvalidTransition { .. }) => {
            "Please select a section first".to_string()
        }
        (_, SelectionError::ModeConflict { .. }) => error.to_string(),
    }
}
