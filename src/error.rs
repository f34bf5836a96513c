use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("System error: {message}")]
    System { message: String },
}

impl ShareError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failures while acquiring or driving the screen capture handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission to capture the screen was denied")]
    PermissionDenied,

    #[error("No capture source found")]
    SourceNotFound,

    #[error("Screen capture is not supported: {details}")]
    Unsupported { details: String },

    #[error("Capture source is not readable: {details}")]
    SourceUnreadable { details: String },

    #[error("Capture constraints cannot be satisfied: {details}")]
    ConstraintsUnsatisfiable { details: String },

    #[error("Capture blocked by security restrictions")]
    SecurityRestricted,

    #[error("Unknown capture failure: {details}")]
    Unknown { details: String },

    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
}

/// Failures of the region-selection state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Selection {width:.0}x{height:.0} is smaller than the {min_width:.0}x{min_height:.0} minimum")]
    SelectionTooSmall {
        width: f64,
        height: f64,
        min_width: f64,
        min_height: f64,
    },

    #[error("No active selection")]
    NoActiveSelection,

    #[error("Cannot {operation} during {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("Cannot enter {requested} mode while {active} mode is active")]
    ModeConflict {
        requested: &'static str,
        active: &'static str,
    },
}

/// Failures on the frame/status broadcast path
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Failed to publish message: {details}")]
    PublishFailed { details: String },

    #[error("Broadcast channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} messages")]
    Lagged { skipped: u64 },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },

    #[error("Message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShareError>;
