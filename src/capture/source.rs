use super::constraints::CaptureConstraints;
use crate::error::CaptureError;
use crate::frame::FrameData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// One video or audio track of a capture handle
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> String;

    /// Disabled tracks stay acquired but stop producing media
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the track. Stopping does not fire ended listeners.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Callback fired when the captured stream ends outside the session's control
pub type EndedListener = Box<dyn Fn() + Send + Sync>;

/// Ended listeners of one handle. The end is latched: a listener added
/// after the stream ended runs immediately.
#[derive(Default)]
pub struct EndedSignal {
    inner: Mutex<EndedState>,
}

#[derive(Default)]
struct EndedState {
    ended: bool,
    listeners: Vec<EndedListener>,
}

impl EndedSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: EndedListener) {
        let mut inner = self.inner.lock();
        if inner.ended {
            drop(inner);
            listener();
        } else {
            inner.listeners.push(listener);
        }
    }

    /// Mark the stream ended and run every pending listener once
    pub fn fire(&self) {
        let listeners = {
            let mut inner = self.inner.lock();
            inner.ended = true;
            std::mem::take(&mut inner.listeners)
        };
        for listener in &listeners {
            listener();
        }
    }

    pub fn has_ended(&self) -> bool {
        self.inner.lock().ended
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// An acquired screen capture
pub trait MediaHandle: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .collect()
    }

    /// Register a callback for when the video track ends on its own, for
    /// example when the user stops sharing from the system picker. On a
    /// handle that has already ended the callback runs right away.
    fn add_ended_listener(&self, listener: EndedListener);

    /// Most recent decoded frame, or `None` while not enough data has
    /// arrived to present one
    fn latest_frame(&self) -> Option<FrameData>;
}

/// Platform that can hand out screen captures
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this platform can capture the screen at all
    fn is_supported(&self) -> bool;

    async fn request_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaHandle>, PlatformError>;
}

/// Raw failure reported by a capture platform, named like DOM exceptions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub const NOT_ALLOWED: &'static str = "NotAllowedError";
    pub const NOT_FOUND: &'static str = "NotFoundError";
    pub const NOT_SUPPORTED: &'static str = "NotSupportedError";
    pub const NOT_READABLE: &'static str = "NotReadableError";
    pub const OVERCONSTRAINED: &'static str = "OverconstrainedError";
    pub const SECURITY: &'static str = "SecurityError";

    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<PlatformError> for CaptureError {
    fn from(error: PlatformError) -> Self {
        match error.name.as_str() {
            PlatformError::NOT_ALLOWED => CaptureError::PermissionDenied,
            PlatformError::NOT_FOUND => CaptureError::SourceNotFound,
            PlatformError::NOT_SUPPORTED => CaptureError::Unsupported {
                details: error.message,
            },
            PlatformError::NOT_READABLE => CaptureError::SourceUnreadable {
                details: error.message,
            },
            PlatformError::OVERCONSTRAINED => CaptureError::ConstraintsUnsatisfiable {
                details: error.message,
            },
            PlatformError::SECURITY => CaptureError::SecurityRestricted,
            _ => CaptureError::Unknown {
                details: error.to_string(),
            },
        }
    }
}
