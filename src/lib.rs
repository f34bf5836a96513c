pub mod app;
pub mod broadcast;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod selection;
pub mod view_mode;

pub use app::{AppCommand, LogView, ShareApp, ShareView, ShutdownReason};
pub use broadcast::{
    BroadcastChannel, BroadcastMessage, Envelope, FrameBroadcaster, StreamStatus, StreamViewer,
};
pub use capture::{CaptureSession, CaptureSource, MockCaptureSource, SessionState};
pub use config::ShareConfig;
pub use error::{BroadcastError, CaptureError, Result, SelectionError, ShareError};
pub use frame::{FrameData, FrameFormat};
pub use geometry::{HandleDirection, Point, Rectangle, Size};
pub use selection::{SelectionController, SelectionManager, SelectionMode};
pub use view_mode::{ViewMode, ViewModeManager};

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use capture::GstScreenSource;
