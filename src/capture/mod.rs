//! Screen capture acquisition and session lifecycle

mod constraints;
mod mask;
mod mock;
mod session;
mod source;

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;

#[cfg(test)]
mod tests;

pub use constraints::{CaptureConstraints, VideoConstraints};
pub use mask::DisplayMask;
pub use mock::{MockCaptureSource, MockMediaHandle, MockTrack};
pub use session::{CaptureSession, SessionState};
pub use source::{
    CaptureSource, EndedListener, EndedSignal, MediaHandle, MediaTrack, PlatformError, TrackKind,
};

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::{GstMediaHandle, GstScreenSource, GstTrack};
