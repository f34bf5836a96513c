use super::constraints::CaptureConstraints;
use super::mask::DisplayMask;
use super::source::{CaptureSource, MediaHandle};
use crate::broadcast::FrameBroadcaster;
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::geometry::{Rectangle, Size};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Observable lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Stopped,
    Connecting,
    Sharing,
    Paused,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Stopped => "stopped",
            SessionState::Connecting => "connecting",
            SessionState::Sharing => "sharing",
            SessionState::Paused => "paused",
        }
    }

    /// Sharing or paused
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Sharing | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SessionInner {
    handle: Option<Arc<dyn MediaHandle>>,
    connecting: bool,
    paused: bool,
    mask: Option<DisplayMask>,
    viewport: Size,
    /// Bumped on every start and stop so late callbacks from an older
    /// handle are ignored
    generation: u64,
}

struct SessionShared {
    source: Arc<dyn CaptureSource>,
    broadcaster: Arc<FrameBroadcaster>,
    constraints: CaptureConstraints,
    screen: Size,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<SessionState>,
}

/// Owns the capture handle and drives the broadcaster through its lifecycle
#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<SessionShared>,
}

impl CaptureSession {
    pub fn new(
        config: &CaptureConfig,
        viewport: Size,
        source: Arc<dyn CaptureSource>,
        broadcaster: Arc<FrameBroadcaster>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Stopped);
        Self {
            shared: Arc::new(SessionShared {
                source,
                broadcaster,
                constraints: CaptureConstraints::from_config(config),
                screen: Size::new(
                    config.screen_resolution.0 as f64,
                    config.screen_resolution.1 as f64,
                ),
                inner: Mutex::new(SessionInner {
                    handle: None,
                    connecting: false,
                    paused: false,
                    mask: None,
                    viewport,
                    generation: 0,
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Follow state changes, including streams ended by the platform
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.shared.inner.lock().handle.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.inner.lock().paused
    }

    pub fn mask(&self) -> Option<DisplayMask> {
        self.shared.inner.lock().mask.clone()
    }

    pub fn handle(&self) -> Option<Arc<dyn MediaHandle>> {
        self.shared.inner.lock().handle.clone()
    }

    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.shared.broadcaster
    }

    pub fn is_supported(&self) -> bool {
        self.shared.source.is_supported()
    }

    /// Viewport used to scale the next mask
    pub fn set_viewport(&self, viewport: Size) {
        self.shared.inner.lock().viewport = viewport;
    }

    /// Acquire a capture and start broadcasting, optionally masking the
    /// preview to `mask` (viewport pixels)
    pub async fn start(&self, mask: Option<Rectangle>) -> Result<(), CaptureError> {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.connecting {
                return Err(CaptureError::InvalidTransition {
                    operation: "start sharing",
                    state: "connecting",
                });
            }
            if inner.handle.is_some() {
                return Err(CaptureError::InvalidTransition {
                    operation: "start sharing",
                    state: "sharing",
                });
            }
            inner.connecting = true;
            inner.generation
        };
        self.shared.set_state(SessionState::Connecting);

        info!(
            "Requesting {} capture at {}x{} @ {}fps",
            self.shared.source.name(),
            self.shared.constraints.video.ideal_width,
            self.shared.constraints.video.ideal_height,
            self.shared.constraints.video.ideal_frame_rate
        );

        let result = self
            .shared
            .source
            .request_capture(&self.shared.constraints)
            .await;

        let handle = match result {
            Ok(handle) => handle,
            Err(platform_error) => {
                let error = CaptureError::from(platform_error);
                warn!("Screen capture request failed: {}", error);
                let mut inner = self.shared.inner.lock();
                if inner.generation == generation {
                    inner.connecting = false;
                    drop(inner);
                    self.shared.set_state(SessionState::Stopped);
                }
                return Err(error);
            }
        };

        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                drop(inner);
                debug!("Capture {} arrived after stop; releasing it", handle.id());
                for track in handle.tracks() {
                    track.stop();
                }
                return Err(CaptureError::InvalidTransition {
                    operation: "start sharing",
                    state: "stopped",
                });
            }

            inner.generation += 1;
            inner.connecting = false;
            inner.paused = false;
            let viewport = inner.viewport;
            inner.mask = mask.map(|rect| DisplayMask::new(rect, viewport, self.shared.screen));
            inner.handle = Some(Arc::clone(&handle));
            if let Some(mask) = &inner.mask {
                info!(
                    "Applying display mask {} (viewport {})",
                    mask.clip_path,
                    mask.selection.dimension_label()
                );
            }

            // Started under the session lock so a concurrent stop cannot
            // slip in between storing the handle and announcing the stream
            self.shared.broadcaster.start(Arc::clone(&handle));
            inner.generation
        };

        self.shared.set_state(SessionState::Sharing);

        // A handle that already ended runs the listener right here, which
        // stops the session before start returns
        let weak: Weak<SessionShared> = Arc::downgrade(&self.shared);
        handle.add_ended_listener(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop_generation(generation, "capture ended by the platform");
            }
        }));

        info!("Screen capture {} started", handle.id());
        Ok(())
    }

    /// Disable every track and tell subscribers the stream is paused
    pub fn pause(&self) -> Result<(), CaptureError> {
        {
            let mut inner = self.shared.inner.lock();
            let handle = inner.handle.clone().ok_or(CaptureError::InvalidTransition {
                operation: "pause",
                state: "stopped",
            })?;
            if inner.paused {
                return Err(CaptureError::InvalidTransition {
                    operation: "pause",
                    state: "paused",
                });
            }
            for track in handle.tracks() {
                track.set_enabled(false);
            }
            inner.paused = true;
        }

        self.shared.broadcaster.pause();
        self.shared.set_state(SessionState::Paused);
        info!("Screen capture paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        {
            let mut inner = self.shared.inner.lock();
            let handle = inner.handle.clone().ok_or(CaptureError::InvalidTransition {
                operation: "resume",
                state: "stopped",
            })?;
            if !inner.paused {
                return Err(CaptureError::InvalidTransition {
                    operation: "resume",
                    state: "sharing",
                });
            }
            for track in handle.tracks() {
                track.set_enabled(true);
            }
            inner.paused = false;
        }

        self.shared.broadcaster.resume();
        self.shared.set_state(SessionState::Sharing);
        info!("Screen capture resumed");
        Ok(())
    }

    /// Release the capture. Safe to call in any state.
    pub fn stop(&self) {
        self.shared.stop("stop requested");
    }
}

impl SessionShared {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!("Capture session {} -> {}", current, state);
                *current = state;
                true
            }
        });
    }

    fn stop_generation(&self, generation: u64, reason: &str) {
        self.stop_if(Some(generation), reason);
    }

    fn stop(&self, reason: &str) {
        self.stop_if(None, reason);
    }

    fn stop_if(&self, expected_generation: Option<u64>, reason: &str) {
        let handle = {
            let mut inner = self.inner.lock();
            if expected_generation.is_some_and(|g| g != inner.generation) {
                return;
            }
            inner.generation += 1;
            inner.connecting = false;
            inner.paused = false;
            inner.mask = None;
            inner.handle.take()
        };

        // Tracks are stopped outside the lock; platforms may call back into
        // the session while releasing them
        if let Some(handle) = &handle {
            for track in handle.tracks() {
                track.stop();
            }
            info!("Screen capture {} stopped: {}", handle.id(), reason);
        }

        self.broadcaster.stop();
        self.set_state(SessionState::Stopped);
    }
}
