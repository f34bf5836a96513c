use super::keyboard::KeyboardInputHandler;
use super::persistence::SharingFlag;
use super::types::{
    selection_message, AppCommand, ControlInputs, ControlState, Notification, NotificationLevel,
    PointerEvent, SharingKind, ShutdownReason, UserMessage,
};
use super::view::ShareView;
use crate::broadcast::{BroadcastChannel, FrameBroadcaster};
use crate::capture::{CaptureSession, CaptureSource, SessionState};
use crate::config::ShareConfig;
use crate::error::{Result, SelectionError, ShareError};
use crate::geometry::{Rectangle, Size};
use crate::selection::{SelectionManager, SelectionMode, SelectionView};
use crate::view_mode::{ViewMode, ViewModeManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_QUEUE_SIZE: usize = 64;

/// Ties the selection overlays, the capture session and the layout mode to
/// the user's commands
pub struct ShareApp {
    pub(super) config: ShareConfig,
    pub(super) view: Arc<dyn ShareView>,
    pub(super) channel: BroadcastChannel,
    pub(super) session: CaptureSession,
    pub(super) selection: SelectionManager,
    pub(super) view_mode: ViewModeManager,
    pub(super) flag: SharingFlag,

    pub(super) supported: bool,
    pub(super) fullscreen: bool,
    pub(super) sharing_kind: SharingKind,
    /// Session state the UI was last updated for
    pub(super) last_state: SessionState,
    pub(super) exit_when_stopped: bool,
    /// Set when an active capture ends; taken by the run loop
    pub(super) capture_ended: bool,
    pub(super) last_capture_error: Option<String>,
    pub(super) snapshot_path: Option<PathBuf>,

    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) command_sender: mpsc::Sender<AppCommand>,
    pub(super) command_receiver: Option<mpsc::Receiver<AppCommand>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ShareApp {
    pub fn new<V>(
        config: ShareConfig,
        source: Arc<dyn CaptureSource>,
        channel: BroadcastChannel,
        view: Arc<V>,
    ) -> Self
    where
        V: ShareView + 'static,
    {
        let broadcaster = Arc::new(FrameBroadcaster::new(
            &config.broadcast,
            Arc::new(channel.clone()),
        ));
        let viewport = Size::new(config.view.viewport.0 as f64, config.view.viewport.1 as f64);
        let session = CaptureSession::new(&config.capture, viewport, source, broadcaster);

        let selection_view: Arc<dyn SelectionView> = view.clone();
        let selection = SelectionManager::new(&config.selection, selection_view);
        let view_mode = ViewModeManager::new(&config.view);
        let flag = SharingFlag::new(&config.system.state_file);

        let (command_sender, command_receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            view,
            channel,
            session,
            selection,
            view_mode,
            flag,
            supported: true,
            fullscreen: false,
            sharing_kind: SharingKind::Full,
            last_state: SessionState::Stopped,
            exit_when_stopped: false,
            capture_ended: false,
            last_capture_error: None,
            snapshot_path: None,
            keyboard_handler: None,
            keyboard_enabled: false,
            command_sender,
            command_receiver: Some(command_receiver),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Read commands from the terminal while running
    pub fn with_keyboard(mut self, enabled: bool) -> Self {
        self.keyboard_enabled = enabled;
        self
    }

    /// Leave the run loop once an active capture stops
    pub fn with_exit_when_stopped(mut self, enabled: bool) -> Self {
        self.exit_when_stopped = enabled;
        self
    }

    /// Keep the latest broadcast frame written to `path`
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn command_sender(&self) -> mpsc::Sender<AppCommand> {
        self.command_sender.clone()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode.mode()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn controls(&self) -> ControlState {
        let state = self.session.state();
        ControlState::derive(ControlInputs {
            supported: self.supported,
            connecting: state == SessionState::Connecting,
            sharing: state.is_active(),
            paused: state == SessionState::Paused,
            selection: self.selection.active_mode(),
            view_mode: self.view_mode.mode(),
        })
    }

    /// Probe platform support and evaluate the initial layout
    pub async fn initialize(&mut self) {
        self.supported = self.session.is_supported();
        if !self.supported {
            self.notify(
                "Screen sharing is not supported in this browser. Please use a modern browser like Chrome, Firefox, or Edge.",
                NotificationLevel::Error,
            );
        }

        match self.flag.load().await {
            Ok(true) => {
                warn!("Previous session was still sharing when it exited");
                self.flag.store_or_warn(false).await;
            }
            Ok(false) => {}
            Err(e) => warn!("Ignoring unreadable state file: {}", e),
        }

        self.view.set_view_mode(self.view_mode.mode());
        self.view_mode.auto_detect(Instant::now());
        self.view.set_status("Ready");
        self.render_controls();
    }

    /// Apply one command. Returns a shutdown reason when the app should exit.
    pub async fn handle_command(&mut self, command: AppCommand) -> Option<ShutdownReason> {
        debug!("Handling command {:?}", command);

        let result = match command {
            AppCommand::ToggleSharing => {
                if self.session.is_active() {
                    self.stop_sharing().await;
                    Ok(())
                } else {
                    self.start_sharing().await
                }
            }
            AppCommand::StartSharing => self.start_sharing().await,
            AppCommand::StopSharing => {
                self.stop_sharing().await;
                Ok(())
            }
            AppCommand::ToggleCropMode => self.toggle_selection_mode(SelectionMode::Crop),
            AppCommand::ToggleSectionMode => self.toggle_selection_mode(SelectionMode::Section),
            AppCommand::SetViewMode(mode) => {
                self.set_view_mode(mode);
                Ok(())
            }
            AppCommand::TogglePause => self.toggle_pause(),
            AppCommand::ToggleFullscreen => {
                self.toggle_fullscreen();
                Ok(())
            }
            AppCommand::Escape => {
                if self.selection.active_mode().is_some() {
                    self.cancel_selection();
                } else if self.fullscreen {
                    self.set_fullscreen(false);
                }
                Ok(())
            }
            AppCommand::ConfirmSelection => self.confirm_selection().await,
            AppCommand::CancelSelection => {
                self.cancel_selection();
                Ok(())
            }
            AppCommand::AdjustSelection {
                width_steps,
                height_steps,
            } => self.adjust_selection(width_steps, height_steps),
            AppCommand::Pointer(event) => {
                self.handle_pointer(event);
                Ok(())
            }
            AppCommand::Resize { width, height } => {
                self.view_mode.on_resize(width, Instant::now());
                self.session.set_viewport(Size::new(width, height));
                Ok(())
            }
            AppCommand::Quit => return Some(ShutdownReason::UserRequest),
        };

        if let Err(e) = result {
            self.report_error(&e);
        }
        None
    }

    /// Start a full-screen capture
    pub async fn start_sharing(&mut self) -> Result<()> {
        self.start_with(SharingKind::Full, None).await
    }

    pub(super) async fn start_with(
        &mut self,
        kind: SharingKind,
        mask: Option<Rectangle>,
    ) -> Result<()> {
        if !self.supported {
            self.notify(
                "Screen sharing is not supported in this browser.",
                NotificationLevel::Error,
            );
            return Ok(());
        }
        if self.session.state() != SessionState::Stopped {
            debug!("Ignoring start request while {}", self.session.state());
            return Ok(());
        }
        if let Some(mode) = self.selection.active_mode() {
            debug!("Ignoring start request while in {} mode", mode);
            return Ok(());
        }

        self.notify(kind.starting_message(), NotificationLevel::Info);
        self.view.set_status("Connecting...");
        self.last_state = SessionState::Connecting;
        self.render_controls();

        if let Err(e) = self.session.start(mask).await {
            self.last_state = self.session.state();
            self.render_controls();
            return Err(e.into());
        }

        self.sharing_kind = kind;
        self.last_state = SessionState::Sharing;
        if let Some(mask) = self.session.mask() {
            self.view.show_mask(&mask);
        }
        self.view.set_status(kind.status());
        self.notify(kind.started_message(), NotificationLevel::Success);
        self.flag.store_or_warn(true).await;
        self.render_controls();
        // The capture may already have ended while it was being handed over
        self.sync_session_state().await;
        Ok(())
    }

    /// Release the capture and return to idle
    pub async fn stop_sharing(&mut self) {
        self.session.stop();
        self.sync_session_state().await;
    }

    /// Bring the UI in line with the session, which may have been stopped
    /// by the platform. Returns whether an active capture ended.
    pub async fn sync_session_state(&mut self) -> bool {
        let state = self.session.state();
        if state == self.last_state {
            return false;
        }

        let previous = std::mem::replace(&mut self.last_state, state);
        debug!("Session {} -> {}", previous, state);

        let ended = previous.is_active() && state == SessionState::Stopped;
        if ended {
            self.capture_ended = true;
            self.fullscreen = false;
            self.view.set_fullscreen(false);
            self.view.clear_mask();
            self.view.set_status("Ready");
            self.notify("Screen sharing stopped", NotificationLevel::Info);
            self.flag.store_or_warn(false).await;
        }

        self.render_controls();
        ended
    }

    pub(super) fn toggle_pause(&mut self) -> Result<()> {
        match self.session.state() {
            SessionState::Sharing => {
                self.session.pause()?;
                self.last_state = SessionState::Paused;
                self.view.set_status("Paused");
                self.notify("Screen sharing paused", NotificationLevel::Info);
            }
            SessionState::Paused => {
                self.session.resume()?;
                self.last_state = SessionState::Sharing;
                self.view.set_status(self.sharing_kind.status());
                self.notify("Screen sharing resumed", NotificationLevel::Success);
            }
            state => {
                debug!("Ignoring pause toggle while {}", state);
                return Ok(());
            }
        }
        self.render_controls();
        Ok(())
    }

    pub(super) fn toggle_fullscreen(&mut self) {
        if !self.session.is_active() {
            debug!("Fullscreen is only available while sharing");
            return;
        }
        self.set_fullscreen(!self.fullscreen);
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
        self.view.set_fullscreen(fullscreen);
    }

    pub(super) fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode.set_mode(mode);
        self.apply_view_mode(mode);
    }

    fn apply_view_mode(&mut self, mode: ViewMode) {
        self.view.set_view_mode(mode);
        self.notify(
            &format!("Switched to {} view", mode.display_name()),
            NotificationLevel::Info,
        );
        if self.session.state() == SessionState::Stopped && self.selection.active_mode().is_none()
        {
            self.view
                .set_status(&format!("Ready ({} view)", mode.display_name()));
        }
        self.render_controls();
    }

    /// Advance the layout timers
    pub fn tick(&mut self, now: Instant) {
        if let Some(mode) = self.view_mode.poll(now) {
            self.apply_view_mode(mode);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.view_mode.next_deadline()
    }

    fn toggle_selection_mode(&mut self, mode: SelectionMode) -> Result<()> {
        if self.session.state() != SessionState::Stopped {
            debug!("Ignoring {} mode toggle while {}", mode, self.session.state());
            return Ok(());
        }

        let entered = match self.selection.toggle_mode(mode) {
            Ok(entered) => entered,
            Err(SelectionError::ModeConflict { .. }) => {
                debug!("Ignoring {} mode toggle while {} mode is active", mode, mode.other());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if entered {
            match mode {
                SelectionMode::Crop => {
                    self.view.set_status("Select area to share");
                    self.notify(
                        "Click and drag to select the area you want to share",
                        NotificationLevel::Info,
                    );
                }
                SelectionMode::Section => {
                    self.view.set_status("Select section to share");
                    self.notify(
                        "Click and drag to create a section, then use resize handles to adjust",
                        NotificationLevel::Info,
                    );
                }
            }
        } else {
            self.view.set_status("Ready");
        }
        self.render_controls();
        Ok(())
    }

    fn cancel_selection(&mut self) {
        let Some(mode) = self.selection.cancel_active() else {
            return;
        };

        self.view.set_status("Ready");
        let message = match mode {
            SelectionMode::Crop => "Crop selection cancelled",
            SelectionMode::Section => "Section selection cancelled",
        };
        self.notify(message, NotificationLevel::Info);
        self.render_controls();
    }

    async fn confirm_selection(&mut self) -> Result<()> {
        let Some(controller) = self.selection.active_controller_mut() else {
            debug!("Nothing to confirm");
            return Ok(());
        };
        let mode = controller.mode();

        let confirmed = match controller.confirm() {
            Ok(confirmed) => confirmed,
            Err(e) => {
                self.notify(&selection_message(mode, &e), NotificationLevel::Error);
                return Ok(());
            }
        };

        self.view.set_status("Ready");
        self.render_controls();
        self.start_with(
            SharingKind::from_selection(confirmed.mode),
            Some(confirmed.rectangle),
        )
        .await
    }

    fn adjust_selection(&mut self, width_steps: i32, height_steps: i32) -> Result<()> {
        let step = self.config.selection.adjust_step;
        let Some(controller) = self.selection.active_controller_mut() else {
            return Ok(());
        };
        if controller.rectangle().is_none() {
            return Ok(());
        }

        if width_steps != 0 {
            controller.adjust_width(f64::from(width_steps) * step)?;
        }
        if height_steps != 0 {
            controller.adjust_height(f64::from(height_steps) * step)?;
        }
        Ok(())
    }

    fn handle_pointer(&mut self, event: PointerEvent) {
        let Some(controller) = self.selection.active_controller_mut() else {
            debug!("Pointer event outside selection mode: {:?}", event);
            return;
        };
        let mode = controller.mode();

        let outcome = match event {
            PointerEvent::Down(point) => controller.on_pointer_down(point).map(|_| None),
            PointerEvent::Move(point) => controller.on_pointer_move(point).map(|_| None),
            PointerEvent::Up(point) => controller.on_pointer_up(point).map(Some),
            PointerEvent::HandleDown(handle, point) => {
                controller.on_handle_pointer_down(handle, point).map(|_| None)
            }
            PointerEvent::HandleMove(point) => controller.on_handle_pointer_move(point).map(|_| None),
            PointerEvent::HandleUp => controller.on_handle_pointer_up().map(|_| None),
        };

        match outcome {
            Ok(Some(_)) => {
                let message = match mode {
                    SelectionMode::Crop => {
                        "Area selected! Click \"Confirm Selection\" to proceed."
                    }
                    SelectionMode::Section => {
                        "Section selected! Use resize handles or buttons to adjust size."
                    }
                };
                self.notify(message, NotificationLevel::Success);
            }
            Ok(None) => {}
            Err(e @ SelectionError::SelectionTooSmall { .. }) => {
                self.notify(&selection_message(mode, &e), NotificationLevel::Error);
            }
            Err(e) => debug!("Ignoring pointer event {:?}: {}", event, e),
        }
    }

    fn report_error(&mut self, error: &ShareError) {
        self.notify(&error.user_message(), NotificationLevel::Error);
        if matches!(error, ShareError::Capture(_)) {
            self.view.set_status("Error");
            self.last_capture_error = Some(error.to_string());
        }
        warn!("Command failed: {}", error);
    }

    pub(super) fn notify(&self, message: &str, level: NotificationLevel) {
        self.view.notify(&Notification {
            message: message.to_string(),
            level,
            duration: Duration::from_millis(self.config.system.notification_ms),
        });
    }

    pub(super) fn render_controls(&self) {
        self.view.render_controls(&self.controls());
    }

    /// Release the capture and any background tasks
    pub(super) async fn release(&mut self) {
        self.cancellation_token.cancel();
        if self.session.is_active() {
            info!("Stopping active capture before exit");
        }
        self.stop_sharing().await;
    }
}
