use super::keyboard::KeyboardInputHandler;
use super::{ShareApp, ShutdownReason};
use crate::broadcast::{MessageFilter, StreamViewer};
use crate::error::{BroadcastError, Result, ShareError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl ShareApp {
    /// Run the main loop until quit, a signal, or (non-interactively) the
    /// end of the capture
    pub async fn run(&mut self) -> Result<ShutdownReason> {
        info!("sharecast is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ShareError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ShareError::system("Shutdown receiver already taken"))?;
        let mut commands = self
            .command_receiver
            .take()
            .ok_or_else(|| ShareError::system("Command receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;
        let background = self.start_components().await?;
        self.initialize().await;

        let mut state_rx = self.session.subscribe_state();
        let mut state_open = true;

        let reason = loop {
            if self.exit_when_stopped {
                if let Some(message) = self.last_capture_error.take() {
                    break ShutdownReason::Error(message);
                }
                if std::mem::take(&mut self.capture_ended) {
                    break ShutdownReason::StreamEnded;
                }
            }

            let deadline = self.next_deadline();

            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.map_err(|_| {
                        ShareError::system("Shutdown channel closed unexpectedly")
                    })?;
                }
                command = commands.recv() => {
                    // The app keeps its own sender, so the queue never closes
                    let Some(command) = command else { continue };
                    if let Some(reason) = self.handle_command(command).await {
                        break reason;
                    }
                }
                changed = state_rx.changed(), if state_open => {
                    if changed.is_ok() {
                        self.sync_session_state().await;
                    } else {
                        state_open = false;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(Instant::now());
                }
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        self.shutdown(background).await;
        info!("sharecast shutdown complete");
        Ok(reason)
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
            }
        });
    }

    /// Start the request responder, the keyboard and the snapshot writer
    async fn start_components(&mut self) -> Result<Vec<JoinHandle<()>>> {
        let mut background = Vec::new();

        let requests = self.channel.receiver(
            MessageFilter::MessageTypes(vec!["request-stream"]),
            "request-responder",
        );
        background.push(
            self.session
                .broadcaster()
                .spawn_request_responder(requests, self.cancellation_token.child_token()),
        );

        if let Some(path) = self.snapshot_path.clone() {
            background.push(spawn_snapshot_writer(
                StreamViewer::new(&self.channel),
                path,
                self.cancellation_token.child_token(),
            ));
        }

        if self.keyboard_enabled {
            let handler = KeyboardInputHandler::new(self.command_sender.clone());
            handler.start().await?;
            self.keyboard_handler = Some(handler);
        }

        debug!(
            "Started {} background tasks on channel '{}'",
            background.len(),
            self.channel.name()
        );
        Ok(background)
    }
}

/// Follow the channel as a viewer and keep the newest frame on disk
fn spawn_snapshot_writer(
    mut viewer: StreamViewer,
    path: PathBuf,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Writing broadcast snapshots to {}", path.display());
        loop {
            let envelope = tokio::select! {
                _ = token.cancelled() => break,
                envelope = viewer.next() => envelope,
            };

            match envelope {
                Ok(envelope) if envelope.message.message_type() == "frame" => {
                    if let Err(e) = viewer.write_snapshot(&path).await {
                        warn!("Failed to write snapshot {}: {}", path.display(), e);
                    }
                }
                Ok(_) => {}
                Err(BroadcastError::Lagged { skipped }) => {
                    debug!("Snapshot writer skipped {} messages", skipped);
                }
                Err(e) => {
                    debug!("Snapshot writer stopping: {}", e);
                    break;
                }
            }
        }
    })
}
