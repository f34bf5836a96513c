use super::ShareApp;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

impl ShareApp {
    /// Stop the capture, the keyboard and every background task
    pub(super) async fn shutdown(&mut self, background: Vec<JoinHandle<()>>) {
        info!("Beginning graceful shutdown");

        if let Some(handler) = self.keyboard_handler.take() {
            if let Err(e) = handler.stop().await {
                error!("Error stopping keyboard: {}", e);
            }
        }

        // Announces `stopped` to viewers before the responder goes away
        self.release().await;

        for task in background {
            match timeout(TASK_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Background task failed: {}", e),
                Err(_) => warn!("Background task did not stop within {:?}", TASK_SHUTDOWN_TIMEOUT),
            }
        }

        let stats = self.session.broadcaster().stats();
        info!(
            "Broadcast totals: {} frames ({} bytes), {} skipped, {} encode errors, {} publish errors",
            stats.frames_published,
            stats.bytes_published,
            stats.frames_skipped,
            stats.encode_errors,
            stats.publish_errors
        );
    }
}
