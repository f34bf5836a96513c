use super::types::{ControlState, Notification, NotificationLevel};
use crate::capture::DisplayMask;
use crate::geometry::Rectangle;
use crate::selection::{SelectionMode, SelectionView};
use crate::view_mode::ViewMode;
use tracing::{debug, error, info};

/// Presentation surface driven by [`super::ShareApp`]
pub trait ShareView: SelectionView {
    fn set_status(&self, status: &str);

    fn render_controls(&self, controls: &ControlState);

    fn notify(&self, notification: &Notification);

    /// Clip the preview to the masked area
    fn show_mask(&self, mask: &DisplayMask);

    fn clear_mask(&self);

    fn set_fullscreen(&self, fullscreen: bool);

    fn set_view_mode(&self, mode: ViewMode);
}

/// View that writes everything to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogView;

impl SelectionView for LogView {
    fn show_overlay(&self, mode: SelectionMode) {
        debug!("Showing {} overlay", mode);
    }

    fn hide_overlay(&self, mode: SelectionMode) {
        debug!("Hiding {} overlay", mode);
    }

    fn render_selection(&self, mode: SelectionMode, rect: &Rectangle, label: &str) {
        debug!("{} selection at ({}, {}) {}", mode, rect.x, rect.y, label);
    }

    fn clear_selection(&self, _mode: SelectionMode) {}
}

impl ShareView for LogView {
    fn set_status(&self, status: &str) {
        info!("Status: {}", status);
    }

    fn render_controls(&self, controls: &ControlState) {
        debug!(
            "Controls: start='{}' ({}), crop='{}' ({}), section='{}' ({}), pause='{}' ({})",
            controls.start.label,
            controls.start.enabled,
            controls.crop.label,
            controls.crop.enabled,
            controls.section.label,
            controls.section.enabled,
            controls.pause.label,
            controls.pause.enabled
        );
    }

    fn notify(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Error => error!("{}", notification.message),
            _ => info!("[{}] {}", notification.level, notification.message),
        }
    }

    fn show_mask(&self, mask: &DisplayMask) {
        info!("Preview clipped to {}", mask.clip_path);
    }

    fn clear_mask(&self) {
        debug!("Preview mask cleared");
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        info!("Fullscreen {}", if fullscreen { "on" } else { "off" });
    }

    fn set_view_mode(&self, mode: ViewMode) {
        debug!("Layout set to {} view", mode);
    }
}
