use super::SelectionMode;
use crate::geometry::Rectangle;

/// Presentation binding for the selection overlays.
///
/// Constructed once by the host and shared by both controllers; controllers
/// never reach for display state on their own.
pub trait SelectionView: Send + Sync {
    /// Overlay for `mode` becomes visible and starts taking pointer input
    fn show_overlay(&self, mode: SelectionMode);

    fn hide_overlay(&self, mode: SelectionMode);

    /// Draw the selection box and its `"W x H"` label
    fn render_selection(&self, mode: SelectionMode, rect: &Rectangle, label: &str);

    fn clear_selection(&self, mode: SelectionMode);
}

/// View that renders nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSelectionView;

impl SelectionView for NullSelectionView {
    fn show_overlay(&self, _mode: SelectionMode) {}
    fn hide_overlay(&self, _mode: SelectionMode) {}
    fn render_selection(&self, _mode: SelectionMode, _rect: &Rectangle, _label: &str) {}
    fn clear_selection(&self, _mode: SelectionMode) {}
}
