use super::types::{ConfirmedSelection, SelectionLimits, SelectionMode, SelectionPhase};
use super::view::SelectionView;
use crate::error::SelectionError;
use crate::geometry::{self, HandleDirection, Point, Rectangle};
use std::sync::Arc;
use tracing::{debug, info};

/// Pointer-driven selection state machine for one mode.
///
/// Crop and section selections share this machine; they differ only in their
/// [`SelectionLimits`] and in what the host does with the confirmed rectangle.
pub struct SelectionController {
    mode: SelectionMode,
    limits: SelectionLimits,
    view: Arc<dyn SelectionView>,
    active: bool,
    phase: SelectionPhase,
    anchor: Point,
    rectangle: Option<Rectangle>,
    active_handle: Option<HandleDirection>,
    rectangle_at_resize_start: Option<Rectangle>,
}

impl SelectionController {
    pub fn new(mode: SelectionMode, limits: SelectionLimits, view: Arc<dyn SelectionView>) -> Self {
        Self {
            mode,
            limits,
            view,
            active: false,
            phase: SelectionPhase::Idle,
            anchor: Point::default(),
            rectangle: None,
            active_handle: None,
            rectangle_at_resize_start: None,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn limits(&self) -> SelectionLimits {
        self.limits
    }

    /// Whether the mode has been entered and not yet confirmed or cancelled
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    pub fn rectangle(&self) -> Option<Rectangle> {
        self.rectangle
    }

    pub fn active_handle(&self) -> Option<HandleDirection> {
        self.active_handle
    }

    /// Enter the mode with an empty selection and show the overlay
    pub fn begin(&mut self) {
        self.reset();
        self.active = true;
        self.view.show_overlay(self.mode);
        info!("Entered {} selection mode", self.mode);
    }

    pub fn on_pointer_down(&mut self, point: Point) -> Result<(), SelectionError> {
        self.expect_phase("start a selection", SelectionPhase::Idle)?;

        self.phase = SelectionPhase::Drawing;
        self.anchor = point;
        self.set_rectangle(geometry::normalize(point, point));
        Ok(())
    }

    pub fn on_pointer_move(&mut self, point: Point) -> Result<(), SelectionError> {
        self.expect_phase("extend a selection", SelectionPhase::Drawing)?;

        self.set_rectangle(geometry::normalize(self.anchor, point));
        Ok(())
    }

    /// Finish the drag. A selection under the minimum is discarded and the
    /// machine returns to idle.
    pub fn on_pointer_up(&mut self, point: Point) -> Result<Rectangle, SelectionError> {
        self.expect_phase("finish a selection", SelectionPhase::Drawing)?;

        let rect = geometry::normalize(self.anchor, point);
        match geometry::clamp_min(rect, self.limits.min_width, self.limits.min_height) {
            Ok(rect) => {
                self.phase = SelectionPhase::Confirmed;
                self.set_rectangle(rect);
                debug!(
                    "{} selection accepted at ({}, {}) {}",
                    self.mode,
                    rect.x,
                    rect.y,
                    rect.dimension_label()
                );
                Ok(rect)
            }
            Err(e) => {
                self.phase = SelectionPhase::Idle;
                self.rectangle = None;
                self.view.clear_selection(self.mode);
                debug!("{} selection rejected: {}", self.mode, e);
                Err(e)
            }
        }
    }

    pub fn on_handle_pointer_down(
        &mut self,
        handle: HandleDirection,
        point: Point,
    ) -> Result<(), SelectionError> {
        self.expect_phase("grab a resize handle", SelectionPhase::Confirmed)?;
        let rect = self.rectangle.ok_or(SelectionError::NoActiveSelection)?;

        self.phase = SelectionPhase::Resizing;
        self.active_handle = Some(handle);
        self.rectangle_at_resize_start = Some(rect);
        self.anchor = point;
        debug!("Resizing {} selection from handle {}", self.mode, handle);
        Ok(())
    }

    pub fn on_handle_pointer_move(&mut self, point: Point) -> Result<Rectangle, SelectionError> {
        self.expect_phase("resize", SelectionPhase::Resizing)?;

        let (Some(original), Some(handle)) = (self.rectangle_at_resize_start, self.active_handle)
        else {
            return Err(SelectionError::NoActiveSelection);
        };

        let rect = geometry::apply_handle_delta(
            original,
            handle,
            point.x - self.anchor.x,
            point.y - self.anchor.y,
            self.limits.min_width,
            self.limits.min_height,
        );
        self.set_rectangle(rect);
        Ok(rect)
    }

    pub fn on_handle_pointer_up(&mut self) -> Result<(), SelectionError> {
        self.expect_phase("release a resize handle", SelectionPhase::Resizing)?;

        self.phase = SelectionPhase::Confirmed;
        self.active_handle = None;
        self.rectangle_at_resize_start = None;
        Ok(())
    }

    pub fn adjust_width(&mut self, delta: f64) -> Result<Rectangle, SelectionError> {
        let mut rect = self.current_rectangle()?;
        rect.width = geometry::adjust_dimension(rect.width, delta, self.limits.min_width);
        self.set_rectangle(rect);
        Ok(rect)
    }

    pub fn adjust_height(&mut self, delta: f64) -> Result<Rectangle, SelectionError> {
        let mut rect = self.current_rectangle()?;
        rect.height = geometry::adjust_dimension(rect.height, delta, self.limits.min_height);
        self.set_rectangle(rect);
        Ok(rect)
    }

    /// Hand the selection to the capture pipeline and leave the mode
    pub fn confirm(&mut self) -> Result<ConfirmedSelection, SelectionError> {
        let rectangle = self.current_rectangle()?;
        self.expect_phase("confirm", SelectionPhase::Confirmed)?;

        self.exit();
        info!(
            "Confirmed {} selection {} at ({}, {})",
            self.mode,
            rectangle.dimension_label(),
            rectangle.x,
            rectangle.y
        );

        Ok(ConfirmedSelection {
            mode: self.mode,
            rectangle,
        })
    }

    /// Leave the mode from any state without emitting anything
    pub fn cancel(&mut self) {
        if self.active {
            info!("Cancelled {} selection", self.mode);
        }
        self.exit();
    }

    fn exit(&mut self) {
        self.reset();
        self.view.clear_selection(self.mode);
        self.view.hide_overlay(self.mode);
    }

    fn reset(&mut self) {
        self.active = false;
        self.phase = SelectionPhase::Idle;
        self.anchor = Point::default();
        self.rectangle = None;
        self.active_handle = None;
        self.rectangle_at_resize_start = None;
    }

    fn current_rectangle(&self) -> Result<Rectangle, SelectionError> {
        if !self.active {
            return Err(SelectionError::NoActiveSelection);
        }
        self.rectangle.ok_or(SelectionError::NoActiveSelection)
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        expected: SelectionPhase,
    ) -> Result<(), SelectionError> {
        if !self.active {
            return Err(SelectionError::InvalidTransition {
                operation,
                phase: "inactive",
            });
        }
        if self.phase != expected {
            return Err(SelectionError::InvalidTransition {
                operation,
                phase: self.phase.as_str(),
            });
        }
        Ok(())
    }

    fn set_rectangle(&mut self, rect: Rectangle) {
        self.rectangle = Some(rect);
        self.view
            .render_selection(self.mode, &rect, &rect.dimension_label());
    }
}
