use super::controller::SelectionController;
use super::types::{SelectionLimits, SelectionMode};
use super::view::SelectionView;
use crate::config::SelectionConfig;
use crate::error::SelectionError;
use std::sync::Arc;
use tracing::debug;

/// Owns the crop and section controllers and keeps them mutually exclusive
pub struct SelectionManager {
    crop: SelectionController,
    section: SelectionController,
}

impl SelectionManager {
    pub fn new(config: &SelectionConfig, view: Arc<dyn SelectionView>) -> Self {
        Self {
            crop: SelectionController::new(
                SelectionMode::Crop,
                SelectionLimits::for_mode(SelectionMode::Crop, config),
                Arc::clone(&view),
            ),
            section: SelectionController::new(
                SelectionMode::Section,
                SelectionLimits::for_mode(SelectionMode::Section, config),
                view,
            ),
        }
    }

    /// Currently entered mode, if any
    pub fn active_mode(&self) -> Option<SelectionMode> {
        if self.crop.is_active() {
            Some(SelectionMode::Crop)
        } else if self.section.is_active() {
            Some(SelectionMode::Section)
        } else {
            None
        }
    }

    pub fn is_active(&self, mode: SelectionMode) -> bool {
        self.controller(mode).is_active()
    }

    /// Enter `mode`; refused while the other mode is active
    pub fn begin_mode(&mut self, mode: SelectionMode) -> Result<(), SelectionError> {
        let other = mode.other();
        if self.controller(other).is_active() {
            debug!("Refusing {} mode while {} mode is active", mode, other);
            return Err(SelectionError::ModeConflict {
                requested: mode.as_str(),
                active: other.as_str(),
            });
        }

        self.controller_mut(mode).begin();
        Ok(())
    }

    /// Enter the mode if it is inactive, cancel it otherwise.
    /// Returns whether the mode is active afterwards.
    pub fn toggle_mode(&mut self, mode: SelectionMode) -> Result<bool, SelectionError> {
        if self.controller(mode).is_active() {
            self.controller_mut(mode).cancel();
            Ok(false)
        } else {
            self.begin_mode(mode)?;
            Ok(true)
        }
    }

    /// Cancel whichever mode is active
    pub fn cancel_active(&mut self) -> Option<SelectionMode> {
        let mode = self.active_mode()?;
        self.controller_mut(mode).cancel();
        Some(mode)
    }

    pub fn controller(&self, mode: SelectionMode) -> &SelectionController {
        match mode {
            SelectionMode::Crop => &self.crop,
            SelectionMode::Section => &self.section,
        }
    }

    pub fn controller_mut(&mut self, mode: SelectionMode) -> &mut SelectionController {
        match mode {
            SelectionMode::Crop => &mut self.crop,
            SelectionMode::Section => &mut self.section,
        }
    }

    pub fn active_controller_mut(&mut self) -> Option<&mut SelectionController> {
        let mode = self.active_mode()?;
        Some(self.controller_mut(mode))
    }
}
