//! Desktop/mobile layout selection from the viewport width

use crate::config::ViewConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Desktop,
    Mobile,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Desktop => "desktop",
            ViewMode::Mobile => "mobile",
        }
    }

    /// Capitalised name used in status lines and notifications
    pub fn display_name(&self) -> &'static str {
        match self {
            ViewMode::Desktop => "Desktop",
            ViewMode::Mobile => "Mobile",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(ViewMode::Desktop),
            "mobile" => Ok(ViewMode::Mobile),
            other => Err(format!("unknown view mode '{}'", other)),
        }
    }
}

/// Tracks the layout mode.
///
/// Resize notifications are debounced; once the viewport settles the
/// detected mode is applied after a further delay. A manual choice holds
/// until the next debounced resize is evaluated. All timing runs off the
/// `now` values handed in, so the owner decides how the clock is driven.
pub struct ViewModeManager {
    mode: ViewMode,
    breakpoint: f64,
    debounce: Duration,
    settle_delay: Duration,
    viewport_width: f64,
    resize_deadline: Option<Instant>,
    pending_switch: Option<(ViewMode, Instant)>,
}

impl ViewModeManager {
    pub fn new(config: &ViewConfig) -> Self {
        Self {
            mode: ViewMode::Desktop,
            breakpoint: config.mobile_breakpoint,
            debounce: config.resize_debounce(),
            settle_delay: config.settle_delay(),
            viewport_width: config.viewport.0 as f64,
            resize_deadline: None,
            pending_switch: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    /// Mode a viewport of `width` pixels calls for
    pub fn detect(&self, width: f64) -> ViewMode {
        if width <= self.breakpoint {
            ViewMode::Mobile
        } else {
            ViewMode::Desktop
        }
    }

    /// Evaluate the current viewport, as done once on load
    pub fn auto_detect(&mut self, now: Instant) {
        let detected = self.detect(self.viewport_width);
        if detected == self.mode {
            self.pending_switch = None;
            return;
        }

        debug!(
            "Viewport {}px suggests {} view; switching in {:?}",
            self.viewport_width, detected, self.settle_delay
        );
        self.pending_switch = Some((detected, now + self.settle_delay));
    }

    /// Record a viewport resize; evaluation waits for the debounce window
    pub fn on_resize(&mut self, width: f64, now: Instant) {
        self.viewport_width = width;
        self.resize_deadline = Some(now + self.debounce);
    }

    /// Switch immediately and drop any scheduled automatic switch.
    /// Returns whether the mode changed.
    pub fn set_mode(&mut self, mode: ViewMode) -> bool {
        self.pending_switch = None;
        if self.mode == mode {
            return false;
        }
        info!("Switched to {} view", mode);
        self.mode = mode;
        true
    }

    /// Advance timers. Returns the new mode when an automatic switch fired.
    pub fn poll(&mut self, now: Instant) -> Option<ViewMode> {
        if let Some(deadline) = self.resize_deadline {
            if now >= deadline {
                self.resize_deadline = None;
                self.auto_detect(now);
            }
        }

        match self.pending_switch {
            Some((mode, at)) if now >= at => {
                self.pending_switch = None;
                self.set_mode(mode).then_some(mode)
            }
            _ => None,
        }
    }

    /// Earliest instant at which `poll` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending_switch.map(|(_, at)| at);
        match (self.resize_deadline, pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShareConfig;

    fn create_manager(width: u32) -> ViewModeManager {
        let mut config = ShareConfig::default();
        config.view.viewport = (width, 800);
        ViewModeManager::new(&config.view)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_narrow_viewport_switches_to_mobile_after_settling() {
        let mut manager = create_manager(500);
        let t0 = Instant::now();

        assert_eq!(manager.mode(), ViewMode::Desktop);
        manager.auto_detect(t0);

        assert_eq!(manager.poll(t0 + ms(499)), None);
        assert_eq!(manager.poll(t0 + ms(500)), Some(ViewMode::Mobile));
        assert_eq!(manager.mode(), ViewMode::Mobile);
        assert_eq!(manager.next_deadline(), None);
    }

    #[test]
    fn test_wide_viewport_stays_desktop() {
        let mut manager = create_manager(1024);
        let t0 = Instant::now();

        manager.auto_detect(t0);
        assert_eq!(manager.next_deadline(), None);
        assert_eq!(manager.poll(t0 + ms(1000)), None);
        assert_eq!(manager.mode(), ViewMode::Desktop);
    }

    #[test]
    fn test_breakpoint_is_inclusive() {
        let manager = create_manager(1024);
        assert_eq!(manager.detect(768.0), ViewMode::Mobile);
        assert_eq!(manager.detect(769.0), ViewMode::Desktop);
    }

    #[test]
    fn test_resizes_are_debounced() {
        let mut manager = create_manager(1024);
        let t0 = Instant::now();

        manager.on_resize(600.0, t0);
        manager.on_resize(650.0, t0 + ms(200));
        // Still inside the window restarted by the second resize
        assert_eq!(manager.poll(t0 + ms(300)), None);
        assert_eq!(manager.next_deadline(), Some(t0 + ms(450)));

        assert_eq!(manager.poll(t0 + ms(450)), None);
        assert_eq!(manager.next_deadline(), Some(t0 + ms(950)));
        assert_eq!(manager.poll(t0 + ms(950)), Some(ViewMode::Mobile));
    }

    #[test]
    fn test_manual_override_holds_until_next_resize() {
        let mut manager = create_manager(500);
        let t0 = Instant::now();

        manager.auto_detect(t0);
        assert!(!manager.set_mode(ViewMode::Desktop));
        // The pending switch was cancelled by the manual choice
        assert_eq!(manager.poll(t0 + ms(600)), None);
        assert_eq!(manager.mode(), ViewMode::Desktop);

        assert!(manager.set_mode(ViewMode::Mobile));
        assert_eq!(manager.poll(t0 + ms(5000)), None);
        assert_eq!(manager.mode(), ViewMode::Mobile);

        manager.on_resize(1200.0, t0 + ms(6000));
        assert_eq!(manager.poll(t0 + ms(6250)), None);
        assert_eq!(manager.poll(t0 + ms(6750)), Some(ViewMode::Desktop));
    }

    #[test]
    fn test_resize_back_cancels_pending_switch() {
        let mut manager = create_manager(1024);
        let t0 = Instant::now();

        manager.on_resize(500.0, t0);
        manager.poll(t0 + ms(250));
        assert!(manager.next_deadline().is_some());

        manager.on_resize(1024.0, t0 + ms(300));
        manager.poll(t0 + ms(550));
        assert_eq!(manager.next_deadline(), None);
        assert_eq!(manager.poll(t0 + ms(2000)), None);
        assert_eq!(manager.mode(), ViewMode::Desktop);
    }

    #[test]
    fn test_parse_view_mode() {
        assert_eq!("Mobile".parse::<ViewMode>(), Ok(ViewMode::Mobile));
        assert!("tablet".parse::<ViewMode>().is_err());
    }
}
