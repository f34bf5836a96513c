use crate::geometry::{self, Rectangle, Size};
use serde::Serialize;

/// Display-only clip applied over the shared video.
///
/// The encoded stream is never cropped; sinks that render the local preview
/// use `clip_path` to hide everything outside the selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMask {
    /// Selection as drawn, in viewport pixels
    pub selection: Rectangle,
    /// Selection scaled to physical screen pixels
    pub screen_rect: Rectangle,
    pub clip_path: String,
}

impl DisplayMask {
    pub fn new(selection: Rectangle, viewport: Size, screen: Size) -> Self {
        let screen_rect = geometry::scale_to_screen(selection, viewport, screen);
        Self {
            selection,
            screen_rect,
            clip_path: screen_rect.clip_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_scales_viewport_to_screen() {
        let mask = DisplayMask::new(
            Rectangle::new(100.0, 50.0, 200.0, 100.0),
            Size::new(960.0, 540.0),
            Size::new(1920.0, 1080.0),
        );

        assert_eq!(mask.screen_rect, Rectangle::new(200.0, 100.0, 400.0, 200.0));
        assert_eq!(
            mask.clip_path,
            "polygon(200px 100px, 600px 100px, 600px 300px, 200px 300px)"
        );
    }
}
