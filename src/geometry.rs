//! Rectangle math for region selection and display masks

use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pointer position in viewport pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Viewport-relative rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Live dimension label shown next to the selection, e.g. `"320 x 240"`
    pub fn dimension_label(&self) -> String {
        format!("{} x {}", self.width.round(), self.height.round())
    }

    /// Polygon clip string for display sinks that mask the video element
    pub fn clip_path(&self) -> String {
        format!(
            "polygon({x}px {y}px, {r}px {y}px, {r}px {b}px, {x}px {b}px)",
            x = self.x,
            y = self.y,
            r = self.right(),
            b = self.bottom(),
        )
    }
}

/// Width and height of a viewport or physical screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Grip on a selection rectangle; the letters name the edges it moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleDirection {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl HandleDirection {
    pub const ALL: [HandleDirection; 8] = [
        HandleDirection::NW,
        HandleDirection::N,
        HandleDirection::NE,
        HandleDirection::E,
        HandleDirection::SE,
        HandleDirection::S,
        HandleDirection::SW,
        HandleDirection::W,
    ];

    pub fn moves_north(self) -> bool {
        matches!(self, Self::N | Self::NE | Self::NW)
    }

    pub fn moves_south(self) -> bool {
        matches!(self, Self::S | Self::SE | Self::SW)
    }

    pub fn moves_east(self) -> bool {
        matches!(self, Self::E | Self::NE | Self::SE)
    }

    pub fn moves_west(self) -> bool {
        matches!(self, Self::W | Self::NW | Self::SW)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::S => "s",
            Self::E => "e",
            Self::W => "w",
            Self::NE => "ne",
            Self::NW => "nw",
            Self::SE => "se",
            Self::SW => "sw",
        }
    }
}

impl fmt::Display for HandleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandleDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" => Ok(Self::N),
            "s" => Ok(Self::S),
            "e" => Ok(Self::E),
            "w" => Ok(Self::W),
            "ne" => Ok(Self::NE),
            "nw" => Ok(Self::NW),
            "se" => Ok(Self::SE),
            "sw" => Ok(Self::SW),
            other => Err(format!("unknown handle direction '{}'", other)),
        }
    }
}

/// Rectangle spanned by two drag points, independent of drag direction
pub fn normalize(p0: Point, p1: Point) -> Rectangle {
    Rectangle {
        x: p0.x.min(p1.x),
        y: p0.y.min(p1.y),
        width: (p1.x - p0.x).abs(),
        height: (p1.y - p0.y).abs(),
    }
}

/// Accept a finished drag only if it meets the minimum size. Never grows it.
pub fn clamp_min(
    rect: Rectangle,
    min_width: f64,
    min_height: f64,
) -> Result<Rectangle, SelectionError> {
    if rect.width < min_width || rect.height < min_height {
        return Err(SelectionError::SelectionTooSmall {
            width: rect.width,
            height: rect.height,
            min_width,
            min_height,
        });
    }
    Ok(rect)
}

/// Resize `original` by a pointer delta through the given handle.
///
/// When the result would drop under the minimum, the dimension is pinned to
/// the minimum and, for west/north handles, the moving edge is frozen so the
/// opposite edge stays where it was in `original`.
pub fn apply_handle_delta(
    original: Rectangle,
    handle: HandleDirection,
    dx: f64,
    dy: f64,
    min_width: f64,
    min_height: f64,
) -> Rectangle {
    let mut rect = original;

    if handle.moves_west() {
        rect.x += dx;
        rect.width -= dx;
    }
    if handle.moves_east() {
        rect.width += dx;
    }
    if handle.moves_north() {
        rect.y += dy;
        rect.height -= dy;
    }
    if handle.moves_south() {
        rect.height += dy;
    }

    if rect.width < min_width {
        if handle.moves_west() {
            rect.x = original.x + original.width - min_width;
        }
        rect.width = min_width;
    }
    if rect.height < min_height {
        if handle.moves_north() {
            rect.y = original.y + original.height - min_height;
        }
        rect.height = min_height;
    }

    rect
}

/// Button-driven size change that never goes under `min`
pub fn adjust_dimension(current: f64, delta: f64, min: f64) -> f64 {
    (current + delta).max(min)
}

/// Map a viewport rectangle onto physical screen pixels, per axis
pub fn scale_to_screen(rect: Rectangle, viewport: Size, screen: Size) -> Rectangle {
    let sx = if viewport.width > 0.0 {
        screen.width / viewport.width
    } else {
        1.0
    };
    let sy = if viewport.height > 0.0 {
        screen.height / viewport.height
    } else {
        1.0
    };

    Rectangle {
        x: rect.x * sx,
        y: rect.y * sy,
        width: rect.width * sx,
        height: rect.height * sy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CROP_MIN: f64 = 50.0;

    #[test]
    fn test_normalize_is_direction_independent() {
        let pairs = [
            (Point::new(10.0, 20.0), Point::new(110.0, 220.0)),
            (Point::new(300.0, 40.0), Point::new(20.0, 90.0)),
            (Point::new(-5.0, 400.0), Point::new(60.0, -12.5)),
            (Point::new(7.0, 7.0), Point::new(7.0, 7.0)),
        ];

        for (p0, p1) in pairs {
            let a = normalize(p0, p1);
            assert_eq!(a, normalize(p1, p0));
            assert_eq!(a.x, p0.x.min(p1.x));
            assert_eq!(a.y, p0.y.min(p1.y));
            assert_eq!(a.right(), p0.x.max(p1.x));
            assert_eq!(a.bottom(), p0.y.max(p1.y));
        }
    }

    #[test]
    fn test_clamp_min_rejects_small_selection() {
        let rect = Rectangle::new(0.0, 0.0, 30.0, 40.0);
        let err = clamp_min(rect, CROP_MIN, CROP_MIN).unwrap_err();
        assert!(matches!(err, SelectionError::SelectionTooSmall { .. }));

        let rect = Rectangle::new(0.0, 0.0, 50.0, 50.0);
        assert_eq!(clamp_min(rect, CROP_MIN, CROP_MIN).unwrap(), rect);
    }

    #[test]
    fn test_southeast_handle_grows() {
        let original = Rectangle::new(100.0, 100.0, 200.0, 150.0);
        let rect = apply_handle_delta(original, HandleDirection::SE, 20.0, 20.0, 50.0, 50.0);

        assert_eq!(rect, Rectangle::new(100.0, 100.0, 220.0, 170.0));
    }

    #[test]
    fn test_northwest_handle_moves_origin() {
        let original = Rectangle::new(100.0, 100.0, 200.0, 150.0);
        let rect = apply_handle_delta(original, HandleDirection::NW, 20.0, 20.0, 50.0, 50.0);

        assert_eq!(rect, Rectangle::new(120.0, 120.0, 180.0, 130.0));
    }

    #[test]
    fn test_single_edge_handles() {
        let original = Rectangle::new(0.0, 0.0, 200.0, 200.0);

        let n = apply_handle_delta(original, HandleDirection::N, 99.0, 10.0, 50.0, 50.0);
        assert_eq!(n, Rectangle::new(0.0, 10.0, 200.0, 190.0));

        let s = apply_handle_delta(original, HandleDirection::S, 99.0, 10.0, 50.0, 50.0);
        assert_eq!(s, Rectangle::new(0.0, 0.0, 200.0, 210.0));

        let e = apply_handle_delta(original, HandleDirection::E, 10.0, 99.0, 50.0, 50.0);
        assert_eq!(e, Rectangle::new(0.0, 0.0, 210.0, 200.0));

        let w = apply_handle_delta(original, HandleDirection::W, 10.0, 99.0, 50.0, 50.0);
        assert_eq!(w, Rectangle::new(10.0, 0.0, 190.0, 200.0));
    }

    #[test]
    fn test_west_shrink_pins_east_edge() {
        let original = Rectangle::new(0.0, 0.0, 200.0, 200.0);
        let rect = apply_handle_delta(original, HandleDirection::W, 170.0, 0.0, CROP_MIN, CROP_MIN);

        assert_eq!(rect.width, 50.0);
        assert_eq!(rect.x, 150.0);
        assert_eq!(rect.right(), original.right());
    }

    #[test]
    fn test_north_shrink_pins_south_edge() {
        let original = Rectangle::new(10.0, 10.0, 300.0, 300.0);
        let rect = apply_handle_delta(original, HandleDirection::NE, 0.0, 290.0, 100.0, 100.0);

        assert_eq!(rect.height, 100.0);
        assert_eq!(rect.y, 210.0);
        assert_eq!(rect.bottom(), original.bottom());
    }

    #[test]
    fn test_east_shrink_keeps_origin() {
        let original = Rectangle::new(40.0, 40.0, 200.0, 200.0);
        let rect = apply_handle_delta(original, HandleDirection::SE, -500.0, -500.0, 50.0, 50.0);

        assert_eq!(rect, Rectangle::new(40.0, 40.0, 50.0, 50.0));
    }

    #[test]
    fn test_adjust_dimension_floor() {
        assert_eq!(adjust_dimension(120.0, 20.0, 100.0), 140.0);
        assert_eq!(adjust_dimension(110.0, -20.0, 100.0), 100.0);
        assert_eq!(adjust_dimension(100.0, -20.0, 100.0), 100.0);
    }

    #[test]
    fn test_scale_to_screen() {
        let rect = Rectangle::new(100.0, 50.0, 200.0, 100.0);
        let scaled = scale_to_screen(rect, Size::new(1000.0, 500.0), Size::new(2000.0, 1500.0));

        assert_eq!(scaled, Rectangle::new(200.0, 150.0, 400.0, 300.0));
    }

    #[test]
    fn test_labels() {
        let rect = Rectangle::new(10.0, 20.0, 99.6, 50.2);
        assert_eq!(rect.dimension_label(), "100 x 50");

        let rect = Rectangle::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(
            rect.clip_path(),
            "polygon(10px 20px, 40px 20px, 40px 60px, 10px 60px)"
        );
    }

    #[test]
    fn test_handle_direction_parse() {
        for handle in HandleDirection::ALL {
            assert_eq!(handle.as_str().parse::<HandleDirection>().unwrap(), handle);
        }
        assert!("north".parse::<HandleDirection>().is_err());
    }
}
