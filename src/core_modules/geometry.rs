// THEORY:
// Small value types shared by every layer: a pixel coordinate, a rectangle in frame
// pixel space, and a resolution. They carry no behavior beyond arithmetic on
// themselves.
//
// Rectangles are half-open: `x1..x2` by `y1..y2`. A rectangle of `(0,0,10,10)` covers
// exactly 100 pixels and its local coordinates run from 0 to 9 on both axes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A whole-pixel coordinate. Local or global depending on how it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Shifts the point by a region's top-left corner.
    pub fn offset_by(&self, origin: Point) -> Point {
        Point {
            x: self.x + origin.x,
            y: self.y + origin.y,
        }
    }
}

/// Which coordinate system extracted positions are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateSpace {
    /// Relative to the region's top-left corner.
    #[default]
    Local,
    /// Relative to the full frame.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// True when the rectangle has positive area.
    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    pub fn fits_within(&self, bounds: Resolution) -> bool {
        self.x2 <= bounds.width && self.y2 <= bounds.height
    }

    /// Maps the rectangle from one resolution onto another, rounding every corner to
    /// the nearest pixel. Each axis scales independently.
    pub fn rescaled(&self, from: Resolution, to: Resolution) -> Rect {
        let sx = to.width as f64 / from.width as f64;
        let sy = to.height as f64 / from.height as f64;
        let scale = |v: u32, s: f64| (v as f64 * s).round() as u32;
        Rect {
            x1: scale(self.x1, sx),
            y1: scale(self.y1, sy),
            x2: scale(self.x2, sx),
            y2: scale(self.y2, sy),
        }
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[u32; 4]> for Rect {
    fn from(c: [u32; 4]) -> Self {
        Rect::new(c[0], c[1], c[2], c[3])
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_halves_each_axis() {
        let r = Rect::new(0, 0, 100, 100);
        let scaled = r.rescaled(Resolution::new(200, 200), Resolution::new(100, 100));
        assert_eq!(scaled, Rect::new(0, 0, 50, 50));
    }

    #[test]
    fn rescale_axes_are_independent() {
        let r = Rect::new(10, 10, 30, 30);
        let scaled = r.rescaled(Resolution::new(100, 100), Resolution::new(200, 50));
        assert_eq!(scaled, Rect::new(20, 5, 60, 15));
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        // 3 * (2/3) = 2.0, 5 * (2/3) = 3.33.., 7 * (2/3) = 4.66..
        let r = Rect::new(3, 3, 5, 7);
        let scaled = r.rescaled(Resolution::new(3, 3), Resolution::new(2, 2));
        assert_eq!(scaled, Rect::new(2, 2, 3, 5));
    }

    #[test]
    fn degenerate_rects_are_detected() {
        assert!(Rect::new(5, 0, 5, 10).is_degenerate());
        assert!(Rect::new(0, 9, 10, 3).is_degenerate());
        assert!(!Rect::new(0, 0, 1, 1).is_degenerate());
    }

    #[test]
    fn point_distance_and_offset() {
        let a = Point::new(0, 0);
        let b = Point::new(6, 8);
        assert_eq!(a.distance_to(&b), 10.0);
        assert_eq!(b.offset_by(Point::new(100, 200)), Point::new(106, 208));
    }
}
