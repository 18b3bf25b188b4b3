//! Rectangles.

use cgmath::{Point2, Vector2, Zero};

/// An element's bounds in its parent's coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Rectangle origin (`x`, `y`).
    pub origin: Point2<f64>,

    /// Rectangle size (`w`, `h`).
    pub size: Vector2<f64>,
}

impl Rect {
    /// Creates a new rectangle.
    pub fn new(origin: Point2<f64>, size: Vector2<f64>) -> Rect {
        Rect { origin, size }
    }

    /// Returns a zero-sized rectangle at the origin.
    pub fn zero() -> Rect {
        Rect {
            origin: Point2::new(0., 0.),
            size: Vector2::zero(),
        }
    }

    /// Returns true if the point is inside the rectangle.
    pub fn contains(&self, point: Point2<f64>) -> bool {
        point.x >= self.origin.x
            && point.y >= self.origin.y
            && point.x < self.origin.x + self.size.x
            && point.y < self.origin.y + self.size.y
    }
}

impl Default for Rect {
    fn default() -> Rect {
        Rect::zero()
    }
}

#[test]
fn test_rect_contains() {
    let rect = Rect::new(Point2::new(10., 20.), Vector2::new(5., 5.));
    assert!(rect.contains(Point2::new(10., 20.)));
    assert!(rect.contains(Point2::new(14.9, 24.9)));
    assert!(!rect.contains(Point2::new(15., 20.)), "right edge is exclusive");
    assert!(!Rect::zero().contains(Point2::new(0., 0.)), "empty rect contains nothing");
}
