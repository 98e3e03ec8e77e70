use std::ops::{Add, Mul, Sub};

use crate::ruler::RulerId;

/// A 2D point.
///
/// Most of the crate stores points normalized to `[0, 1]` relative to an
/// image's width and height. Values outside that range are still valid
/// coordinates (e.g. mid-drag before clamping).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Groups two points into one ruler. `None` for box corners.
    pub ruler_id: Option<RulerId>,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ruler_id: None,
        }
    }

    pub const fn with_ruler(x: f64, y: f64, ruler_id: RulerId) -> Self {
        Self {
            x,
            y,
            ruler_id: Some(ruler_id),
        }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Same position, tag dropped.
    pub fn untagged(self) -> Self {
        Self::new(self.x, self.y)
    }

    /// Scale the x and y axes independently (e.g. normalized -> pixels).
    pub fn scale_xy(self, sx: f64, sy: f64) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            ..self
        }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            ..self
        }
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            ..self
        }
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        self.scale_xy(rhs, rhs)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// Rotation direction of an ordered polygon, as seen on screen (y down).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winding {
    Clockwise,
    AntiClockwise,
}

/// Default measure box placed after an image is loaded or rotated.
pub fn default_box_corners() -> [Point; 4] {
    [
        Point::new(0.20, 0.20),
        Point::new(0.20, 0.80),
        Point::new(0.80, 0.80),
        Point::new(0.80, 0.20),
    ]
}
