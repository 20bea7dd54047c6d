//! Bounding boxes in CRS space.

use serde::{Deserialize, Serialize};

use super::coord::Coord;
use super::space::World;

/// An axis-aligned rectangle in CRS units: (left, bottom, right, top).
///
/// For a north-up raster `left <= right` and `bottom <= top`. Like the
/// other raster value types this does NOT enforce ordering in the
/// constructor; [`is_ordered`](Self::is_ordered) lets validation report a
/// flipped box instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from its four edges.
    #[inline]
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Creates the box spanned by two opposite corners.
    #[inline]
    pub fn from_corners(lower_left: Coord<World>, upper_right: Coord<World>) -> Self {
        Self::new(lower_left.x, lower_left.y, upper_right.x, upper_right.y)
    }

    /// Returns the width (`right - left`). Negative if the box is flipped.
    #[inline]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Returns the height (`top - bottom`). Negative if the box is flipped.
    #[inline]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if all edges are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.bottom.is_finite()
            && self.right.is_finite()
            && self.top.is_finite()
    }

    /// Returns true if `left <= right` and `bottom <= top`.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.left <= self.right && self.bottom <= self.top
    }

    /// Returns true if the two boxes share any area or edge.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }

    /// Returns true if the point lies inside the box or on its boundary.
    pub fn contains(&self, point: Coord<World>) -> bool {
        self.left <= point.x && point.x <= self.right && self.bottom <= point.y && point.y <= self.top
    }

    /// Returns the smallest box covering both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.left.min(other.left),
            self.bottom.min(other.bottom),
            self.right.max(other.right),
            self.top.max(other.top),
        )
    }

    /// Returns true if every edge differs by at most `tolerance`.
    pub fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.left - other.left).abs() <= tolerance
            && (self.bottom - other.bottom).abs() <= tolerance
            && (self.right - other.right).abs() <= tolerance
            && (self.top - other.top).abs() <= tolerance
    }
}
