//! Coordinate space marker types.
//!
//! These are zero-sized types (ZSTs) used as type parameters to distinguish
//! between pixel-grid and CRS coordinates at compile time.

use std::fmt;

/// Marker type for pixel coordinates (column, row) on a raster grid.
///
/// (0, 0) is the top-left corner of the top-left pixel.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker type for world coordinates, expressed in the units of the
/// image's coordinate reference system.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum World {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for World {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
