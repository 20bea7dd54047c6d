//! Georeferenced raster types.
//!
//! This module holds the in-memory representation of a satellite scene and
//! its labels. A scene is a band-major pixel array tied to the ground by a
//! coordinate reference system and an affine pixel-to-world transform.
//!
//! # Design Principles
//!
//! 1. **Derived georeferencing**: An image never stores its bounds. They
//!    are computed from the transform and the array extent, so tiles and
//!    mosaics cannot drift out of sync with their pixels.
//!
//! 2. **Marker types**: [`Coord`] is tagged with [`Pixel`] or [`World`] so
//!    that pixel positions and CRS coordinates cannot be mixed up.
//!
//! 3. **Checked labels**: Labeled images are only built through
//!    constructors that enforce their invariants (mask shape, box extents,
//!    binary class values).
//!
//! # Example
//!
//! ```
//! use astrotile::raster::{AffineTransform, SatelliteImage};
//! use ndarray::Array3;
//!
//! let image = SatelliteImage::new(
//!     Array3::<u8>::zeros((3, 4, 4)),
//!     "EPSG:4471",
//!     AffineTransform::from_origin(509_000.0, 8_593_000.0, 0.5, 0.5),
//! );
//! let bounds = image.bounds();
//! assert_eq!(bounds.width(), 2.0);
//! assert_eq!(bounds.top, 8_593_000.0);
//! ```

mod affine;
mod bounds;
mod coord;
mod crs;
mod image;
pub mod io_json;
mod label;
mod space;

pub use affine::{bounds_for_tile, transform_for_offset, transform_for_tile, AffineTransform};
pub use bounds::BoundingBox;
pub use coord::Coord;
pub use crs::Crs;
pub use image::SatelliteImage;
pub use label::{
    aggregate_mask, AggregationPolicy, ClassLabel, ClassificationLabeledImage,
    DetectionLabeledImage, ElementType, LabelMeta, LabeledImage, PixelBox,
    SegmentationLabeledImage, SegmentationMask,
};
pub use space::{Pixel, World};
