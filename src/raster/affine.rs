//! Affine pixel-to-CRS transforms and the per-tile geometry derived from them.
//!
//! A transform maps a pixel corner `(col, row)` to CRS coordinates:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! For the usual north-up raster `b = d = 0`, `a > 0` and `e < 0`, so row 0
//! maps to the top edge.

use serde::{Deserialize, Serialize};

use super::bounds::BoundingBox;
use super::coord::Coord;
use super::space::{Pixel, World};
use crate::error::AstrotileError;

/// Six-coefficient affine transform from pixel (column, row) to CRS (x, y).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    #[inline]
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with the top-left corner at (`left`, `top`) and
    /// square-or-not pixels of `x_res` by `y_res` CRS units.
    pub fn from_origin(left: f64, top: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, left, 0.0, -y_res, top)
    }

    /// Builds a transform from a GDAL geotransform
    /// `[c, a, b, f, d, e]` (origin x, pixel width, row rotation,
    /// origin y, column rotation, pixel height).
    pub fn from_gdal(geotransform: [f64; 6]) -> Self {
        let [c, a, b, f, d, e] = geotransform;
        Self::new(a, b, c, d, e, f)
    }

    /// Returns the coefficients in GDAL geotransform order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// Maps a (possibly fractional) pixel position to CRS coordinates.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Typed variant of [`apply`](Self::apply).
    #[inline]
    pub fn to_world(&self, pixel: Coord<Pixel>) -> Coord<World> {
        let (x, y) = self.apply(pixel.x, pixel.y);
        Coord::new(x, y)
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Returns true if all six coefficients are finite.
    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Returns true if the determinant is (numerically) zero.
    pub fn is_singular(&self) -> bool {
        self.determinant().abs() < f64::EPSILON
    }

    /// Returns the CRS-to-pixel transform.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidArgument`] if the transform is singular.
    pub fn inverse(&self) -> Result<AffineTransform, AstrotileError> {
        if self.is_singular() {
            return Err(AstrotileError::InvalidArgument(format!(
                "transform {:?} is singular and cannot be inverted",
                self
            )));
        }

        let det = self.determinant();
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;

        Ok(AffineTransform::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// Maps a CRS position back onto the pixel grid.
    pub fn to_pixel(&self, world: Coord<World>) -> Result<Coord<Pixel>, AstrotileError> {
        let (col, row) = self.inverse()?.apply(world.x, world.y);
        Ok(Coord::new(col, row))
    }

    /// Returns true if the scale/rotation coefficients (a, b, d, e) of both
    /// transforms agree within `tolerance`. Two such transforms describe
    /// the same pixel grid up to a translation.
    pub fn same_resolution(&self, other: &AffineTransform, tolerance: f64) -> bool {
        (self.a - other.a).abs() <= tolerance
            && (self.b - other.b).abs() <= tolerance
            && (self.d - other.d).abs() <= tolerance
            && (self.e - other.e).abs() <= tolerance
    }
}

/// Returns the CRS bounding box of the pixel block spanning
/// `rows = (row_min, row_max)` and `cols = (col_min, col_max)`.
///
/// The lower-left corner is the image of pixel corner `(col_min, row_max)`
/// and the upper-right corner the image of `(col_max, row_min)`, both taken
/// through the full affine mapping.
pub fn bounds_for_tile(
    transform: &AffineTransform,
    rows: (usize, usize),
    cols: (usize, usize),
) -> BoundingBox {
    let (row_min, row_max) = rows;
    let (col_min, col_max) = cols;

    let lower_left = transform.to_world(Coord::new(col_min as f64, row_max as f64));
    let upper_right = transform.to_world(Coord::new(col_max as f64, row_min as f64));
    BoundingBox::from_corners(lower_left, upper_right)
}

/// Returns the transform of a tile whose top-left pixel sits at
/// (`row_off`, `col_off`) in the parent grid.
///
/// The origin is set directly to the parent's image of that pixel rather
/// than composed with a translation, so applying the result to pixel
/// (0, 0) reproduces the parent mapping bit for bit.
pub fn transform_for_tile(
    transform: &AffineTransform,
    row_off: usize,
    col_off: usize,
) -> AffineTransform {
    transform_for_offset(transform, row_off as i64, col_off as i64)
}

/// Signed variant of [`transform_for_tile`], for origins that lie above or
/// to the left of the reference grid's pixel (0, 0).
pub fn transform_for_offset(
    transform: &AffineTransform,
    row_off: i64,
    col_off: i64,
) -> AffineTransform {
    let (x, y) = transform.apply(col_off as f64, row_off as f64);
    AffineTransform {
        c: x,
        f: y,
        ..*transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ortho() -> AffineTransform {
        // 0.5 m pixels, UTM 38S around Mayotte
        AffineTransform::from_origin(499_000.0, 8_600_000.0, 0.5, 0.5)
    }

    #[test]
    fn test_apply_north_up() {
        let t = ortho();
        assert_eq!(t.apply(0.0, 0.0), (499_000.0, 8_600_000.0));
        assert_eq!(t.apply(2000.0, 2000.0), (500_000.0, 8_599_000.0));
    }

    #[test]
    fn test_gdal_roundtrip() {
        let gt = [499_000.0, 0.5, 0.0, 8_600_000.0, 0.0, -0.5];
        let t = AffineTransform::from_gdal(gt);
        assert_eq!(t, ortho());
        assert_eq!(t.to_gdal(), gt);
    }

    #[test]
    fn test_bounds_for_whole_image() {
        let bounds = bounds_for_tile(&ortho(), (0, 2000), (0, 2000));
        assert_eq!(
            bounds,
            BoundingBox::new(499_000.0, 8_599_000.0, 500_000.0, 8_600_000.0)
        );
    }

    #[test]
    fn test_bounds_for_tile_uses_full_mapping() {
        // Non-trivial skew: every coefficient participates.
        let t = AffineTransform::new(1.0, 1.0, 0.0, 5.0, 1.0, 0.0);
        let bounds = bounds_for_tile(&t, (1, 2), (0, 1));
        // (col 0, row 2) -> (2, 2); (col 1, row 1) -> (2, 6)
        assert_eq!(bounds, BoundingBox::new(2.0, 2.0, 2.0, 6.0));
    }

    #[test]
    fn test_transform_for_tile_is_exact() {
        let t = AffineTransform::new(0.3, 0.01, 652_123.456, -0.02, -0.3, 6_862_987.654);
        for (row, col) in [(0usize, 0usize), (7, 3), (1000, 1500), (1999, 1)] {
            let tile = transform_for_tile(&t, row, col);
            let origin = tile.apply(0.0, 0.0);
            let expected = t.apply(col as f64, row as f64);
            assert!((origin.0 - expected.0).abs() <= 1e-9);
            assert!((origin.1 - expected.1).abs() <= 1e-9);
            assert!(tile.same_resolution(&t, 0.0));
        }
    }

    #[test]
    fn test_transform_for_tile_zero_offset_is_identity() {
        let t = ortho();
        assert_eq!(transform_for_tile(&t, 0, 0), t);
    }

    #[test]
    fn test_transform_for_negative_offset() {
        let t = ortho();
        let shifted = transform_for_offset(&t, -2, -4);
        assert_eq!(shifted.c, 498_998.0);
        assert_eq!(shifted.f, 8_600_001.0);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = AffineTransform::new(0.5, 0.1, 1000.0, 0.05, -0.5, 2000.0);
        let world = t.to_world(Coord::new(123.0, 456.0));
        let pixel = t.to_pixel(world).expect("invertible");
        assert!((pixel.x - 123.0).abs() < 1e-6);
        assert!((pixel.y - 456.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_singular_fails() {
        let t = AffineTransform::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0);
        assert!(t.is_singular());
        assert!(matches!(
            t.inverse(),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }
}
