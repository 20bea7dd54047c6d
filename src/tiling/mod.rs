//! Tile-border generation and image splitting.
//!
//! Splitting an image of `height × width` pixels into tiles of side `t`
//! produces `ceil(height / t) * ceil(width / t)` tiles, each exactly
//! `t × t`. When a dimension is not a multiple of `t`, the last span along
//! that axis is shifted back to end at the image edge, so it overlaps its
//! neighbour instead of running off the grid.
//!
//! # Example
//!
//! ```
//! use astrotile::tiling::{generate_tile_borders, TileBorders};
//!
//! let borders = generate_tile_borders(4, 3, 2).unwrap();
//! assert_eq!(
//!     borders,
//!     vec![
//!         TileBorders::new((0, 2), (0, 2)),
//!         TileBorders::new((0, 2), (1, 3)),
//!         TileBorders::new((2, 4), (0, 2)),
//!         TileBorders::new((2, 4), (1, 3)),
//!     ]
//! );
//! ```

pub mod manifest;

use serde::{Deserialize, Serialize};

use crate::error::AstrotileError;
use crate::raster::{SatelliteImage, SegmentationLabeledImage};

/// The pixel-index extent of one tile: rows `row_min..row_max` and
/// columns `col_min..col_max` (half-open).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileBorders {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl TileBorders {
    /// Creates tile borders from `(row_min, row_max)` and `(col_min, col_max)`.
    #[inline]
    pub fn new(rows: (usize, usize), cols: (usize, usize)) -> Self {
        Self {
            row_min: rows.0,
            row_max: rows.1,
            col_min: cols.0,
            col_max: cols.1,
        }
    }

    #[inline]
    pub fn rows(&self) -> (usize, usize) {
        (self.row_min, self.row_max)
    }

    #[inline]
    pub fn cols(&self) -> (usize, usize) {
        (self.col_min, self.col_max)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.row_max.saturating_sub(self.row_min)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.col_max.saturating_sub(self.col_min)
    }

    /// Checks that the tile is non-empty and fits a `height × width` grid.
    pub fn check_within(&self, height: usize, width: usize) -> Result<(), AstrotileError> {
        if self.row_min >= self.row_max
            || self.col_min >= self.col_max
            || self.row_max > height
            || self.col_max > width
        {
            return Err(AstrotileError::InvalidArgument(format!(
                "tile rows {:?} / cols {:?} do not fit a {}x{} grid",
                self.rows(),
                self.cols(),
                height,
                width
            )));
        }
        Ok(())
    }
}

/// Computes the borders of every tile needed to cover a `height × width`
/// grid with square tiles of side `tile_length`.
///
/// Tiles are returned row-major (columns vary fastest).
///
/// # Errors
/// Returns [`AstrotileError::InvalidArgument`] if `tile_length` is zero or
/// larger than either dimension.
pub fn generate_tile_borders(
    height: usize,
    width: usize,
    tile_length: usize,
) -> Result<Vec<TileBorders>, AstrotileError> {
    if tile_length == 0 {
        return Err(AstrotileError::InvalidArgument(
            "tile length must be positive".to_string(),
        ));
    }
    if tile_length > height || tile_length > width {
        return Err(AstrotileError::InvalidArgument(format!(
            "tile length {} exceeds image size {}x{}",
            tile_length, height, width
        )));
    }

    let row_spans = spans(height, tile_length);
    let col_spans = spans(width, tile_length);

    let mut borders = Vec::with_capacity(row_spans.len() * col_spans.len());
    for &rows in &row_spans {
        for &cols in &col_spans {
            borders.push(TileBorders::new(rows, cols));
        }
    }
    Ok(borders)
}

/// Spans along one axis, the trailing partial one shifted back to `len`.
fn spans(len: usize, tile_length: usize) -> Vec<(usize, usize)> {
    (0..len)
        .step_by(tile_length)
        .map(|start| {
            if start + tile_length <= len {
                (start, start + tile_length)
            } else {
                (len - tile_length, len)
            }
        })
        .collect()
}

/// Splits an image into square tiles of side `tile_length`.
///
/// Each tile owns a copy of its pixels and carries the parent's CRS,
/// region and date, with its own transform and bounds. Tiles are returned
/// in [`generate_tile_borders`] order.
pub fn split_image<T: Clone>(
    image: &SatelliteImage<T>,
    tile_length: usize,
) -> Result<Vec<SatelliteImage<T>>, AstrotileError> {
    let borders = generate_tile_borders(image.height(), image.width(), tile_length)?;
    log::debug!(
        "splitting {}x{} image into {} tile(s) of side {}",
        image.height(),
        image.width(),
        borders.len(),
        tile_length
    );

    borders.iter().map(|b| image.tile(b)).collect()
}

/// Splits a segmentation-labeled image, slicing the mask with the same
/// borders as the pixels so tile `i` of the output pairs image tile `i`
/// with label tile `i`.
pub fn split_segmentation<T: Clone>(
    labeled: &SegmentationLabeledImage<T>,
    tile_length: usize,
) -> Result<Vec<SegmentationLabeledImage<T>>, AstrotileError> {
    let image = labeled.image();
    let borders = generate_tile_borders(image.height(), image.width(), tile_length)?;
    log::debug!(
        "splitting segmentation-labeled image into {} tile(s)",
        borders.len()
    );

    borders.iter().map(|b| labeled.tile(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use ndarray::Array3;

    use crate::raster::AffineTransform;

    fn as_set(borders: &[TileBorders]) -> HashSet<TileBorders> {
        borders.iter().copied().collect()
    }

    #[test]
    fn test_borders_2x2_unit_tiles() {
        let borders = generate_tile_borders(2, 2, 1).unwrap();
        let expected = [
            TileBorders::new((1, 2), (1, 2)),
            TileBorders::new((0, 1), (0, 1)),
            TileBorders::new((0, 1), (1, 2)),
            TileBorders::new((1, 2), (0, 1)),
        ];
        assert_eq!(borders.len(), 4);
        assert_eq!(as_set(&borders), as_set(&expected));
    }

    #[test]
    fn test_borders_column_overlap() {
        let borders = generate_tile_borders(4, 3, 2).unwrap();
        let expected = [
            TileBorders::new((0, 2), (0, 2)),
            TileBorders::new((2, 4), (0, 2)),
            TileBorders::new((0, 2), (1, 3)),
            TileBorders::new((2, 4), (1, 3)),
        ];
        assert_eq!(as_set(&borders), as_set(&expected));
    }

    #[test]
    fn test_borders_exact_division() {
        let borders = generate_tile_borders(6, 4, 2).unwrap();
        let expected = [
            TileBorders::new((0, 2), (0, 2)),
            TileBorders::new((2, 4), (0, 2)),
            TileBorders::new((4, 6), (0, 2)),
            TileBorders::new((0, 2), (2, 4)),
            TileBorders::new((2, 4), (2, 4)),
            TileBorders::new((4, 6), (2, 4)),
        ];
        assert_eq!(as_set(&borders), as_set(&expected));
    }

    #[test]
    fn test_borders_both_axes_shift_back() {
        // 2000 / 1500: the bottom-right tile overlaps both neighbours.
        let borders = generate_tile_borders(2000, 2000, 1500).unwrap();
        assert_eq!(
            borders,
            vec![
                TileBorders::new((0, 1500), (0, 1500)),
                TileBorders::new((0, 1500), (500, 2000)),
                TileBorders::new((500, 2000), (0, 1500)),
                TileBorders::new((500, 2000), (500, 2000)),
            ]
        );
    }

    #[test]
    fn test_borders_are_row_major() {
        let borders = generate_tile_borders(4, 6, 2).unwrap();
        let starts: Vec<(usize, usize)> =
            borders.iter().map(|b| (b.row_min, b.col_min)).collect();
        assert_eq!(
            starts,
            vec![(0, 0), (0, 2), (0, 4), (2, 0), (2, 2), (2, 4)]
        );
    }

    #[test]
    fn test_borders_tile_too_large() {
        assert!(matches!(
            generate_tile_borders(10, 4, 5),
            Err(AstrotileError::InvalidArgument(_))
        ));
        assert!(matches!(
            generate_tile_borders(4, 10, 5),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_borders_zero_tile_length() {
        assert!(matches!(
            generate_tile_borders(4, 4, 0),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_split_image_shapes() {
        let image = SatelliteImage::new(
            Array3::<u8>::zeros((3, 20, 20)),
            "EPSG:4471",
            AffineTransform::from_origin(499_000.0, 8_600_000.0, 0.5, 0.5),
        );

        let tiles = split_image(&image, 10).unwrap();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.array().dim() == (3, 10, 10)));

        let tiles = split_image(&image, 15).unwrap();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.array().dim() == (3, 15, 15)));
    }

    #[test]
    fn test_split_image_tile_transforms() {
        let transform = AffineTransform::from_origin(499_000.0, 8_600_000.0, 0.5, 0.5);
        let image = SatelliteImage::new(Array3::<u8>::zeros((1, 4, 4)), "EPSG:4471", transform);

        let tiles = split_image(&image, 2).unwrap();
        let origins: Vec<(f64, f64)> = tiles
            .iter()
            .map(|t| (t.transform().c, t.transform().f))
            .collect();
        assert_eq!(
            origins,
            vec![
                (499_000.0, 8_600_000.0),
                (499_001.0, 8_600_000.0),
                (499_000.0, 8_599_999.0),
                (499_001.0, 8_599_999.0),
            ]
        );
    }
}
