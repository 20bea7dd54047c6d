//! Mosaic reassembly.
//!
//! Tiles produced by [`crate::tiling`] (or any set of images on a common
//! pixel grid) are placed back onto a single canvas. Placement is purely
//! geometric: each tile's pixel offset is measured in the first tile's
//! grid through the inverse affine transform, so tiles may arrive in any
//! order and may overlap.
//!
//! # Example
//!
//! ```
//! use astrotile::mosaic::assemble;
//! use astrotile::raster::{AffineTransform, SatelliteImage};
//! use ndarray::Array3;
//!
//! let image = SatelliteImage::new(
//!     Array3::from_shape_fn((3, 6, 4), |(b, r, c)| (b * 100 + r * 10 + c) as u16),
//!     "EPSG:2975",
//!     AffineTransform::from_origin(338_000.0, 7_690_000.0, 0.5, 0.5),
//! );
//! let tiles = image.split(2).unwrap();
//! let mosaic = assemble(&tiles).unwrap();
//! assert_eq!(mosaic, image);
//! ```

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array3, ArrayView3, Axis};

use crate::error::AstrotileError;
use crate::raster::{
    bounds_for_tile, transform_for_offset, AffineTransform, BoundingBox, SatelliteImage,
    SegmentationLabeledImage, SegmentationMask,
};

/// Maximum difference allowed between the a/b/d/e coefficients of tiles.
pub const RESOLUTION_TOLERANCE: f64 = 1e-9;

/// Maximum distance (in pixels) between a tile origin and the nearest
/// node of the reference grid.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Which tile wins where tiles overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeMethod {
    /// Earlier tiles in input order win.
    #[default]
    First,
    /// Later tiles in input order win.
    Last,
}

impl FromStr for MergeMethod {
    type Err = AstrotileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(AstrotileError::InvalidArgument(format!(
                "unknown merge method '{}' (supported: first, last)",
                other
            ))),
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Last => write!(f, "last"),
        }
    }
}

/// Placement of a set of tiles on a common canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct MosaicLayout {
    /// Transform of the canvas (its pixel (0, 0) is the top-left corner).
    pub transform: AffineTransform,
    pub height: usize,
    pub width: usize,
    /// `(row, col)` of each tile's top-left pixel on the canvas, in input order.
    pub offsets: Vec<(usize, usize)>,
}

impl MosaicLayout {
    /// Computes the layout of `tiles`.
    ///
    /// # Errors
    /// - [`AstrotileError::InvalidArgument`] if `tiles` is empty, if the
    ///   tiles differ in band count or resolution, if a tile is not
    ///   aligned with the first tile's pixel grid, or if the canvas
    ///   spanning the tiles is too large to address.
    /// - [`AstrotileError::CrsMismatch`] if the tiles differ in CRS.
    pub fn for_tiles<T>(tiles: &[SatelliteImage<T>]) -> Result<Self, AstrotileError> {
        Self::for_images(tiles)
    }

    /// Like [`for_tiles`](Self::for_tiles) over borrowed images, so callers
    /// holding images inside other values need not copy them.
    pub fn for_images<'a, T: 'a>(
        tiles: impl IntoIterator<Item = &'a SatelliteImage<T>>,
    ) -> Result<Self, AstrotileError> {
        let tiles: Vec<&SatelliteImage<T>> = tiles.into_iter().collect();
        let (first, rest) = tiles.split_first().ok_or_else(|| {
            AstrotileError::InvalidArgument("cannot assemble a mosaic from zero tiles".to_string())
        })?;

        for (i, tile) in rest.iter().enumerate() {
            let index = i + 1;
            if tile.crs() != first.crs() {
                return Err(AstrotileError::CrsMismatch {
                    expected: first.crs().clone(),
                    found: tile.crs().clone(),
                });
            }
            if tile.band_count() != first.band_count() {
                return Err(AstrotileError::InvalidArgument(format!(
                    "tile {} has {} band(s), expected {}",
                    index,
                    tile.band_count(),
                    first.band_count()
                )));
            }
            if !tile
                .transform()
                .same_resolution(first.transform(), RESOLUTION_TOLERANCE)
            {
                return Err(AstrotileError::InvalidArgument(format!(
                    "tile {} has transform {:?}, which does not share the resolution of {:?}",
                    index,
                    tile.transform(),
                    first.transform()
                )));
            }
        }

        let inverse = first.transform().inverse()?;
        let mut raw_offsets = Vec::with_capacity(tiles.len());
        for (index, tile) in tiles.iter().enumerate() {
            let origin = tile.transform();
            let (col, row) = inverse.apply(origin.c, origin.f);
            raw_offsets.push((grid_offset(row, index)?, grid_offset(col, index)?));
        }

        let min_row = raw_offsets.iter().map(|&(r, _)| r).min().unwrap_or(0);
        let min_col = raw_offsets.iter().map(|&(_, c)| c).min().unwrap_or(0);

        let mut height = 0;
        let mut width = 0;
        let mut offsets = Vec::with_capacity(tiles.len());
        for (index, (tile, &(row, col))) in tiles.iter().zip(&raw_offsets).enumerate() {
            let row = canvas_offset(row, min_row, index)?;
            let col = canvas_offset(col, min_col, index)?;
            height = height.max(canvas_extent(row, tile.height(), index)?);
            width = width.max(canvas_extent(col, tile.width(), index)?);
            offsets.push((row, col));
        }
        check_canvas_size::<T>(first.band_count(), height, width)?;

        Ok(Self {
            transform: transform_for_offset(first.transform(), min_row, min_col),
            height,
            width,
            offsets,
        })
    }

    /// CRS bounds of the canvas.
    pub fn bounds(&self) -> BoundingBox {
        bounds_for_tile(&self.transform, (0, self.height), (0, self.width))
    }

    /// Paints `layers` (one per tile, band-major) onto a fresh canvas.
    /// Returns the canvas and the number of pixels no layer covered.
    fn paint<A: Clone + Default>(
        &self,
        layers: &[ArrayView3<'_, A>],
        method: MergeMethod,
    ) -> Result<(Array3<A>, usize), AstrotileError> {
        let bands = layers.first().map_or(0, |l| l.dim().0);
        let mut canvas = filled_array((bands, self.height, self.width), A::default())?;
        let mut covered = filled_array((1, self.height, self.width), false)?;

        let order: Vec<usize> = match method {
            MergeMethod::First => (0..layers.len()).collect(),
            MergeMethod::Last => (0..layers.len()).rev().collect(),
        };

        for index in order {
            let layer = &layers[index];
            let (row_off, col_off) = self.offsets[index];
            let (_, rows, cols) = layer.dim();
            for r in 0..rows {
                for c in 0..cols {
                    let (row, col) = (row_off + r, col_off + c);
                    if covered[[0, row, col]] {
                        continue;
                    }
                    covered[[0, row, col]] = true;
                    canvas
                        .slice_mut(s![.., row, col])
                        .assign(&layer.slice(s![.., r, c]));
                }
            }
        }

        let uncovered = covered.iter().filter(|&&c| !c).count();
        Ok((canvas, uncovered))
    }
}

fn grid_offset(value: f64, index: usize) -> Result<i64, AstrotileError> {
    let rounded = value.round();
    if !value.is_finite() || (value - rounded).abs() > GRID_TOLERANCE {
        return Err(AstrotileError::InvalidArgument(format!(
            "tile {} origin falls at fractional offset {} on the reference pixel grid",
            index, value
        )));
    }
    // i64::MAX as f64 rounds up to 2^63, which no i64 can hold.
    if rounded.abs() >= i64::MAX as f64 {
        return Err(AstrotileError::InvalidArgument(format!(
            "tile {} origin lies {} pixels from the reference grid origin",
            index, value
        )));
    }
    Ok(rounded as i64)
}

fn too_far(index: usize) -> AstrotileError {
    AstrotileError::InvalidArgument(format!(
        "tile {} lies too far from the other tiles to share a canvas",
        index
    ))
}

/// Offset of a tile on the canvas whose origin is `min`.
fn canvas_offset(offset: i64, min: i64, index: usize) -> Result<usize, AstrotileError> {
    offset
        .checked_sub(min)
        .and_then(|d| usize::try_from(d).ok())
        .ok_or_else(|| too_far(index))
}

fn canvas_extent(offset: usize, len: usize, index: usize) -> Result<usize, AstrotileError> {
    offset.checked_add(len).ok_or_else(|| too_far(index))
}

/// Rejects canvases whose pixel buffer could not be addressed. Mask
/// layers are painted on the same canvas with up to 8 bytes per pixel.
fn check_canvas_size<T>(bands: usize, height: usize, width: usize) -> Result<(), AstrotileError> {
    let element = std::mem::size_of::<T>().max(std::mem::size_of::<f64>());
    let fits = bands
        .max(1)
        .checked_mul(height)
        .and_then(|n| n.checked_mul(width))
        .and_then(|n| n.checked_mul(element))
        .is_some_and(|bytes| bytes <= isize::MAX as usize);
    if !fits {
        return Err(AstrotileError::InvalidArgument(format!(
            "a {}-band {}x{} mosaic canvas is too large",
            bands, height, width
        )));
    }
    Ok(())
}

/// `Array3::from_elem` that reports a failed allocation instead of aborting.
pub(crate) fn filled_array<A: Clone>(
    shape: (usize, usize, usize),
    value: A,
) -> Result<Array3<A>, AstrotileError> {
    let too_large = || {
        AstrotileError::InvalidArgument(format!("cannot allocate a canvas of shape {:?}", shape))
    };
    let len = shape
        .0
        .checked_mul(shape.1)
        .and_then(|n| n.checked_mul(shape.2))
        .ok_or_else(too_large)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| too_large())?;
    data.resize(len, value);
    Array3::from_shape_vec(shape, data).map_err(|_| too_large())
}

fn warn_uncovered(uncovered: usize, layout: &MosaicLayout) {
    if uncovered > 0 {
        log::warn!(
            "{} of {} mosaic pixel(s) are not covered by any tile and were filled with the default value",
            uncovered,
            layout.height * layout.width
        );
    }
}

/// Assembles tiles into one image; overlapping pixels come from the first
/// tile in input order.
///
/// See [`assemble_with`].
pub fn assemble<T: Clone + Default>(
    tiles: &[SatelliteImage<T>],
) -> Result<SatelliteImage<T>, AstrotileError> {
    assemble_with(tiles, MergeMethod::First)
}

/// Assembles tiles into one image.
///
/// The mosaic takes its CRS, region and date from the first tile. Its
/// bounds are the union of the tile bounds. Pixels that no tile covers
/// are set to `T::default()`.
///
/// # Errors
/// See [`MosaicLayout::for_tiles`].
pub fn assemble_with<T: Clone + Default>(
    tiles: &[SatelliteImage<T>],
    method: MergeMethod,
) -> Result<SatelliteImage<T>, AstrotileError> {
    let layout = MosaicLayout::for_tiles(tiles)?;
    log::debug!(
        "assembling {} tile(s) into a {}x{} mosaic (merge: {})",
        tiles.len(),
        layout.height,
        layout.width,
        method
    );

    let layers: Vec<_> = tiles.iter().map(|t| t.array().view()).collect();
    let (canvas, uncovered) = layout.paint(&layers, method)?;
    warn_uncovered(uncovered, &layout);

    // for_tiles guarantees a first tile
    Ok(tiles[0].derive(canvas, layout.transform))
}

/// Assembles segmentation-labeled tiles; image and mask share one layout
/// and one overlap rule.
pub fn assemble_labeled<T: Clone + Default>(
    tiles: &[SegmentationLabeledImage<T>],
) -> Result<SegmentationLabeledImage<T>, AstrotileError> {
    assemble_labeled_with(tiles, MergeMethod::First)
}

/// Like [`assemble_labeled`] with an explicit merge method.
///
/// # Errors
/// Returns [`AstrotileError::InvalidLabel`] if the tiles mix class-id and
/// logits masks, otherwise the errors of [`MosaicLayout::for_tiles`].
pub fn assemble_labeled_with<T: Clone + Default>(
    tiles: &[SegmentationLabeledImage<T>],
    method: MergeMethod,
) -> Result<SegmentationLabeledImage<T>, AstrotileError> {
    let layout = MosaicLayout::for_images(tiles.iter().map(|t| t.image()))?;

    let layers: Vec<_> = tiles.iter().map(|t| t.image().array().view()).collect();
    let (canvas, uncovered) = layout.paint(&layers, method)?;
    warn_uncovered(uncovered, &layout);
    let image = tiles[0].image().derive(canvas, layout.transform);

    let mixed = || {
        AstrotileError::InvalidLabel(
            "cannot assemble a mosaic from a mix of class-id and logits masks".to_string(),
        )
    };
    let mask = match tiles[0].mask() {
        SegmentationMask::ClassIds(_) => {
            let layers = tiles
                .iter()
                .map(|t| match t.mask() {
                    SegmentationMask::ClassIds(a) => Ok(a.view().insert_axis(Axis(0))),
                    SegmentationMask::Logits(_) => Err(mixed()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            SegmentationMask::ClassIds(layout.paint(&layers, method)?.0.remove_axis(Axis(0)))
        }
        SegmentationMask::Logits(_) => {
            let layers = tiles
                .iter()
                .map(|t| match t.mask() {
                    SegmentationMask::Logits(a) => Ok(a.view().insert_axis(Axis(0))),
                    SegmentationMask::ClassIds(_) => Err(mixed()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            SegmentationMask::Logits(layout.paint(&layers, method)?.0.remove_axis(Axis(0)))
        }
    };

    Ok(SegmentationLabeledImage::new(image, mask)?.with_meta(tiles[0].meta().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    use crate::raster::Crs;

    fn image(height: usize, width: usize) -> SatelliteImage<u16> {
        SatelliteImage::new(
            Array3::from_shape_fn((3, height, width), |(b, r, c)| {
                (b * 1000 + r * 10 + c + 1) as u16
            }),
            "EPSG:2975",
            AffineTransform::from_origin(338_000.0, 7_690_000.0, 0.5, 0.5),
        )
        .with_region("974")
        .with_date("2022-05-01")
    }

    #[test]
    fn test_merge_method_parse() {
        assert_eq!("first".parse::<MergeMethod>().unwrap(), MergeMethod::First);
        assert_eq!("last".parse::<MergeMethod>().unwrap(), MergeMethod::Last);
        assert!("max".parse::<MergeMethod>().is_err());
        assert_eq!(MergeMethod::default(), MergeMethod::First);
    }

    #[test]
    fn test_roundtrip_exact_tiling() {
        let original = image(6, 4);
        let tiles = original.split(2).unwrap();
        let mosaic = assemble(&tiles).unwrap();

        assert_eq!(mosaic.array(), original.array());
        assert_eq!(mosaic.transform(), original.transform());
        assert_eq!(mosaic.bounds(), original.bounds());
        assert_eq!(mosaic.crs(), original.crs());
        assert_eq!(mosaic.region(), Some("974"));
    }

    #[test]
    fn test_roundtrip_with_shifted_final_tiles() {
        let original = image(7, 5);
        let tiles = original.split(3).unwrap();
        assert_eq!(assemble(&tiles).unwrap(), original);
        assert_eq!(assemble_with(&tiles, MergeMethod::Last).unwrap(), original);
    }

    #[test]
    fn test_roundtrip_on_fractional_grid() {
        let transform = AffineTransform::new(0.3, 0.01, 652_123.456, -0.02, -0.3, 6_862_987.654);
        let original = SatelliteImage::new(
            Array3::from_shape_fn((2, 11, 9), |(b, r, c)| (b * 1000 + r * 10 + c) as u16),
            "EPSG:2154",
            transform,
        );
        let mut tiles = original.split(4).unwrap();
        let mosaic = assemble(&tiles).unwrap();
        assert_eq!(mosaic, original);

        tiles.reverse();
        let mosaic = assemble(&tiles).unwrap();
        assert_eq!(mosaic.array(), original.array());
        assert!(mosaic.bounds().approx_eq(&original.bounds(), 1e-6));
    }

    #[test]
    fn test_roundtrip_in_any_order() {
        let original = image(4, 4);
        let mut tiles = original.split(2).unwrap();
        tiles.reverse();
        let mosaic = assemble(&tiles).unwrap();

        assert_eq!(mosaic.array(), original.array());
        assert!(mosaic.bounds().approx_eq(&original.bounds(), 1e-9));
    }

    #[test]
    fn test_bounds_are_union_of_tiles() {
        let original = image(6, 6);
        let tiles = original.split(2).unwrap();
        let picked = vec![tiles[1].clone(), tiles[6].clone()];

        let mosaic = assemble(&picked).unwrap();
        let expected = picked[0].bounds().union(&picked[1].bounds());
        assert!(mosaic.bounds().approx_eq(&expected, 1e-9));
        assert_eq!(mosaic.height(), 6);
        assert_eq!(mosaic.width(), 4);
    }

    #[test]
    fn test_gap_is_filled_with_default() {
        let original = image(4, 4);
        let tiles = original.split(2).unwrap();
        let diagonal = vec![tiles[0].clone(), tiles[3].clone()];

        let mosaic = assemble(&diagonal).unwrap();
        assert_eq!(mosaic.array()[[0, 0, 3]], 0);
        assert_eq!(mosaic.array()[[0, 3, 0]], 0);
        assert_eq!(mosaic.array()[[0, 3, 3]], original.array()[[0, 3, 3]]);
    }

    #[test]
    fn test_overlap_rule() {
        let base = image(2, 2);
        let other = base.derive(base.array().mapv(|v| v + 500), *base.transform());

        let first = assemble(&[base.clone(), other.clone()]).unwrap();
        assert_eq!(first.array(), base.array());

        let last = assemble_with(&[base.clone(), other.clone()], MergeMethod::Last).unwrap();
        assert_eq!(last.array(), other.array());
    }

    #[test]
    fn test_empty_input() {
        let tiles: Vec<SatelliteImage<u16>> = Vec::new();
        assert!(matches!(
            assemble(&tiles),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_crs_mismatch() {
        let a = image(2, 2);
        let b = SatelliteImage::new(a.array().clone(), "EPSG:4471", *a.transform());
        match assemble(&[a, b]) {
            Err(AstrotileError::CrsMismatch { expected, found }) => {
                assert_eq!(expected, Crs::new("EPSG:2975"));
                assert_eq!(found, Crs::new("EPSG:4471"));
            }
            other => panic!("expected CrsMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_band_count_mismatch() {
        let a = image(2, 2);
        let b = a.select_bands(&[0]).unwrap();
        assert!(matches!(
            assemble(&[a, b]),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolution_mismatch() {
        let a = image(2, 2);
        let b = SatelliteImage::new(
            a.array().clone(),
            "EPSG:2975",
            AffineTransform::from_origin(338_000.0, 7_690_000.0, 1.0, 1.0),
        );
        assert!(matches!(
            assemble(&[a, b]),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_misaligned_origin() {
        let a = image(2, 2);
        let b = SatelliteImage::new(
            a.array().clone(),
            "EPSG:2975",
            AffineTransform::from_origin(338_000.25, 7_690_000.0, 0.5, 0.5),
        );
        assert!(matches!(
            assemble(&[a, b]),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_distant_origin_is_rejected() {
        let a = image(2, 2);
        let far = SatelliteImage::new(
            a.array().clone(),
            "EPSG:2975",
            AffineTransform::from_origin(-1e300, 1e300, 0.5, 0.5),
        );
        assert!(matches!(
            assemble(&[far.clone(), a.clone()]),
            Err(AstrotileError::InvalidArgument(_))
        ));
        assert!(matches!(
            assemble(&[a, far]),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_canvas_offset_overflow_is_rejected() {
        // Offsets of +2^62 and -2^62 pixels each fit an i64, their span does not.
        let at = |x: f64| {
            SatelliteImage::new(
                Array3::<u8>::zeros((1, 1, 1)),
                "EPSG:2975",
                AffineTransform::from_origin(x, 0.0, 1.0, 1.0),
            )
        };
        let span = 2f64.powi(62);
        let tiles = vec![at(0.0), at(span), at(-span)];
        assert!(matches!(
            MosaicLayout::for_tiles(&tiles),
            Err(AstrotileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_oversized_canvas_is_rejected() {
        assert!(check_canvas_size::<u8>(1, usize::MAX / 2, 4).is_err());
        assert!(check_canvas_size::<u16>(3, 2000, 2000).is_ok());
        assert!(filled_array((usize::MAX, 2, 1), 0u8).is_err());
    }

    #[test]
    fn test_layout_borrows_labeled_images() {
        let original = image(4, 4);
        let labeled = SegmentationLabeledImage::new(
            original.clone(),
            SegmentationMask::ClassIds(Array2::zeros((4, 4))),
        )
        .unwrap();
        let tiles = labeled.split(2).unwrap();

        let layout = MosaicLayout::for_images(tiles.iter().map(|t| t.image())).unwrap();
        assert_eq!((layout.height, layout.width), (4, 4));
        assert_eq!(layout.offsets, vec![(0, 0), (0, 2), (2, 0), (2, 2)]);
        assert_eq!(layout.transform, *original.transform());
    }

    #[test]
    fn test_labeled_roundtrip() {
        let original = image(4, 6);
        let mut mask = Array2::<u32>::zeros((4, 6));
        mask[[3, 5]] = 1;
        mask[[0, 2]] = 1;
        let labeled =
            SegmentationLabeledImage::new(original.clone(), SegmentationMask::ClassIds(mask.clone()))
                .unwrap();

        let tiles = labeled.split(2).unwrap();
        let mosaic = assemble_labeled(&tiles).unwrap();
        assert_eq!(mosaic.image(), &original);
        assert_eq!(mosaic.mask(), &SegmentationMask::ClassIds(mask));
    }

    #[test]
    fn test_labeled_mixed_masks() {
        let original = image(2, 2);
        let ids = SegmentationLabeledImage::new(
            original.clone(),
            SegmentationMask::ClassIds(Array2::zeros((2, 2))),
        )
        .unwrap();
        let logits =
            SegmentationLabeledImage::new(original, SegmentationMask::Logits(Array2::zeros((2, 2))))
                .unwrap();

        assert!(matches!(
            assemble_labeled(&[ids, logits]),
            Err(AstrotileError::InvalidLabel(_))
        ));
    }
}
