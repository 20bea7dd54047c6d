//! The georeferenced image value type.

use ndarray::{s, Array3, Axis};

use super::affine::{bounds_for_tile, transform_for_tile, AffineTransform};
use super::bounds::BoundingBox;
use super::coord::Coord;
use super::crs::Crs;
use super::space::World;
use crate::error::AstrotileError;
use crate::tiling::TileBorders;

/// A satellite image: a (band, row, column) array placed on the ground by
/// an affine transform in a given CRS.
///
/// Images are immutable values. Every operation returns a new image and
/// the fields are only reachable through accessors, so the array extent
/// and the transform can never be changed independently. The bounding box
/// is not stored at all: [`bounds`](Self::bounds) derives it from the
/// transform and the array extent on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct SatelliteImage<T> {
    array: Array3<T>,
    crs: Crs,
    transform: AffineTransform,
    region: Option<String>,
    date: Option<String>,
}

impl<T> SatelliteImage<T> {
    /// Creates a new image from an array laid out as (band, row, column).
    pub fn new(array: Array3<T>, crs: impl Into<Crs>, transform: AffineTransform) -> Self {
        Self {
            array,
            crs: crs.into(),
            transform,
            region: None,
            date: None,
        }
    }

    /// Sets the region tag (administrative area, scene id, ...).
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the acquisition date (ISO 8601 or similar).
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    #[inline]
    pub fn array(&self) -> &Array3<T> {
        &self.array
    }

    /// Consumes the image and returns its pixel array.
    pub fn into_array(self) -> Array3<T> {
        self.array
    }

    #[inline]
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    #[inline]
    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    #[inline]
    pub fn band_count(&self) -> usize {
        self.array.dim().0
    }

    /// Number of pixel rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.array.dim().1
    }

    /// Number of pixel columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.array.dim().2
    }

    /// The CRS rectangle covered by the full pixel extent.
    pub fn bounds(&self) -> BoundingBox {
        bounds_for_tile(&self.transform, (0, self.height()), (0, self.width()))
    }

    /// Returns true if the image footprint intersects `bbox`.
    ///
    /// # Errors
    /// Returns [`AstrotileError::CrsMismatch`] if `crs` differs from the
    /// image CRS; reprojecting the box is the caller's job.
    pub fn intersects_box(&self, bbox: &BoundingBox, crs: &Crs) -> Result<bool, AstrotileError> {
        self.check_crs(crs)?;
        Ok(self.bounds().intersects(bbox))
    }

    /// Returns true if the image footprint contains `point`.
    pub fn contains(&self, point: Coord<World>, crs: &Crs) -> Result<bool, AstrotileError> {
        self.check_crs(crs)?;
        Ok(self.bounds().contains(point))
    }

    /// Builds a new image that shares this image's CRS and metadata.
    pub(crate) fn derive<U>(&self, array: Array3<U>, transform: AffineTransform) -> SatelliteImage<U> {
        SatelliteImage {
            array,
            crs: self.crs.clone(),
            transform,
            region: self.region.clone(),
            date: self.date.clone(),
        }
    }

    fn check_crs(&self, crs: &Crs) -> Result<(), AstrotileError> {
        if crs != &self.crs {
            return Err(AstrotileError::CrsMismatch {
                expected: self.crs.clone(),
                found: crs.clone(),
            });
        }
        Ok(())
    }
}

impl<T: Clone> SatelliteImage<T> {
    /// Materializes the tile described by `borders` as an independent image.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidArgument`] if the borders are empty
    /// or reach outside the pixel grid.
    pub fn tile(&self, borders: &TileBorders) -> Result<SatelliteImage<T>, AstrotileError> {
        borders.check_within(self.height(), self.width())?;

        let array = self
            .array
            .slice(s![
                ..,
                borders.row_min..borders.row_max,
                borders.col_min..borders.col_max
            ])
            .to_owned();
        let transform = transform_for_tile(&self.transform, borders.row_min, borders.col_min);
        Ok(self.derive(array, transform))
    }

    /// Splits the image into square tiles of side `tile_length`.
    ///
    /// See [`crate::tiling::split_image`].
    pub fn split(&self, tile_length: usize) -> Result<Vec<SatelliteImage<T>>, AstrotileError> {
        crate::tiling::split_image(self, tile_length)
    }

    /// Returns a new image holding only the requested bands, in the
    /// requested order.
    pub fn select_bands(&self, indices: &[usize]) -> Result<SatelliteImage<T>, AstrotileError> {
        if indices.is_empty() {
            return Err(AstrotileError::InvalidArgument(
                "at least one band index is required".to_string(),
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i >= self.band_count()) {
            return Err(AstrotileError::InvalidArgument(format!(
                "band index {} out of range for an image with {} band(s)",
                bad,
                self.band_count()
            )));
        }

        Ok(self.derive(self.array.select(Axis(0), indices), self.transform))
    }
}

impl<T: Copy + Into<f64>> SatelliteImage<T> {
    /// Converts pixel values to `f64`, keeping geometry and metadata.
    pub fn to_f64(&self) -> SatelliteImage<f64> {
        self.derive(self.array.mapv(|v| v.into()), self.transform)
    }

    /// Min-max normalizes every band to `[0, 1]` after clipping it to
    /// `[0, q]`, where `q` is the band's `quantile`-th quantile.
    ///
    /// A band that is constant after clipping maps to all zeros.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidArgument`] unless
    /// `0.5 <= quantile <= 1`.
    pub fn normalize(&self, quantile: f64) -> Result<SatelliteImage<f64>, AstrotileError> {
        if !(0.5..=1.0).contains(&quantile) {
            return Err(AstrotileError::InvalidArgument(format!(
                "quantile must be between 0.5 and 1, got {}",
                quantile
            )));
        }

        let mut out = Array3::<f64>::zeros(self.array.raw_dim());
        for (band, mut target) in self
            .array
            .axis_iter(Axis(0))
            .zip(out.axis_iter_mut(Axis(0)))
        {
            let values: Vec<f64> = band.iter().map(|&v| v.into()).collect();
            let upper = quantile_linear(&values, quantile);
            let clipped: Vec<f64> = values.iter().map(|v| v.max(0.0).min(upper)).collect();

            let lo = clipped.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = clipped.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = hi - lo;

            for (dst, v) in target.iter_mut().zip(clipped) {
                *dst = if span > 0.0 { (v - lo) / span } else { 0.0 };
            }
        }

        Ok(self.derive(out, self.transform))
    }
}

/// Quantile with linear interpolation between closest ranks.
fn quantile_linear(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
