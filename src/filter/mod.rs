//! Collection filters.
//!
//! Helpers to drop unusable scenes before tiling: cloudy acquisitions,
//! scenes dominated by no-data (black) pixels, and scenes outside an area
//! of interest. Every filter consumes the collection and returns the kept
//! images in their original order.

use ndarray::{Array2, Axis};

use crate::error::AstrotileError;
use crate::raster::{BoundingBox, Crs, SatelliteImage};

/// Default maximum cloud coverage for [`filter_cloudy`].
pub const DEFAULT_CLOUD_THRESHOLD: f64 = 0.5;

/// Luma weights applied to the first three bands (R, G, B).
const GRAY_WEIGHTS: [f64; 3] = [0.2989, 0.5870, 0.1140];

/// Fraction of a cloud mask's pixels that are flagged as cloud.
///
/// Mask values are summed, so a soft mask in `[0, 1]` yields the expected
/// coverage. An empty mask has zero coverage.
pub fn cloud_coverage(mask: &Array2<f64>) -> f64 {
    mask.mean().unwrap_or(0.0)
}

/// Keeps the images whose cloud coverage is strictly below `threshold`.
///
/// `masks[i]` is the cloud mask of `images[i]`.
///
/// # Errors
/// Returns [`AstrotileError::InvalidArgument`] if the two collections have
/// different lengths.
pub fn filter_cloudy<T>(
    images: Vec<SatelliteImage<T>>,
    masks: &[Array2<f64>],
    threshold: f64,
) -> Result<Vec<SatelliteImage<T>>, AstrotileError> {
    if images.len() != masks.len() {
        return Err(AstrotileError::InvalidArgument(format!(
            "got {} image(s) but {} cloud mask(s)",
            images.len(),
            masks.len()
        )));
    }

    let before = images.len();
    let kept: Vec<_> = images
        .into_iter()
        .zip(masks)
        .filter(|(_, mask)| cloud_coverage(mask) < threshold)
        .map(|(image, _)| image)
        .collect();
    log::debug!(
        "cloud filter kept {} of {} image(s) (threshold {})",
        kept.len(),
        before,
        threshold
    );
    Ok(kept)
}

/// Thresholds for [`is_corrupted`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorruptionOptions {
    /// Grayscale intensity below which a pixel counts as black.
    pub black_value_threshold: f64,
    /// Fraction of black pixels at which an image counts as corrupted.
    pub black_area_threshold: f64,
}

impl Default for CorruptionOptions {
    fn default() -> Self {
        Self {
            black_value_threshold: 25.0,
            black_area_threshold: 0.5,
        }
    }
}

/// Returns true if at least `black_area_threshold` of the image's pixels
/// are black once converted to grayscale.
///
/// # Errors
/// Returns [`AstrotileError::InvalidArgument`] if the image has fewer than
/// three bands.
pub fn is_corrupted<T: Copy + Into<f64>>(
    image: &SatelliteImage<T>,
    opts: &CorruptionOptions,
) -> Result<bool, AstrotileError> {
    if image.band_count() < 3 {
        return Err(AstrotileError::InvalidArgument(format!(
            "corruption check needs at least 3 bands, image has {}",
            image.band_count()
        )));
    }

    let pixels = image.height() * image.width();
    if pixels == 0 {
        return Ok(false);
    }

    let mut gray = Array2::<f64>::zeros((image.height(), image.width()));
    for (weight, band) in GRAY_WEIGHTS.iter().zip(image.array().axis_iter(Axis(0))) {
        gray.zip_mut_with(&band, |g, &v| {
            let v: f64 = v.into();
            *g += weight * v;
        });
    }

    let black = gray
        .iter()
        .filter(|&&g| g < opts.black_value_threshold)
        .count();
    Ok(black as f64 / pixels as f64 >= opts.black_area_threshold)
}

/// Keeps the images that are not corrupted.
pub fn filter_corrupted<T: Copy + Into<f64>>(
    images: Vec<SatelliteImage<T>>,
    opts: &CorruptionOptions,
) -> Result<Vec<SatelliteImage<T>>, AstrotileError> {
    let before = images.len();
    let mut kept = Vec::with_capacity(before);
    for image in images {
        if !is_corrupted(&image, opts)? {
            kept.push(image);
        }
    }
    log::debug!("corruption filter kept {} of {} image(s)", kept.len(), before);
    Ok(kept)
}

/// Keeps the images whose footprint intersects `bbox`.
///
/// # Errors
/// Returns [`AstrotileError::CrsMismatch`] if an image is not in `crs`.
pub fn filter_within_box<T>(
    images: Vec<SatelliteImage<T>>,
    bbox: &BoundingBox,
    crs: &Crs,
) -> Result<Vec<SatelliteImage<T>>, AstrotileError> {
    let mut kept = Vec::with_capacity(images.len());
    for image in images {
        if image.intersects_box(bbox, crs)? {
            kept.push(image);
        }
    }
    Ok(kept)
}
