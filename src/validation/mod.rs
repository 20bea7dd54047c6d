//! Scene and tile-set validation for astrotile.
//!
//! This module checks inputs before they are tiled or assembled:
//! - Raster integrity (non-empty arrays, finite and invertible transforms)
//! - Georeferencing consistency (stored bounds match the derived ones)
//! - Label validity (mask shape and element type, boxes within the image)
//! - Tile set coherence (shared CRS, resolution, band count and pixel grid)
//!
//! Validation never fails: every problem becomes an issue in the report.

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use ndarray::Array2;

use crate::error::AstrotileError;
use crate::mosaic::{filled_array, MosaicLayout, GRID_TOLERANCE, RESOLUTION_TOLERANCE};
use crate::raster::io_json::{LabelRecord, SceneDocument, BOUNDS_TOLERANCE};
use crate::raster::{bounds_for_tile, AffineTransform, ElementType, SatelliteImage};

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
}

impl ValidateOptions {
    /// Returns true if `report` should be treated as a failure.
    pub fn fails(&self, report: &ValidationReport) -> bool {
        report.error_count() > 0 || (self.strict && report.warning_count() > 0)
    }
}

/// Validates a scene document and returns a report of all issues found.
///
/// A scene whose report has no errors converts with
/// [`SceneDocument::into_labeled`] (or [`SceneDocument::into_image`] when
/// it has no label).
pub fn validate_scene(scene: &SceneDocument) -> ValidationReport {
    let mut report = ValidationReport::new();
    let (bands, height, width) = scene.array.dim();

    if bands == 0 || height == 0 || width == 0 {
        report.add(ValidationIssue::error(
            IssueCode::EmptyRaster,
            format!("Empty raster of shape ({}, {}, {})", bands, height, width),
            IssueContext::Scene,
        ));
    }

    if check_transform(&scene.transform, IssueContext::Scene, &mut report) {
        if let Some(stored) = &scene.bounds {
            let derived = bounds_for_tile(&scene.transform, (0, height), (0, width));
            if !stored.approx_eq(&derived, BOUNDS_TOLERANCE) {
                report.add(ValidationIssue::error(
                    IssueCode::BoundsMismatch,
                    format!(
                        "Stored bounds ({}, {}, {}, {}) differ from derived bounds ({}, {}, {}, {})",
                        stored.left,
                        stored.bottom,
                        stored.right,
                        stored.top,
                        derived.left,
                        derived.bottom,
                        derived.right,
                        derived.top
                    ),
                    IssueContext::Scene,
                ));
            }
        }
    }

    match &scene.label {
        Some(LabelRecord::Segmentation {
            element_type,
            logits,
            n_classes,
            data,
        }) => validate_mask(
            data,
            *element_type,
            *logits,
            *n_classes,
            (height, width),
            &mut report,
        ),
        Some(LabelRecord::Detection { boxes }) => validate_boxes(boxes, (height, width), &mut report),
        Some(LabelRecord::Classification { value }) => {
            if *value != 0 && *value != 1 {
                report.add(ValidationIssue::error(
                    IssueCode::InvalidClassValue,
                    format!("Classification value {} (must be 0 or 1)", value),
                    IssueContext::Label,
                ));
            }
        }
        None => {}
    }

    report
}

/// Checks finiteness and invertibility. Returns true if the transform is
/// usable for further geometric checks.
fn check_transform(
    transform: &AffineTransform,
    context: IssueContext,
    report: &mut ValidationReport,
) -> bool {
    if !transform.is_finite() {
        report.add(ValidationIssue::error(
            IssueCode::TransformNotFinite,
            format!("Non-finite transform {:?}", transform),
            context,
        ));
        return false;
    }
    if transform.is_singular() {
        report.add(ValidationIssue::error(
            IssueCode::SingularTransform,
            format!(
                "Singular transform (determinant {})",
                transform.determinant()
            ),
            context,
        ));
        return false;
    }
    true
}

fn validate_mask(
    data: &Array2<f64>,
    element_type: ElementType,
    logits: bool,
    n_classes: Option<u32>,
    (height, width): (usize, usize),
    report: &mut ValidationReport,
) {
    if data.dim() != (height, width) {
        report.add(ValidationIssue::error(
            IssueCode::LabelShapeMismatch,
            format!(
                "Mask shape {:?} differs from image shape {:?}",
                data.dim(),
                (height, width)
            ),
            IssueContext::Label,
        ));
    }

    match (element_type, logits) {
        (ElementType::Float, false) => report.add(ValidationIssue::error(
            IssueCode::InvalidLabelType,
            "Float mask without the logits flag",
            IssueContext::Label,
        )),
        (ElementType::Int, true) => report.add(ValidationIssue::error(
            IssueCode::InvalidLabelType,
            "Integer mask flagged as logits",
            IssueContext::Label,
        )),
        (ElementType::Float, true) => {}
        (ElementType::Int, false) => {
            let non_integral = data
                .iter()
                .filter(|v| !v.is_finite() || v.fract() != 0.0)
                .count();
            if non_integral > 0 {
                report.add(ValidationIssue::error(
                    IssueCode::InvalidLabelType,
                    format!("{} non-integral class id(s)", non_integral),
                    IssueContext::Label,
                ));
            }

            let limit = n_classes.map_or(u32::MAX as f64, |n| f64::from(n) - 1.0);
            let out_of_range = data
                .iter()
                .filter(|v| v.is_finite() && (**v < 0.0 || **v > limit))
                .count();
            if out_of_range > 0 {
                report.add(ValidationIssue::error(
                    IssueCode::ClassIdOutOfRange,
                    format!(
                        "{} class id(s) outside 0..={}",
                        out_of_range, limit
                    ),
                    IssueContext::Label,
                ));
            }
        }
    }
}

fn validate_boxes(boxes: &[[i64; 4]], (height, width): (usize, usize), report: &mut ValidationReport) {
    for (index, raw) in boxes.iter().enumerate() {
        let [x0, y0, x1, y1] = *raw;
        let context = IssueContext::Box { index };

        // Pixel indices: the largest column must be < width.
        let inside = raw.iter().all(|&v| v >= 0)
            && (x0.max(x1) as u64) < width as u64
            && (y0.max(y1) as u64) < height as u64;
        if !inside {
            report.add(ValidationIssue::error(
                IssueCode::BoxOutOfBounds,
                format!(
                    "Box ({}, {}, {}, {}) extends outside image bounds (0, 0, {}, {})",
                    x0, y0, x1, y1, width, height
                ),
                context.clone(),
            ));
        }

        if x0 > x1 || y0 > y1 {
            report.add(ValidationIssue::warning(
                IssueCode::UnorderedBox,
                format!(
                    "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                    x0, y0, x1, y1
                ),
                context.clone(),
            ));
        }

        if x0 == x1 || y0 == y1 {
            report.add(ValidationIssue::warning(
                IssueCode::ZeroAreaBox,
                format!("Zero-area box ({}, {}, {}, {})", x0, y0, x1, y1),
                context,
            ));
        }
    }
}

/// Validates that a set of tiles can be assembled into a mosaic.
///
/// Errors are reported per tile against the first tile. Overlaps and gaps
/// are only checked once every tile sits on a common grid, and are
/// reported as warnings: both are legal for [`crate::mosaic::assemble`].
pub fn validate_tile_set<T>(tiles: &[SatelliteImage<T>]) -> ValidationReport {
    let mut report = ValidationReport::new();
    let Some(first) = tiles.first() else {
        return report;
    };

    let mut grid_ok = true;
    for (index, tile) in tiles.iter().enumerate() {
        let context = IssueContext::Tile { index };

        if tile.band_count() == 0 || tile.height() == 0 || tile.width() == 0 {
            report.add(ValidationIssue::error(
                IssueCode::EmptyRaster,
                format!(
                    "Empty raster of shape {:?}",
                    (tile.band_count(), tile.height(), tile.width())
                ),
                context.clone(),
            ));
        }
        grid_ok &= check_transform(tile.transform(), context.clone(), &mut report);

        if index == 0 {
            continue;
        }
        if tile.crs() != first.crs() {
            grid_ok = false;
            report.add(ValidationIssue::error(
                IssueCode::MixedCrs,
                format!("CRS {} differs from {}", tile.crs(), first.crs()),
                context.clone(),
            ));
        }
        if tile.band_count() != first.band_count() {
            grid_ok = false;
            report.add(ValidationIssue::error(
                IssueCode::MixedBandCount,
                format!(
                    "{} band(s), expected {}",
                    tile.band_count(),
                    first.band_count()
                ),
                context.clone(),
            ));
        }
        if !tile
            .transform()
            .same_resolution(first.transform(), RESOLUTION_TOLERANCE)
        {
            grid_ok = false;
            report.add(ValidationIssue::error(
                IssueCode::MixedResolution,
                format!(
                    "Transform {:?} does not share the resolution of {:?}",
                    tile.transform(),
                    first.transform()
                ),
                context,
            ));
        }
    }

    if !grid_ok {
        return report;
    }

    // The first transform passed check_transform, so it is invertible.
    if let Ok(inverse) = first.transform().inverse() {
        for (index, tile) in tiles.iter().enumerate() {
            let (col, row) = inverse.apply(tile.transform().c, tile.transform().f);
            let off_grid = |v: f64| (v - v.round()).abs() > GRID_TOLERANCE;
            if off_grid(col) || off_grid(row) {
                grid_ok = false;
                report.add(ValidationIssue::error(
                    IssueCode::MisalignedGrid,
                    format!(
                        "Origin falls at pixel ({:.6}, {:.6}) of the first tile's grid",
                        col, row
                    ),
                    IssueContext::Tile { index },
                ));
            }
        }
    }

    if grid_ok {
        let coverage = MosaicLayout::for_tiles(tiles)
            .and_then(|layout| check_coverage(tiles, &layout, &mut report));
        if let Err(err) = coverage {
            report.add(ValidationIssue::error(
                IssueCode::CanvasTooLarge,
                err.to_string(),
                IssueContext::TileSet,
            ));
        }
    }

    report
}

fn check_coverage<T>(
    tiles: &[SatelliteImage<T>],
    layout: &MosaicLayout,
    report: &mut ValidationReport,
) -> Result<(), AstrotileError> {
    let mut hits = filled_array((1, layout.height, layout.width), 0u32)?;
    for (tile, &(row, col)) in tiles.iter().zip(&layout.offsets) {
        hits.slice_mut(ndarray::s![0, row..row + tile.height(), col..col + tile.width()])
            .mapv_inplace(|h| h + 1);
    }

    let overlapping = hits.iter().filter(|&&h| h > 1).count();
    let uncovered = hits.iter().filter(|&&h| h == 0).count();

    if overlapping > 0 {
        report.add(ValidationIssue::warning(
            IssueCode::OverlappingTiles,
            format!(
                "{} pixel(s) are covered by more than one tile",
                overlapping
            ),
            IssueContext::TileSet,
        ));
    }
    if uncovered > 0 {
        report.add(ValidationIssue::warning(
            IssueCode::CoverageGap,
            format!(
                "{} of {} pixel(s) are covered by no tile",
                uncovered,
                layout.height * layout.width
            ),
            IssueContext::TileSet,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn valid_scene() -> SceneDocument {
        let image = SatelliteImage::new(
            Array3::<u8>::from_elem((3, 8, 8), 100),
            "EPSG:4471",
            AffineTransform::from_origin(509_000.0, 8_593_000.0, 0.5, 0.5),
        );
        let mut scene = SceneDocument::from_image(&image);
        scene.label = Some(LabelRecord::Detection {
            boxes: vec![[1, 1, 4, 4]],
        });
        scene
    }

    fn tiles() -> Vec<SatelliteImage<u8>> {
        let scene = valid_scene();
        let image = SatelliteImage::new(
            scene.array.mapv(|v| v as u8),
            scene.crs,
            scene.transform,
        );
        image.split(4).unwrap()
    }

    #[test]
    fn test_valid_scene() {
        let scene = valid_scene();
        let report = validate_scene(&scene);
        assert!(
            report.is_clean(),
            "Expected no issues, got: {:?}",
            report.issues
        );
        assert!(scene.into_labeled().is_ok());
    }

    #[test]
    fn test_empty_raster() {
        let mut scene = valid_scene();
        scene.array = Array3::zeros((3, 0, 8));
        scene.bounds = None;
        scene.label = None;

        let report = validate_scene(&scene);
        assert_eq!(report.error_count(), 1);
        assert!(report.has(IssueCode::EmptyRaster));
    }

    #[test]
    fn test_transform_checks() {
        let mut scene = valid_scene();
        scene.transform = AffineTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(validate_scene(&scene).has(IssueCode::SingularTransform));

        scene.transform = AffineTransform::new(f64::NAN, 0.0, 1.0, 0.0, -1.0, 1.0);
        let report = validate_scene(&scene);
        assert!(report.has(IssueCode::TransformNotFinite));
        assert!(!report.has(IssueCode::BoundsMismatch));
    }

    #[test]
    fn test_bounds_mismatch() {
        let mut scene = valid_scene();
        if let Some(bounds) = scene.bounds.as_mut() {
            bounds.right += 1.0;
        }
        assert!(validate_scene(&scene).has(IssueCode::BoundsMismatch));
    }

    #[test]
    fn test_box_checks() {
        let mut scene = valid_scene();
        scene.label = Some(LabelRecord::Detection {
            boxes: vec![[5, 7, 8, 2], [-1, 0, 2, 2], [3, 3, 3, 5]],
        });

        let report = validate_scene(&scene);
        assert_eq!(report.error_count(), 2);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::BoxOutOfBounds && i.context == IssueContext::Box { index: 0 }));
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::BoxOutOfBounds && i.context == IssueContext::Box { index: 1 }));
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::UnorderedBox && i.context == IssueContext::Box { index: 0 }));
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::ZeroAreaBox && i.context == IssueContext::Box { index: 2 }));
    }

    #[test]
    fn test_mask_checks() {
        let mut scene = valid_scene();
        let mut data = Array2::<f64>::zeros((8, 8));
        data[[0, 0]] = 0.5;
        data[[0, 1]] = 7.0;
        data[[0, 2]] = -1.0;
        scene.label = Some(LabelRecord::Segmentation {
            element_type: ElementType::Int,
            logits: false,
            n_classes: Some(2),
            data,
        });

        let report = validate_scene(&scene);
        assert!(report.has(IssueCode::InvalidLabelType));
        assert!(report.has(IssueCode::ClassIdOutOfRange));
        assert!(!report.has(IssueCode::LabelShapeMismatch));
    }

    #[test]
    fn test_mask_type_and_shape() {
        let mut scene = valid_scene();
        scene.label = Some(LabelRecord::Segmentation {
            element_type: ElementType::Float,
            logits: false,
            n_classes: None,
            data: Array2::zeros((4, 8)),
        });

        let report = validate_scene(&scene);
        assert_eq!(report.error_count(), 2);
        assert!(report.has(IssueCode::LabelShapeMismatch));
        assert!(report.has(IssueCode::InvalidLabelType));
    }

    #[test]
    fn test_classification_value() {
        let mut scene = valid_scene();
        scene.label = Some(LabelRecord::Classification { value: 2 });
        assert!(validate_scene(&scene).has(IssueCode::InvalidClassValue));

        scene.label = Some(LabelRecord::Classification { value: 1 });
        assert!(validate_scene(&scene).is_clean());
    }

    #[test]
    fn test_valid_tile_set() {
        let report = validate_tile_set(&tiles());
        assert!(report.is_clean(), "got: {:?}", report.issues);
    }

    #[test]
    fn test_empty_tile_set() {
        let tiles: Vec<SatelliteImage<u8>> = Vec::new();
        assert!(validate_tile_set(&tiles).is_clean());
    }

    #[test]
    fn test_tile_set_gap_and_overlap() {
        let all = tiles();
        let gap = vec![all[0].clone(), all[3].clone()];
        let report = validate_tile_set(&gap);
        assert!(report.is_ok());
        assert!(report.has(IssueCode::CoverageGap));

        let overlap = vec![all[0].clone(), all[0].clone()];
        assert!(validate_tile_set(&overlap).has(IssueCode::OverlappingTiles));
    }

    #[test]
    fn test_tile_set_mixed() {
        let mut set = tiles();
        set[1] = SatelliteImage::new(set[1].array().clone(), "EPSG:2975", *set[1].transform());
        set[2] = set[2].select_bands(&[0]).unwrap();
        set[3] = SatelliteImage::new(
            set[3].array().clone(),
            "EPSG:4471",
            AffineTransform::from_origin(509_000.0, 8_593_000.0, 1.0, 1.0),
        );

        let report = validate_tile_set(&set);
        assert!(report.has(IssueCode::MixedCrs));
        assert!(report.has(IssueCode::MixedBandCount));
        assert!(report.has(IssueCode::MixedResolution));
        assert!(!report.has(IssueCode::CoverageGap));
    }

    #[test]
    fn test_tile_set_misaligned() {
        let mut set = tiles();
        set[1] = SatelliteImage::new(
            set[1].array().clone(),
            "EPSG:4471",
            AffineTransform::from_origin(509_002.1, 8_593_000.0, 0.5, 0.5),
        );

        let report = validate_tile_set(&set);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::MisalignedGrid && i.context == IssueContext::Tile { index: 1 }));
    }

    #[test]
    fn test_tile_set_too_far_apart() {
        let mut set = tiles();
        set[1] = SatelliteImage::new(
            set[1].array().clone(),
            "EPSG:4471",
            AffineTransform::from_origin(-1e300, 1e300, 0.5, 0.5),
        );

        let report = validate_tile_set(&set);
        assert!(report.has(IssueCode::CanvasTooLarge));
        assert!(!report.is_ok());
        assert!(!report.has(IssueCode::CoverageGap));
    }

    #[test]
    fn test_strict_option() {
        let mut report = ValidationReport::new();
        report.add(ValidationIssue::warning(
            IssueCode::ZeroAreaBox,
            "zero",
            IssueContext::Box { index: 0 },
        ));
        assert!(!ValidateOptions::default().fails(&report));
        assert!(ValidateOptions { strict: true }.fails(&report));
    }
}
