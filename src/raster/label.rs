//! Labeled satellite images for segmentation, detection and
//! classification tasks.
//!
//! The three label kinds form the closed union [`LabeledImage`]. Every
//! kind wraps a [`SatelliteImage`] plus a payload validated at
//! construction, and all of them share the same two operations: splitting
//! into tiles and reducing to a binary classification label.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use super::image::SatelliteImage;
use crate::error::AstrotileError;
use crate::tiling::TileBorders;

/// Provenance of a label, carried unchanged through splitting and
/// aggregation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelMeta {
    /// Labeling source (e.g., a building registry or a topographic database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Date of the labeling data (ISO 8601 or similar).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeling_date: Option<String>,
}

impl LabelMeta {
    /// Returns true if no provenance is recorded.
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.labeling_date.is_none()
    }
}

/// Element type of a raw label array, as declared by its producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int,
    Float,
}

// ============================================================================
// Segmentation
// ============================================================================

fn is_class_id(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v)
}

/// A per-pixel segmentation label aligned with an image's rows and columns.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentationMask {
    /// Class ids in `0..n_classes`.
    ClassIds(Array2<u32>),
    /// Raw model scores.
    Logits(Array2<f32>),
}

impl SegmentationMask {
    /// Builds a mask from untyped values and the producer's declared
    /// element type.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidLabel`] if a float array is not
    /// flagged as logits, if an integer array is flagged as logits, or if
    /// an integer array holds values that are not non-negative integers.
    pub fn from_values(
        values: Array2<f64>,
        element_type: ElementType,
        logits: bool,
    ) -> Result<Self, AstrotileError> {
        match (element_type, logits) {
            (ElementType::Float, false) => Err(AstrotileError::InvalidLabel(
                "label array must contain integer values for class ids".to_string(),
            )),
            (ElementType::Int, true) => Err(AstrotileError::InvalidLabel(
                "label array must contain float values for logits".to_string(),
            )),
            (ElementType::Float, true) => Ok(Self::Logits(values.mapv(|v| v as f32))),
            (ElementType::Int, false) => {
                if let Some(bad) = values.iter().find(|&&v| !is_class_id(v)) {
                    return Err(AstrotileError::InvalidLabel(format!(
                        "class id {} is not a non-negative integer",
                        bad
                    )));
                }
                Ok(Self::ClassIds(values.mapv(|v| v as u32)))
            }
        }
    }

    /// Returns (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::ClassIds(a) => a.dim(),
            Self::Logits(a) => a.dim(),
        }
    }

    pub fn is_logits(&self) -> bool {
        matches!(self, Self::Logits(_))
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::ClassIds(_) => ElementType::Int,
            Self::Logits(_) => ElementType::Float,
        }
    }

    /// Every value widened to `f64`, in row-major order.
    pub fn to_f64(&self) -> Array2<f64> {
        match self {
            Self::ClassIds(a) => a.mapv(f64::from),
            Self::Logits(a) => a.mapv(f64::from),
        }
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        match self {
            Self::ClassIds(a) => a.iter().map(|&v| f64::from(v)).sum(),
            Self::Logits(a) => a.iter().map(|&v| f64::from(v)).sum(),
        }
    }

    /// Returns true if any value is strictly positive.
    pub fn any_positive(&self) -> bool {
        match self {
            Self::ClassIds(a) => a.iter().any(|&v| v > 0),
            Self::Logits(a) => a.iter().any(|&v| v > 0.0),
        }
    }

    /// Distinct values in ascending order with their pixel counts.
    pub fn value_counts(&self) -> Vec<(f64, usize)> {
        let mut values: Vec<f64> = self.to_f64().iter().copied().collect();
        values.sort_by(f64::total_cmp);

        let mut counts: Vec<(f64, usize)> = Vec::new();
        for v in values {
            match counts.last_mut() {
                Some((last, n)) if last.total_cmp(&v).is_eq() => *n += 1,
                _ => counts.push((v, 1)),
            }
        }
        counts
    }

    /// Checks that every class id is below `n_classes`. Logits always pass.
    pub fn check_class_count(&self, n_classes: u32) -> Result<(), AstrotileError> {
        if let Self::ClassIds(a) = self {
            if let Some(bad) = a.iter().find(|&&v| v >= n_classes) {
                return Err(AstrotileError::InvalidLabel(format!(
                    "class id {} out of range for {} class(es)",
                    bad, n_classes
                )));
            }
        }
        Ok(())
    }

    /// Slices the mask to `borders`.
    pub fn tile(&self, borders: &TileBorders) -> Result<Self, AstrotileError> {
        let (height, width) = self.dim();
        borders.check_within(height, width)?;

        let rows = borders.row_min..borders.row_max;
        let cols = borders.col_min..borders.col_max;
        Ok(match self {
            Self::ClassIds(a) => Self::ClassIds(a.slice(s![rows, cols]).to_owned()),
            Self::Logits(a) => Self::Logits(a.slice(s![rows, cols]).to_owned()),
        })
    }
}

/// An image with a per-pixel segmentation label.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationLabeledImage<T> {
    image: SatelliteImage<T>,
    mask: SegmentationMask,
    meta: LabelMeta,
}

impl<T> SegmentationLabeledImage<T> {
    /// Pairs an image with its mask.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidLabel`] if the mask's rows and
    /// columns differ from the image's.
    pub fn new(image: SatelliteImage<T>, mask: SegmentationMask) -> Result<Self, AstrotileError> {
        let expected = (image.height(), image.width());
        if mask.dim() != expected {
            return Err(AstrotileError::InvalidLabel(format!(
                "label shape {:?} does not match image shape {:?}",
                mask.dim(),
                expected
            )));
        }
        Ok(Self {
            image,
            mask,
            meta: LabelMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: LabelMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn image(&self) -> &SatelliteImage<T> {
        &self.image
    }

    pub fn mask(&self) -> &SegmentationMask {
        &self.mask
    }

    pub fn meta(&self) -> &LabelMeta {
        &self.meta
    }

    pub fn into_parts(self) -> (SatelliteImage<T>, SegmentationMask, LabelMeta) {
        (self.image, self.mask, self.meta)
    }
}

impl<T: Clone> SegmentationLabeledImage<T> {
    /// Materializes one labeled tile.
    pub fn tile(&self, borders: &TileBorders) -> Result<Self, AstrotileError> {
        Ok(Self {
            image: self.image.tile(borders)?,
            mask: self.mask.tile(borders)?,
            meta: self.meta.clone(),
        })
    }

    /// Splits into labeled tiles; see [`crate::tiling::split_segmentation`].
    pub fn split(&self, tile_length: usize) -> Result<Vec<Self>, AstrotileError> {
        crate::tiling::split_segmentation(self, tile_length)
    }

    /// Reduces the mask to a single binary label.
    pub fn to_classification(
        &self,
        policy: AggregationPolicy,
    ) -> Result<ClassificationLabeledImage<T>, AstrotileError> {
        let label = aggregate_mask(&self.mask, policy)?;
        Ok(ClassificationLabeledImage::new(self.image.clone(), label).with_meta(self.meta.clone()))
    }
}

// ============================================================================
// Detection
// ============================================================================

/// An axis-aligned box in pixel coordinates `(x0, y0, x1, y1)`.
///
/// `x` runs along columns and `y` along rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBox {
    #[inline]
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Returns true if `x0 <= x1` and `y0 <= y1`.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    /// Returns true if the box lies strictly inside a `width × height` grid.
    #[inline]
    pub fn fits(&self, width: usize, height: usize) -> bool {
        (self.x0.max(self.x1) as usize) < width && (self.y0.max(self.y1) as usize) < height
    }
}

impl From<(u32, u32, u32, u32)> for PixelBox {
    fn from((x0, y0, x1, y1): (u32, u32, u32, u32)) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

/// An image with an object-detection label: an ordered list of boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionLabeledImage<T> {
    image: SatelliteImage<T>,
    boxes: Vec<PixelBox>,
    meta: LabelMeta,
}

impl<T> DetectionLabeledImage<T> {
    /// Pairs an image with its boxes.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidArgument`] if any box coordinate
    /// reaches the image width (for x) or height (for y).
    pub fn new(image: SatelliteImage<T>, boxes: Vec<PixelBox>) -> Result<Self, AstrotileError> {
        let (width, height) = (image.width(), image.height());
        if let Some(bad) = boxes.iter().find(|b| !b.fits(width, height)) {
            return Err(AstrotileError::InvalidArgument(format!(
                "bounding box {:?} is not contained in a {}x{} image",
                bad, width, height
            )));
        }
        Ok(Self {
            image,
            boxes,
            meta: LabelMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: LabelMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn image(&self) -> &SatelliteImage<T> {
        &self.image
    }

    pub fn boxes(&self) -> &[PixelBox] {
        &self.boxes
    }

    pub fn meta(&self) -> &LabelMeta {
        &self.meta
    }

    /// Detection labels cannot be split yet: boxes crossing tile borders
    /// would need re-clipping.
    pub fn split(&self, _tile_length: usize) -> Result<Vec<Self>, AstrotileError> {
        Err(AstrotileError::UnsupportedOperation(
            "splitting detection-labeled images is not implemented".to_string(),
        ))
    }
}

impl<T: Clone> DetectionLabeledImage<T> {
    /// Label 1 if there is at least one box, 0 otherwise.
    pub fn to_classification(&self) -> ClassificationLabeledImage<T> {
        let label = if self.boxes.is_empty() {
            ClassLabel::NEGATIVE
        } else {
            ClassLabel::POSITIVE
        };
        ClassificationLabeledImage::new(self.image.clone(), label).with_meta(self.meta.clone())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// A binary image-level label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct ClassLabel(u8);

impl ClassLabel {
    pub const NEGATIVE: ClassLabel = ClassLabel(0);
    pub const POSITIVE: ClassLabel = ClassLabel(1);

    /// # Errors
    /// Returns [`AstrotileError::InvalidLabel`] unless `value` is 0 or 1.
    pub fn new(value: i64) -> Result<Self, AstrotileError> {
        match value {
            0 => Ok(Self::NEGATIVE),
            1 => Ok(Self::POSITIVE),
            other => Err(AstrotileError::InvalidLabel(format!(
                "classification label must be 0 or 1, not {}",
                other
            ))),
        }
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ClassLabel {
    type Error = AstrotileError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ClassLabel::new(value)
    }
}

impl From<ClassLabel> for u8 {
    fn from(label: ClassLabel) -> Self {
        label.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image with a single binary label.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationLabeledImage<T> {
    image: SatelliteImage<T>,
    label: ClassLabel,
    meta: LabelMeta,
}

impl<T> ClassificationLabeledImage<T> {
    pub fn new(image: SatelliteImage<T>, label: ClassLabel) -> Self {
        Self {
            image,
            label,
            meta: LabelMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: LabelMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn image(&self) -> &SatelliteImage<T> {
        &self.image
    }

    pub fn label(&self) -> ClassLabel {
        self.label
    }

    pub fn meta(&self) -> &LabelMeta {
        &self.meta
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// How a segmentation mask is reduced to one classification label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// 1 if any pixel is positive.
    #[default]
    Any,
    /// The most frequent value.
    Majority,
    /// The value with the largest share of pixels.
    Weighted,
}

impl FromStr for AggregationPolicy {
    type Err = AstrotileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "majority" => Ok(Self::Majority),
            "weighted" => Ok(Self::Weighted),
            other => Err(AstrotileError::InvalidArgument(format!(
                "invalid aggregation method '{}' (supported: any, majority, weighted)",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Majority => "majority",
            Self::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// Reduces a mask to a binary label.
///
/// For `Majority` and `Weighted`, ties between equally frequent values go
/// to the smallest value. The winning value must itself be 0 or 1.
pub fn aggregate_mask(
    mask: &SegmentationMask,
    policy: AggregationPolicy,
) -> Result<ClassLabel, AstrotileError> {
    let winner = match policy {
        AggregationPolicy::Any => {
            return Ok(if mask.any_positive() {
                ClassLabel::POSITIVE
            } else {
                ClassLabel::NEGATIVE
            });
        }
        AggregationPolicy::Majority => most_frequent(&mask.value_counts(), |count| count as f64),
        AggregationPolicy::Weighted => {
            let (rows, cols) = mask.dim();
            let total = (rows * cols) as f64;
            most_frequent(&mask.value_counts(), |count| count as f64 / total)
        }
    };

    let value = winner.ok_or_else(|| {
        AstrotileError::InvalidLabel("cannot aggregate an empty label".to_string())
    })?;

    if value == 0.0 {
        Ok(ClassLabel::NEGATIVE)
    } else if value == 1.0 {
        Ok(ClassLabel::POSITIVE)
    } else {
        Err(AstrotileError::InvalidLabel(format!(
            "aggregated value {} is not a binary class",
            value
        )))
    }
}

/// First value (in ascending order) with the strictly highest score.
fn most_frequent(counts: &[(f64, usize)], score: impl Fn(usize) -> f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &(value, count) in counts {
        let s = score(count);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((value, s)),
        }
    }
    best.map(|(value, _)| value)
}

// ============================================================================
// Union
// ============================================================================

/// Any labeled image.
#[derive(Clone, Debug, PartialEq)]
pub enum LabeledImage<T> {
    Segmentation(SegmentationLabeledImage<T>),
    Detection(DetectionLabeledImage<T>),
    Classification(ClassificationLabeledImage<T>),
}

impl<T> LabeledImage<T> {
    pub fn image(&self) -> &SatelliteImage<T> {
        match self {
            Self::Segmentation(l) => l.image(),
            Self::Detection(l) => l.image(),
            Self::Classification(l) => l.image(),
        }
    }

    pub fn meta(&self) -> &LabelMeta {
        match self {
            Self::Segmentation(l) => l.meta(),
            Self::Detection(l) => l.meta(),
            Self::Classification(l) => l.meta(),
        }
    }

    /// Short name of the label kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Segmentation(_) => "segmentation",
            Self::Detection(_) => "detection",
            Self::Classification(_) => "classification",
        }
    }

    /// Swaps in a new image (for example a normalized copy), keeping the
    /// label and its provenance.
    ///
    /// # Errors
    /// Fails like the variant's constructor if the label no longer fits
    /// the new image.
    pub fn with_image<U>(self, image: SatelliteImage<U>) -> Result<LabeledImage<U>, AstrotileError> {
        Ok(match self {
            Self::Segmentation(l) => LabeledImage::Segmentation(
                SegmentationLabeledImage::new(image, l.mask)?.with_meta(l.meta),
            ),
            Self::Detection(l) => LabeledImage::Detection(
                DetectionLabeledImage::new(image, l.boxes)?.with_meta(l.meta),
            ),
            Self::Classification(l) => LabeledImage::Classification(
                ClassificationLabeledImage::new(image, l.label).with_meta(l.meta),
            ),
        })
    }
}

impl<T: Clone> LabeledImage<T> {
    /// Splits into labeled tiles of side `tile_length`.
    ///
    /// # Errors
    /// Only segmentation labels can be split; detection and classification
    /// labels return [`AstrotileError::UnsupportedOperation`].
    pub fn split(&self, tile_length: usize) -> Result<Vec<LabeledImage<T>>, AstrotileError> {
        match self {
            Self::Segmentation(l) => Ok(l
                .split(tile_length)?
                .into_iter()
                .map(LabeledImage::Segmentation)
                .collect()),
            Self::Detection(l) => Ok(l
                .split(tile_length)?
                .into_iter()
                .map(LabeledImage::Detection)
                .collect()),
            Self::Classification(_) => Err(AstrotileError::UnsupportedOperation(
                "an image-level classification label cannot be split into tiles".to_string(),
            )),
        }
    }

    /// Reduces the label to a binary classification.
    ///
    /// `policy` only matters for segmentation labels.
    pub fn to_classification(
        &self,
        policy: AggregationPolicy,
    ) -> Result<ClassificationLabeledImage<T>, AstrotileError> {
        match self {
            Self::Segmentation(l) => l.to_classification(policy),
            Self::Detection(l) => Ok(l.to_classification()),
            Self::Classification(l) => Ok(l.clone()),
        }
    }
}
