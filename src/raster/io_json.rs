//! JSON scene documents.
//!
//! A scene document is the on-disk form of one image, optionally with its
//! label. Decoding real raster formats (JPEG2000, GeoTIFF) happens outside
//! this crate; producers hand scenes over in this format and consumers read
//! tiles and mosaics back from it.
//!
//! The document is deliberately permissive: it can hold a label that
//! breaks the labeled-image invariants (a box outside the image, a float
//! mask without the logits flag, ...) so that
//! [`validate_scene`](crate::validation::validate_scene) can report every
//! problem at once. [`SceneDocument::into_image`] and
//! [`SceneDocument::into_labeled`] perform the strict conversion.
//!
//! # Layout
//!
//! ```json
//! {
//!   "crs": "EPSG:4471",
//!   "transform": { "a": 0.5, "b": 0.0, "c": 509000.0, "d": 0.0, "e": -0.5, "f": 8593000.0 },
//!   "region": "976",
//!   "array": { "v": 1, "dim": [3, 2000, 2000], "data": [ ... ] },
//!   "label": { "kind": "detection", "boxes": [[10, 10, 20, 20]] }
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::affine::AffineTransform;
use super::bounds::BoundingBox;
use super::crs::Crs;
use super::image::SatelliteImage;
use super::label::{
    ClassLabel, ClassificationLabeledImage, DetectionLabeledImage, ElementType, LabelMeta,
    LabeledImage, PixelBox, SegmentationLabeledImage, SegmentationMask,
};
use crate::error::AstrotileError;

/// Tolerance (CRS units) when comparing stored bounds with derived ones.
pub const BOUNDS_TOLERANCE: f64 = 1e-6;

/// One image (and optional label) as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub crs: Crs,

    pub transform: AffineTransform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Informational; checked against the bounds derived from `transform`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,

    /// Pixels as (band, row, column).
    pub array: Array3<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelRecord>,

    #[serde(default, skip_serializing_if = "LabelMeta::is_empty")]
    pub label_meta: LabelMeta,
}

/// A label as stored on disk, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LabelRecord {
    Segmentation {
        element_type: ElementType,
        #[serde(default)]
        logits: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        n_classes: Option<u32>,
        data: Array2<f64>,
    },
    Detection {
        boxes: Vec<[i64; 4]>,
    },
    Classification {
        value: i64,
    },
}

impl SceneDocument {
    /// Captures an image (no label).
    pub fn from_image<T: Copy + Into<f64>>(image: &SatelliteImage<T>) -> Self {
        Self {
            crs: image.crs().clone(),
            transform: *image.transform(),
            region: image.region().map(str::to_string),
            date: image.date().map(str::to_string),
            bounds: Some(image.bounds()),
            array: image.array().mapv(|v| v.into()),
            label: None,
            label_meta: LabelMeta::default(),
        }
    }

    /// Captures a labeled image.
    pub fn from_labeled<T: Copy + Into<f64>>(labeled: &LabeledImage<T>) -> Self {
        let label = match labeled {
            LabeledImage::Segmentation(l) => LabelRecord::Segmentation {
                element_type: l.mask().element_type(),
                logits: l.mask().is_logits(),
                n_classes: None,
                data: l.mask().to_f64(),
            },
            LabeledImage::Detection(l) => LabelRecord::Detection {
                boxes: l
                    .boxes()
                    .iter()
                    .map(|b| [b.x0.into(), b.y0.into(), b.x1.into(), b.y1.into()])
                    .collect(),
            },
            LabeledImage::Classification(l) => LabelRecord::Classification {
                value: l.label().value().into(),
            },
        };

        Self {
            label: Some(label),
            label_meta: labeled.meta().clone(),
            ..Self::from_image(labeled.image())
        }
    }

    /// Builds the image, ignoring any label.
    ///
    /// # Errors
    /// Returns [`AstrotileError::InvalidArgument`] if stored bounds disagree
    /// with the bounds implied by the transform and array extent.
    pub fn into_image(self) -> Result<SatelliteImage<f64>, AstrotileError> {
        self.into_parts().map(|(image, _, _)| image)
    }

    /// Builds the labeled image.
    ///
    /// # Errors
    /// Fails if the document has no label, or with the error of the
    /// labeled-image constructor the label violates.
    pub fn into_labeled(self) -> Result<LabeledImage<f64>, AstrotileError> {
        let (image, label, meta) = self.into_parts()?;
        let label = label.ok_or_else(|| {
            AstrotileError::InvalidArgument("scene document has no label".to_string())
        })?;

        Ok(match label {
            LabelRecord::Segmentation {
                element_type,
                logits,
                n_classes,
                data,
            } => {
                let mask = SegmentationMask::from_values(data, element_type, logits)?;
                if let Some(n) = n_classes {
                    mask.check_class_count(n)?;
                }
                LabeledImage::Segmentation(SegmentationLabeledImage::new(image, mask)?.with_meta(meta))
            }
            LabelRecord::Detection { boxes } => {
                let boxes = boxes
                    .iter()
                    .map(|b| pixel_box(b))
                    .collect::<Result<Vec<_>, _>>()?;
                LabeledImage::Detection(DetectionLabeledImage::new(image, boxes)?.with_meta(meta))
            }
            LabelRecord::Classification { value } => LabeledImage::Classification(
                ClassificationLabeledImage::new(image, ClassLabel::new(value)?).with_meta(meta),
            ),
        })
    }

    fn into_parts(
        self,
    ) -> Result<(SatelliteImage<f64>, Option<LabelRecord>, LabelMeta), AstrotileError> {
        let mut image = SatelliteImage::new(self.array, self.crs, self.transform);
        if let Some(region) = self.region {
            image = image.with_region(region);
        }
        if let Some(date) = self.date {
            image = image.with_date(date);
        }

        if let Some(stored) = self.bounds {
            let derived = image.bounds();
            if !stored.approx_eq(&derived, BOUNDS_TOLERANCE) {
                return Err(AstrotileError::InvalidArgument(format!(
                    "stored bounds {:?} disagree with bounds {:?} derived from the transform",
                    stored, derived
                )));
            }
        }

        Ok((image, self.label, self.label_meta))
    }
}

fn pixel_box(raw: &[i64; 4]) -> Result<PixelBox, AstrotileError> {
    let coord = |v: i64| {
        u32::try_from(v).map_err(|_| {
            AstrotileError::InvalidArgument(format!(
                "bounding box {:?} is not contained in image",
                raw
            ))
        })
    };
    Ok(PixelBox::new(
        coord(raw[0])?,
        coord(raw[1])?,
        coord(raw[2])?,
        coord(raw[3])?,
    ))
}

/// Reads a scene document from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_scene_json(path: &Path) -> Result<SceneDocument, AstrotileError> {
    let file = File::open(path).map_err(AstrotileError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| AstrotileError::SceneJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a scene document to a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_scene_json(path: &Path, scene: &SceneDocument) -> Result<(), AstrotileError> {
    let file = File::create(path).map_err(AstrotileError::Io)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer(writer, scene).map_err(|source| AstrotileError::SceneJsonWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a scene document from a JSON string.
///
/// Useful for testing without file I/O.
pub fn from_json_str(json: &str) -> Result<SceneDocument, serde_json::Error> {
    serde_json::from_str(json)
}

/// Reads a scene document from JSON bytes.
///
/// Useful for fuzzing and processing raw bytes without requiring UTF-8 upfront.
pub fn from_json_slice(bytes: &[u8]) -> Result<SceneDocument, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Writes a scene document to a JSON string.
pub fn to_json_string(scene: &SceneDocument) -> Result<String, serde_json::Error> {
    serde_json::to_string(scene)
}
