#![allow(dead_code)]

use std::fs;
use std::path::Path;

use astrotile::raster::io_json::{write_scene_json, LabelRecord, SceneDocument};
use astrotile::raster::{AffineTransform, ElementType, SatelliteImage};
use ndarray::{Array2, Array3};

pub const CRS: &str = "EPSG:4471";

/// Mayotte-like origin with 0.5 m pixels.
pub fn transform() -> AffineTransform {
    AffineTransform::from_origin(509_000.0, 8_593_000.0, 0.5, 0.5)
}

/// A scene whose pixel values encode (band, row, col).
pub fn image(bands: usize, height: usize, width: usize) -> SatelliteImage<u16> {
    let array = Array3::from_shape_fn((bands, height, width), |(b, r, c)| {
        (b * 10_000 + r * 100 + c) as u16
    });
    SatelliteImage::new(array, CRS, transform())
        .with_region("976")
        .with_date("2022-06-01")
}

/// A class-id mask with a filled square of ones.
pub fn square_mask(
    height: usize,
    width: usize,
    top: usize,
    left: usize,
    side: usize,
) -> Array2<u32> {
    let mut mask = Array2::zeros((height, width));
    for r in top..(top + side).min(height) {
        for c in left..(left + side).min(width) {
            mask[[r, c]] = 1;
        }
    }
    mask
}

/// An unlabeled scene document.
pub fn scene(bands: usize, height: usize, width: usize) -> SceneDocument {
    SceneDocument::from_image(&image(bands, height, width))
}

/// A scene document with a segmentation label.
pub fn segmentation_scene(height: usize, width: usize, mask: &Array2<u32>) -> SceneDocument {
    let mut document = scene(3, height, width);
    document.label = Some(LabelRecord::Segmentation {
        element_type: ElementType::Int,
        logits: false,
        n_classes: Some(2),
        data: mask.mapv(f64::from),
    });
    document
}

/// A scene document with detection boxes.
pub fn detection_scene(height: usize, width: usize, boxes: Vec<[i64; 4]>) -> SceneDocument {
    let mut document = scene(3, height, width);
    document.label = Some(LabelRecord::Detection { boxes });
    document
}

pub fn write_scene(path: &Path, scene: &SceneDocument) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    write_scene_json(path, scene).expect("write scene json");
}
