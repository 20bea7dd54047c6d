#![allow(dead_code)]

use astrotile::raster::{AffineTransform, SatelliteImage};
use ndarray::Array3;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Relative tolerance for comparing georeferenced coordinates.
pub const EPS_GEO: f64 = 1e-9;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// `(height, width, tile_length)` with `1 <= tile_length <= min(height, width)`.
pub fn arb_grid(max_dim: usize) -> impl Strategy<Value = (usize, usize, usize)> {
    (1..=max_dim, 1..=max_dim).prop_flat_map(|(h, w)| (Just(h), Just(w), 1..=h.min(w)))
}

/// North-up transforms with integer origins and binary-fraction
/// resolutions, so every derived coordinate is exact.
pub fn arb_north_up() -> impl Strategy<Value = AffineTransform> {
    (
        -500_000i64..500_000,
        -500_000i64..9_000_000,
        prop::sample::select(vec![0.25, 0.5, 1.0, 2.0, 10.0]),
        prop::sample::select(vec![0.25, 0.5, 1.0, 2.0, 10.0]),
    )
        .prop_map(|(left, top, x_res, y_res)| {
            AffineTransform::from_origin(left as f64, top as f64, x_res, y_res)
        })
}

/// Slightly rotated transforms with fractional origins and resolutions
/// that have no exact binary representation (0.3 m, 0.7 m, ...).
pub fn arb_rotated() -> impl Strategy<Value = AffineTransform> {
    (
        prop::sample::select(vec![0.1, 0.3, 0.7, 1.5, 20.0]),
        -0.05f64..0.05,
        -1.0e6f64..1.0e6,
        -0.05f64..0.05,
        prop::sample::select(vec![0.1, 0.3, 0.7, 1.5, 20.0]),
        1.0e6f64..1.0e7,
    )
        .prop_map(|(x_res, b, c, d, y_res, f)| AffineTransform::new(x_res, b, c, d, -y_res, f))
}

/// General (possibly rotated or sheared) invertible transforms.
pub fn arb_affine() -> impl Strategy<Value = AffineTransform> {
    (
        0.1f64..30.0,
        -1.0f64..1.0,
        -1.0e6f64..1.0e6,
        -1.0f64..1.0,
        -30.0f64..-0.1,
        -1.0e7f64..1.0e7,
    )
        .prop_map(|(a, b, c, d, e, f)| AffineTransform::new(a, b, c, d, e, f))
        .prop_filter("invertible", |t| t.determinant().abs() > 1e-3)
}

/// An image on `transform` whose pixels encode their own position.
pub fn grid_image(
    bands: usize,
    height: usize,
    width: usize,
    transform: AffineTransform,
) -> SatelliteImage<u32> {
    let array = Array3::from_shape_fn((bands, height, width), |(b, r, c)| {
        (b * 1_000_000 + r * 1_000 + c) as u32
    });
    SatelliteImage::new(array, "EPSG:2975", transform)
}

/// Relative comparison, falling back to absolute near zero.
pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps * a.abs().max(b.abs()).max(1.0)
}
