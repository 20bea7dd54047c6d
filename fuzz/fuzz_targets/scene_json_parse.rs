//! Fuzz target for scene JSON parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the scene JSON parser,
//! then runs validation and strict conversion on whatever parses,
//! checking for panics, crashes, or hangs.

#![no_main]

use astrotile::raster::io_json::from_json_slice;
use astrotile::validation::validate_scene;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if let Ok(scene) = from_json_slice(data) {
        let report = validate_scene(&scene);
        let has_label = scene.label.is_some();
        let converted = scene.into_labeled();
        if report.is_ok() && has_label {
            assert!(converted.is_ok(), "validated scene failed to convert");
        }
    }
});
