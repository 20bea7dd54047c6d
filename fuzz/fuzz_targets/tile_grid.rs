//! Fuzz target for tile border generation.
//!
//! Every accepted (height, width, tile_length) triple must yield tiles of
//! exactly tile_length pixels that stay inside the image.

#![no_main]

use astrotile::tiling::generate_tile_borders;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (u16, u16, u16)| {
    let (height, width, tile_length) = (data.0 as usize, data.1 as usize, data.2 as usize);
    // Keep the tile count bounded.
    if tile_length < height / 64 || tile_length < width / 64 {
        return;
    }

    if let Ok(borders) = generate_tile_borders(height, width, tile_length) {
        for b in borders {
            assert_eq!(b.height(), tile_length);
            assert_eq!(b.width(), tile_length);
            assert!(b.row_max <= height && b.col_max <= width);
        }
    }
});
