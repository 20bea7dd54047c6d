//! Tile manifests: one CSV row per tile with its pixel borders and CRS
//! bounds.
//!
//! A manifest lets downstream tooling locate every tile of a split on the
//! ground without opening the tiles themselves. Rows follow the tile order
//! of [`generate_tile_borders`](super::generate_tile_borders), and the
//! `index` column is the tile's position in that order.
//!
//! # Columns
//!
//! `index,row_min,row_max,col_min,col_max,left,bottom,right,top`

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::TileBorders;
use crate::error::AstrotileError;
use crate::raster::{bounds_for_tile, AffineTransform};

/// A single manifest row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub index: usize,
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Builds manifest rows for `borders` on the grid described by `transform`.
pub fn tile_records(transform: &AffineTransform, borders: &[TileBorders]) -> Vec<TileRecord> {
    borders
        .iter()
        .enumerate()
        .map(|(index, b)| {
            let bounds = bounds_for_tile(transform, b.rows(), b.cols());
            TileRecord {
                index,
                row_min: b.row_min,
                row_max: b.row_max,
                col_min: b.col_min,
                col_max: b.col_max,
                left: bounds.left,
                bottom: bounds.bottom,
                right: bounds.right,
                top: bounds.top,
            }
        })
        .collect()
}

/// Writes a tile manifest to a CSV file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_tile_manifest_csv(path: &Path, records: &[TileRecord]) -> Result<(), AstrotileError> {
    let file = File::create(path).map_err(AstrotileError::Io)?;
    let writer = BufWriter::new(file);

    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer
            .serialize(record)
            .map_err(|source| AstrotileError::ManifestCsvWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }

    csv_writer
        .into_inner()
        .map_err(|e| AstrotileError::Io(e.into_error()))?
        .flush()
        .map_err(AstrotileError::Io)?;

    Ok(())
}

/// Writes a tile manifest to a CSV string.
///
/// Useful for testing without file I/O.
pub fn to_tile_manifest_csv_string(records: &[TileRecord]) -> Result<String, AstrotileError> {
    let dummy_path = Path::new("<string>");

    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        csv_writer
            .serialize(record)
            .map_err(|source| AstrotileError::ManifestCsvWrite {
                path: dummy_path.to_path_buf(),
                source,
            })?;
    }

    let bytes = csv_writer
        .into_inner()
        .map_err(|e| AstrotileError::Io(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| {
        AstrotileError::InvalidArgument(format!("Invalid UTF-8 in manifest output: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiling::generate_tile_borders;

    #[test]
    fn test_records_follow_tile_order() {
        let transform = AffineTransform::from_origin(100.0, 200.0, 1.0, 1.0);
        let borders = generate_tile_borders(4, 3, 2).unwrap();
        let records = tile_records(&transform, &borders);

        assert_eq!(records.len(), 4);
        assert_eq!(records[1].index, 1);
        assert_eq!((records[1].col_min, records[1].col_max), (1, 3));
        assert_eq!(
            (records[1].left, records[1].bottom, records[1].right, records[1].top),
            (101.0, 198.0, 103.0, 200.0)
        );
    }

    #[test]
    fn test_manifest_csv_layout() {
        let transform = AffineTransform::from_origin(0.0, 2.0, 1.0, 1.0);
        let borders = generate_tile_borders(2, 2, 1).unwrap();
        let csv = to_tile_manifest_csv_string(&tile_records(&transform, &borders))
            .expect("serialize manifest");

        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("index,row_min,row_max,col_min,col_max,left,bottom,right,top")
        );
        assert_eq!(lines.next(), Some("0,0,1,0,1,0.0,1.0,1.0,2.0"));
        assert_eq!(csv.lines().count(), 5);
    }

    #[test]
    fn test_manifest_file_roundtrip() {
        let transform = AffineTransform::from_origin(0.0, 10.0, 1.0, 1.0);
        let records = tile_records(&transform, &generate_tile_borders(10, 10, 4).unwrap());

        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("manifest.csv");
        write_tile_manifest_csv(&path, &records).expect("write manifest");

        let mut reader = csv::Reader::from_path(&path).expect("open manifest");
        let restored: Vec<TileRecord> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("parse manifest");
        assert_eq!(restored, records);
    }
}
