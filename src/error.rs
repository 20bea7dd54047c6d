use std::path::PathBuf;
use thiserror::Error;

use crate::raster::Crs;
use crate::validation::ValidationReport;

/// The main error type for astrotile operations.
#[derive(Debug, Error)]
pub enum AstrotileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scene JSON from {path}: {source}")]
    SceneJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write scene JSON to {path}: {source}")]
    SceneJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write tile manifest to {path}: {source}")]
    ManifestCsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: Crs, found: Crs },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Logger initialization failed: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),
}
