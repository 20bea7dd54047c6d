//! Validation report types for structured error reporting.
//!
//! This module provides rich, structured validation results that can be
//! displayed to users, written to files, or processed programmatically.

use std::fmt;

use serde::Serialize;

/// The result of validating a scene or a tile set.
///
/// Contains all issues found during validation, categorized by severity.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    /// All issues found during validation.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Creates a new empty report.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Adds an issue to the report.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Returns the number of errors in the report.
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Returns the number of warnings in the report.
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns true if there are no issues at all (strict mode).
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if any issue carries `code`.
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single validation issue (error or warning).
#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    /// The severity of the issue.
    pub severity: Severity,

    /// A stable code for the issue type.
    pub code: IssueCode,

    /// A human-readable description of the issue.
    pub message: String,

    /// Context about where the issue occurred.
    pub context: IssueContext,
}

impl ValidationIssue {
    /// Creates a new validation issue.
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    /// Creates a new error.
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    /// Creates a new warning.
    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

/// The severity of a validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A warning that doesn't prevent tiling but may indicate problems.
    Warning,
    /// An error that indicates invalid or corrupt data.
    Error,
}

/// A stable code identifying the type of validation issue.
///
/// These codes can be used for filtering, ignoring specific issues,
/// or programmatic handling of validation results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCode {
    // Raster issues
    /// The pixel array has a zero-length axis.
    EmptyRaster,
    /// The affine transform has a NaN or infinite coefficient.
    TransformNotFinite,
    /// The affine transform cannot be inverted.
    SingularTransform,
    /// Stored bounds disagree with the bounds derived from the transform.
    BoundsMismatch,

    // Label issues
    /// A segmentation mask's rows and columns differ from the image's.
    LabelShapeMismatch,
    /// A mask's element type contradicts its logits flag, or a class id
    /// is not an integer.
    InvalidLabelType,
    /// A class id is negative or not below the declared class count.
    ClassIdOutOfRange,
    /// A detection box reaches outside the image.
    BoxOutOfBounds,
    /// A detection box has min > max on some axis.
    UnorderedBox,
    /// A detection box has zero width or height.
    ZeroAreaBox,
    /// A classification value other than 0 or 1.
    InvalidClassValue,

    // Tile set issues
    /// Tiles use different coordinate reference systems.
    MixedCrs,
    /// Tiles have different pixel sizes or rotations.
    MixedResolution,
    /// A tile origin does not fall on the reference pixel grid.
    MisalignedGrid,
    /// Tiles have different band counts.
    MixedBandCount,
    /// Some canvas pixels are covered by more than one tile.
    OverlappingTiles,
    /// Some canvas pixels are covered by no tile.
    CoverageGap,
    /// The tiles lie too far apart to be assembled on one canvas.
    CanvasTooLarge,
}

/// Context about where a validation issue occurred.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueContext {
    /// Issue with the scene raster or its georeferencing.
    Scene,
    /// Issue with the scene label as a whole.
    Label,
    /// Issue with a specific detection box.
    Box { index: usize },
    /// Issue with a specific tile.
    Tile { index: usize },
    /// Issue with the tile set as a whole.
    TileSet,
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Scene => write!(f, "scene"),
            IssueContext::Label => write!(f, "label"),
            IssueContext::Box { index } => write!(f, "box {}", index),
            IssueContext::Tile { index } => write!(f, "tile {}", index),
            IssueContext::TileSet => write!(f, "tile set"),
        }
    }
}
