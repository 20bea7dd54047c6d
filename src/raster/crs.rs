//! Coordinate reference system identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque coordinate reference system identifier, such as `EPSG:2154`
/// or a WKT string.
///
/// Identifiers are compared verbatim: two images share a CRS only if their
/// identifiers are byte-for-byte equal. Reprojection between systems is
/// left to an external geodesy library.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    /// Creates a new CRS identifier.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs({})", self.0)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Crs {
    fn from(id: &str) -> Self {
        Crs::new(id)
    }
}

impl From<String> for Crs {
    fn from(id: String) -> Self {
        Crs(id)
    }
}
