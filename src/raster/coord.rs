//! Positions tagged with the space they live in.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::AstrotileError;

/// A 2D position in either pixel space ([`Pixel`](super::Pixel):
/// column, row) or CRS space ([`World`](super::World): x, y).
///
/// The marker keeps [`AffineTransform::to_world`](super::AffineTransform::to_world)
/// and [`to_pixel`](super::AffineTransform::to_pixel) from being fed the
/// wrong kind of position.
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

impl<TSpace> fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Parses `"x,y"`, the form the CLI takes points in.
impl<TSpace> FromStr for Coord<TSpace> {
    type Err = AstrotileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AstrotileError::InvalidArgument(format!("expected 'x,y', got '{}'", s));
        let (x, y) = s.split_once(',').ok_or_else(invalid)?;
        let x: f64 = x.trim().parse().map_err(|_| invalid())?;
        let y: f64 = y.trim().parse().map_err(|_| invalid())?;
        if !x.is_finite() || !y.is_finite() {
            return Err(invalid());
        }
        Ok(Self::new(x, y))
    }
}
