//! Explicit "no data" marker for sparse benchmark sweeps.
//!
//! Not every depth was benchmarked at every scale. Instead of failing, the loader reports the
//! absent cells as [`Measured::Missing`], and every later stage propagates the marker instead of
//! computing a number from incomplete inputs.
use std::fmt;

use serde::Serialize;

/// Identifies a cell of a sweep for which no benchmark data exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MissingData {
    /// The depth that was not benchmarked.
    pub depth: u32,
    /// The row of a size sweep, `None` for dataset sweeps.
    pub row: Option<usize>,
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "no data for depth {} in row {row}", self.depth),
            None => write!(f, "no data for depth {}", self.depth),
        }
    }
}

/// A value that is either present or explicitly missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Measured<T> {
    /// The value was measured (and, where applicable, validated).
    Present(T),
    /// The benchmark sweep has no data for this cell.
    Missing(MissingData),
}

impl<T> Measured<T> {
    /// Returns the present value, if any.
    pub fn present(&self) -> Option<&T> {
        match self {
            Measured::Present(value) => Some(value),
            Measured::Missing(_) => None,
        }
    }

    /// Converts into an `Option`, dropping the description of the missing cell.
    pub fn into_present(self) -> Option<T> {
        match self {
            Measured::Present(value) => Some(value),
            Measured::Missing(_) => None,
        }
    }

    /// Whether the cell has no data.
    pub fn is_missing(&self) -> bool {
        matches!(self, Measured::Missing(_))
    }

    /// Borrows the present value.
    pub fn as_ref(&self) -> Measured<&T> {
        match self {
            Measured::Present(value) => Measured::Present(value),
            Measured::Missing(missing) => Measured::Missing(*missing),
        }
    }

    /// Maps the present value, keeping the missing marker untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Measured<U> {
        match self {
            Measured::Present(value) => Measured::Present(f(value)),
            Measured::Missing(missing) => Measured::Missing(missing),
        }
    }

    /// Maps the present value with a fallible function.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Measured<U>, E> {
        match self {
            Measured::Present(value) => f(value).map(Measured::Present),
            Measured::Missing(missing) => Ok(Measured::Missing(missing)),
        }
    }

    /// Returns the present value or a [`crate::Error::MissingData`] for callers that cannot
    /// continue without it.
    pub fn require(self) -> Result<T, crate::Error> {
        match self {
            Measured::Present(value) => Ok(value),
            Measured::Missing(missing) => Err(crate::Error::MissingData(missing)),
        }
    }
}
