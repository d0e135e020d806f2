//! Inclusive byte ranges

use s3accel_common::{Error, Result};
use std::fmt;

/// An inclusive `[start, end]` byte interval
///
/// Ordering is by `(start, end)` ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Range {
    start: u64,
    end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl Range {
    /// Create a range covering `start..=end`
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::invalid_argument(format!(
                "range start {start} must not be greater than end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered. Never zero; saturates for the full `u64` span.
    #[must_use]
    pub const fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    #[must_use]
    pub const fn contains(&self, pos: u64) -> bool {
        self.start <= pos && pos <= self.end
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest range covering both `self` and `other`
    #[must_use]
    pub fn hull(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
