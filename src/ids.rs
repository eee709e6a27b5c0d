//! Opaque identifiers shared across the decoder, session state, collector and
//! fan-out manager.
//!
//! Driver and circuit identifiers arrive from the upstream feed as strings and
//! are kept as strings throughout: the feed mixes numeric-looking and
//! alphanumeric ids, and coercing either to an integer would break on the
//! first circuit that assigns alphabetic kart numbers.

use std::convert::TryFrom;
use std::fmt;

/// A racetrack identifier, normalised by trimming whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CircuitId(String);

impl CircuitId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        CircuitId(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: AsRef<str>> From<T> for CircuitId {
    fn from(raw: T) -> Self {
        CircuitId::new(raw)
    }
}

/// An opaque per-driver identifier. Never parsed as an integer: see
/// `DESIGN.md` for why that matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(raw: impl Into<String>) -> Self {
        DriverId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated `Cn` column slot, `1 <= n <= 14`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ColumnIndex(u8);

impl ColumnIndex {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 14;

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("column index {0} out of range [1, 14]")]
pub struct ColumnIndexOutOfRange(pub u32);

impl TryFrom<u32> for ColumnIndex {
    type Error = ColumnIndexOutOfRange;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (Self::MIN as u32..=Self::MAX as u32).contains(&value) {
            Ok(ColumnIndex(value as u8))
        } else {
            Err(ColumnIndexOutOfRange(value))
        }
    }
}

impl fmt::Display for ColumnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}
