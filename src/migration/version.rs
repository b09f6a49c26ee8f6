//! Fixed-point schema versions.
//!
//! Versions are written `NN.NN` (`"00.03"`) and compared as numbers, never
//! as strings: `"00.10"` is newer than `"00.09"`, and `"0.1"` is the same
//! version as `"00.10"`. Internally a version is a count of hundredths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A schema version with two decimal places.
///
/// # Example
/// ```
/// use entertainme::SchemaVersion;
///
/// let v: SchemaVersion = "00.03".parse().unwrap();
/// assert_eq!(v, SchemaVersion::from_hundredths(3));
/// assert_eq!(v.to_string(), "00.03");
/// assert!(v > "0.02".parse().unwrap());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// The version of a store nothing has been applied to.
    pub const ZERO: SchemaVersion = SchemaVersion(0);

    /// Creates a version from a count of hundredths (`3` is `00.03`).
    #[inline]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Returns the version as a count of hundredths.
    #[inline]
    pub const fn hundredths(&self) -> u32 {
        self.0
    }

    /// Parses a fixed-point version string.
    ///
    /// Accepts an integer part, optionally followed by `.` and at most two
    /// fractional digits. Missing fractional digits are zero-padded, so
    /// `"1.5"` is `01.50` and `"2"` is `02.00`.
    ///
    /// # Errors
    /// Returns `ValidationError` if the string is empty, has a sign,
    /// non-digit characters, more than two fractional digits, or overflows.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::required_field("version"));
        }

        let invalid = |reason: &str| {
            ValidationError::invalid_field("version", format!("'{}' {}", s, reason))
        };

        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("has no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid("must contain only digits and one '.'"));
        }
        if fraction.len() > 2 {
            return Err(invalid("has more than two decimal places"));
        }

        let whole: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("is out of range"))?
        };
        let fraction: u32 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u32>().map_err(|_| invalid("is out of range"))? * 10,
            _ => fraction.parse().map_err(|_| invalid("is out of range"))?,
        };

        whole
            .checked_mul(100)
            .and_then(|h| h.checked_add(fraction))
            .map(Self)
            .ok_or_else(|| invalid("is out of range"))
    }
}

impl FromStr for SchemaVersion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.0 / 100, self.0 % 100)
    }
}
