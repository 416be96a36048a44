//! Age context value type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ValidationError};

/// Youngest supported age, in years.
pub const MIN_AGE: u8 = 1;
/// Oldest supported age, in years.
pub const MAX_AGE: u8 = 19;

/// The demographic age (1–19 years) that bot answers are generated for.
///
/// Construction always validates the range, so holding an `AgeContext`
/// means the value is usable as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AgeContext(u8);

impl AgeContext {
    pub fn new(years: u8) -> Result<Self> {
        if (MIN_AGE..=MAX_AGE).contains(&years) {
            Ok(Self(years))
        } else {
            Err(ValidationError::InvalidAge(years).into())
        }
    }

    pub fn years(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for AgeContext {
    type Error = ValidationError;

    fn try_from(years: u8) -> std::result::Result<Self, Self::Error> {
        if (MIN_AGE..=MAX_AGE).contains(&years) {
            Ok(Self(years))
        } else {
            Err(ValidationError::InvalidAge(years))
        }
    }
}

impl From<AgeContext> for u8 {
    fn from(age: AgeContext) -> Self {
        age.0
    }
}

impl fmt::Display for AgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
