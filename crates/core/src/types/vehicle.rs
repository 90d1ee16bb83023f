//! Fleet vehicle identifiers.

use serde::{Deserialize, Deserializer, Serialize};

/// Errors from parsing a [`VehicleTag`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VehicleTagError {
    #[error("vehicle tag cannot be empty")]
    Empty,
    #[error("vehicle tag must be at most {max} characters")]
    TooLong { max: usize },
    #[error("vehicle tag may only contain letters and digits")]
    InvalidCharacter,
}

/// Short fleet identifier an order is placed for (`VP`, `XT`, ...).
///
/// Stored upper-case; parsing trims and upper-cases the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VehicleTag(String);

impl VehicleTag {
    pub const MAX_LENGTH: usize = 8;

    /// Parse a vehicle tag.
    ///
    /// # Errors
    ///
    /// Returns a [`VehicleTagError`] for empty, overlong or non-alphanumeric
    /// input.
    pub fn parse(s: &str) -> Result<Self, VehicleTagError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VehicleTagError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(VehicleTagError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VehicleTagError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VehicleTag {
    type Err = VehicleTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for VehicleTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
