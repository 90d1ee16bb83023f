//! Status enums for catalog entries and orders.
//!
//! All of them are stored as text, so each one has a stable `as_str` name and
//! a matching `FromStr`.

use serde::{Deserialize, Serialize};

/// Catalog category.
///
/// Serial items are tracked by serial number and always listed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Serial,
    NonSerial,
}

impl Category {
    /// Both categories, in display order.
    pub const ALL: [Self; 2] = [Self::Serial, Self::NonSerial];

    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::NonSerial => "non_serial",
        }
    }

    /// Rank used when sorting for display (serial first).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Serial => 0,
            Self::NonSerial => 1,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Self::Serial),
            "non_serial" => Ok(Self::NonSerial),
            _ => Err(format!("invalid category: {s}")),
        }
    }
}

/// Whether technicians can currently order a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Available,
    Unavailable,
}

impl Availability {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            _ => Err(format!("invalid availability: {s}")),
        }
    }
}

/// Order lifecycle status.
///
/// Only these two are ever persisted: a cancelled order is deleted, not
/// marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
}

impl OrderStatus {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
