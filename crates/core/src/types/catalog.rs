//! Catalog entries (the materials technicians can request).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Availability, Category, ProductId};

/// A material item in the catalog.
///
/// `display_order` ranks the entry inside its category; within a category the
/// ranks are unique and dense (`0..n`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: ProductId,
    pub image_ref: String,
    pub name: String,
    pub min_qty: i32,
    pub max_qty: i32,
    pub category: Category,
    pub availability: Availability,
    /// Older records may lack a rank; those sort as `0`.
    #[serde(default)]
    pub display_order: i32,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Whether a staged or committed quantity is acceptable for this entry.
    #[must_use]
    pub const fn accepts_quantity(&self, qty: i32) -> bool {
        qty >= 0 && qty <= self.max_qty
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// Input for creating a catalog entry.
///
/// The rank is not part of the input: new entries are appended to the end of
/// their category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCatalogEntry {
    pub image_ref: String,
    pub name: String,
    pub min_qty: i32,
    pub max_qty: i32,
    pub category: Category,
    #[serde(default)]
    pub availability: Availability,
}

/// Validation failures for catalog input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogInputError {
    #[error("name is required")]
    MissingName,
    #[error("image reference is required")]
    MissingImage,
    #[error("minimum quantity cannot be negative")]
    NegativeMinimum,
    #[error("maximum quantity must be at least 1")]
    MaximumTooSmall,
    #[error("minimum quantity ({min}) exceeds maximum ({max})")]
    MinAboveMax { min: i32, max: i32 },
}

fn check_bounds(name: &str, image_ref: &str, min: i32, max: i32) -> Result<(), CatalogInputError> {
    if name.trim().is_empty() {
        return Err(CatalogInputError::MissingName);
    }
    if image_ref.trim().is_empty() {
        return Err(CatalogInputError::MissingImage);
    }
    if min < 0 {
        return Err(CatalogInputError::NegativeMinimum);
    }
    if max < 1 {
        return Err(CatalogInputError::MaximumTooSmall);
    }
    if min > max {
        return Err(CatalogInputError::MinAboveMax { min, max });
    }
    Ok(())
}

impl NewCatalogEntry {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogInputError`] the input violates.
    pub fn validate(&self) -> Result<(), CatalogInputError> {
        check_bounds(&self.name, &self.image_ref, self.min_qty, self.max_qty)
    }
}

/// Partial update of a catalog entry from the edit form.
///
/// `None` leaves a field unchanged. Reordering is not done through this type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductChanges {
    pub image_ref: Option<String>,
    pub name: Option<String>,
    pub min_qty: Option<i32>,
    pub max_qty: Option<i32>,
    pub category: Option<Category>,
    pub availability: Option<Availability>,
}

impl ProductChanges {
    /// Apply the changes to a copy of `entry` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogInputError`] if the merged entry is invalid.
    pub fn apply_to(&self, entry: &CatalogEntry) -> Result<CatalogEntry, CatalogInputError> {
        let mut merged = entry.clone();
        if let Some(image_ref) = &self.image_ref {
            merged.image_ref.clone_from(image_ref);
        }
        if let Some(name) = &self.name {
            merged.name.clone_from(name);
        }
        if let Some(min) = self.min_qty {
            merged.min_qty = min;
        }
        if let Some(max) = self.max_qty {
            merged.max_qty = max;
        }
        if let Some(category) = self.category {
            merged.category = category;
        }
        if let Some(availability) = self.availability {
            merged.availability = availability;
        }
        check_bounds(&merged.name, &merged.image_ref, merged.min_qty, merged.max_qty)?;
        Ok(merged)
    }
}

/// Sort entries for display: serial first, then by rank, then by id.
pub fn sort_for_display(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| {
        a.category
            .rank()
            .cmp(&b.category.rank())
            .then(a.display_order.cmp(&b.display_order))
            .then(a.id.cmp(&b.id))
    });
}

/// Next free rank at the end of `category`.
#[must_use]
pub fn next_display_order(entries: &[CatalogEntry], category: Category) -> i32 {
    entries
        .iter()
        .filter(|e| e.category == category)
        .map(|e| e.display_order)
        .max()
        .map_or(0, |max| max + 1)
}
