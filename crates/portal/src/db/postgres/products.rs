//! Product (catalog entry) repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use supply_desk_core::{CatalogEntry, NewCatalogEntry, ProductId};

use crate::db::RepositoryError;

/// Internal row type for `PostgreSQL` product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    image_ref: String,
    name: String,
    min_qty: i32,
    max_qty: i32,
    category: String,
    availability: String,
    display_order: Option<i32>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for CatalogEntry {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let category = row.category.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;
        let availability = row.availability.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            image_ref: row.image_ref,
            name: row.name,
            min_qty: row.min_qty,
            max_qty: row.max_qty,
            category,
            availability,
            display_order: row.display_order.unwrap_or(0),
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, image_ref, name, min_qty, max_qty, category, availability, \
                       display_order, updated_at";

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all products in storage order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row is invalid.
    pub async fn list_all(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM portal.product ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM portal.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert a product at `display_order`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        input: &NewCatalogEntry,
        display_order: i32,
    ) -> Result<CatalogEntry, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO portal.product
                (image_ref, name, min_qty, max_qty, category, availability, display_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "
        ))
        .bind(&input.image_ref)
        .bind(&input.name)
        .bind(input.min_qty)
        .bind(input.max_qty)
        .bind(input.category.as_str())
        .bind(input.availability.as_str())
        .bind(display_order)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Overwrite every field of a product except its id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn update(&self, entry: &CatalogEntry) -> Result<CatalogEntry, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE portal.product
            SET image_ref = $2, name = $3, min_qty = $4, max_qty = $5,
                category = $6, availability = $7, display_order = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(entry.id)
        .bind(&entry.image_ref)
        .bind(&entry.name)
        .bind(entry.min_qty)
        .bind(entry.max_qty)
        .bind(entry.category.as_str())
        .bind(entry.availability.as_str())
        .bind(entry.display_order)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Write a product's rank.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_display_order(
        &self,
        id: ProductId,
        display_order: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE portal.product SET display_order = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(display_order)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM portal.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
