//! Pending order and order history repositories.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use supply_desk_core::{
    CartLine, HistoricalOrder, HistoryId, NewOrder, Order, OrderId, OrderStatus, Requester,
    VehicleTag,
};

use crate::db::{HistoryFilter, RepositoryError, map_unique_violation};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` pending order queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    vehicle_tag: String,
    lines: Json<Vec<CartLine>>,
    requester_given_name: String,
    requester_family_name: String,
    created_at: DateTime<Utc>,
}

fn parse_vehicle(raw: &str, context: &str) -> Result<VehicleTag, RepositoryError> {
    VehicleTag::parse(raw).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid vehicle tag in {context}: {e}"))
    })
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            vehicle_tag: parse_vehicle(&row.vehicle_tag, "pending_order")?,
            lines: row.lines.0,
            created_at: row.created_at,
            status: OrderStatus::Pending,
            requester: Requester::new(row.requester_given_name, row.requester_family_name),
        })
    }
}

/// Internal row type for `PostgreSQL` history queries.
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i32,
    source_order_id: i32,
    vehicle_tag: String,
    lines: Json<Vec<CartLine>>,
    requester_given_name: String,
    requester_family_name: String,
    created_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoricalOrder {
    type Error = RepositoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: HistoryId::new(row.id),
            order: Order {
                id: OrderId::new(row.source_order_id),
                vehicle_tag: parse_vehicle(&row.vehicle_tag, "order_history")?,
                lines: row.lines.0,
                created_at: row.created_at,
                status: OrderStatus::Completed,
                requester: Requester::new(row.requester_given_name, row.requester_family_name),
            },
            completed_at: row.completed_at,
        })
    }
}

const ORDER_COLUMNS: &str =
    "id, vehicle_tag, lines, requester_given_name, requester_family_name, created_at";

const HISTORY_COLUMNS: &str = "id, source_order_id, vehicle_tag, lines, requester_given_name, \
                               requester_family_name, created_at, completed_at";

// =============================================================================
// Pending Orders
// =============================================================================

/// Repository for pending orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List pending orders, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_pending(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM portal.pending_order ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a pending order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM portal.pending_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert a pending order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, input: &NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO portal.pending_order
                (vehicle_tag, lines, requester_given_name, requester_family_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(input.vehicle_tag.as_str())
        .bind(Json(&input.lines))
        .bind(&input.requester.given_name)
        .bind(&input.requester.family_name)
        .bind(input.created_at)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Physically remove a pending order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn delete(&self, id: OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM portal.pending_order WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// History
// =============================================================================

/// Repository for completed orders.
pub struct HistoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> HistoryRepository<'a> {
    /// Create a new history repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List history records, newest order first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoricalOrder>, RepositoryError> {
        let rows = match filter {
            HistoryFilter::All => {
                sqlx::query_as::<_, HistoryRow>(&format!(
                    "SELECT {HISTORY_COLUMNS} FROM portal.order_history \
                     ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(self.pool)
                .await?
            }
            HistoryFilter::Requester(requester) => {
                sqlx::query_as::<_, HistoryRow>(&format!(
                    "SELECT {HISTORY_COLUMNS} FROM portal.order_history \
                     WHERE requester_given_name = $1 AND requester_family_name = $2 \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(&requester.given_name)
                .bind(&requester.family_name)
                .fetch_all(self.pool)
                .await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Find the record archived from a pending order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_source(
        &self,
        order_id: OrderId,
    ) -> Result<Option<HistoricalOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM portal.order_history WHERE source_order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Copy an order into history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order was already archived.
    pub async fn archive(
        &self,
        order: &Order,
        completed_at: DateTime<Utc>,
    ) -> Result<HistoricalOrder, RepositoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            r"
            INSERT INTO portal.order_history
                (source_order_id, vehicle_tag, lines, requester_given_name,
                 requester_family_name, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {HISTORY_COLUMNS}
            "
        ))
        .bind(order.id)
        .bind(order.vehicle_tag.as_str())
        .bind(Json(&order.lines))
        .bind(&order.requester.given_name)
        .bind(&order.requester.family_name)
        .bind(order.created_at)
        .bind(completed_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "order already archived"))?;

        row.try_into()
    }

    /// Delete a history record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record does not exist.
    pub async fn delete(&self, id: HistoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM portal.order_history WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
