//! Document store for the portal.
//!
//! The portal talks to its persistence through the [`PortalStore`] trait:
//! collection-scoped CRUD plus a change feed that announces which collection
//! was written. Two implementations exist:
//!
//! - [`PgStore`] - `PostgreSQL` through sqlx; triggers `NOTIFY portal_changes`
//!   and a `PgListener` task turns the notifications into the change feed
//! - [`MemoryStore`] - process-local, used for local runs and tests
//!
//! # Tables (schema `portal`)
//!
//! - `user_account` - user profiles
//! - `credential` - Argon2id password hashes keyed by email
//! - `product` - catalog entries
//! - `pending_order` - submitted orders awaiting completion
//! - `order_history` - completed orders (one per source order)
//! - `session` - tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/portal/migrations/` and run via:
//! ```bash
//! cargo run -p supply-desk-cli -- migrate
//! ```

pub mod feed;
pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::broadcast;

use supply_desk_core::{
    CatalogEntry, Email, HistoricalOrder, HistoryId, NewCatalogEntry, NewOrder, NewUserAccount,
    Order, OrderId, ProductId, Requester, UserAccount, UserAccountId,
};

pub use feed::{FeedState, Subscription, subscribe};
pub use memory::{Fault, MemoryStore};
pub use postgres::PgStore;

/// Shared handle to the store used by services and handlers.
pub type SharedStore = Arc<dyn PortalStore>;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store refused or failed the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A collection of documents, as announced on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Orders,
    History,
    Users,
}

impl Collection {
    /// Name used in `NOTIFY` payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Orders => "orders",
            Self::History => "history",
            Self::Users => "users",
        }
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(Self::Products),
            "orders" => Ok(Self::Orders),
            "history" => Ok(Self::History),
            "users" => Ok(Self::Users),
            _ => Err(format!("unknown collection: {s}")),
        }
    }
}

/// Which history records a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFilter {
    /// Every completed order.
    All,
    /// Only orders whose requester matches both names.
    Requester(Requester),
}

/// Capacity of the change feed; slow listeners see `Lagged` and refetch.
pub const CHANGE_FEED_CAPACITY: usize = 64;

/// The portal's document store.
///
/// Listing methods return documents in their canonical order: products
/// unsorted (callers sort for display), pending orders by creation time
/// ascending, history by creation time descending.
#[async_trait]
pub trait PortalStore: Send + Sync {
    // Products

    async fn list_products(&self) -> Result<Vec<CatalogEntry>, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError>;

    async fn create_product(
        &self,
        input: &NewCatalogEntry,
        display_order: i32,
    ) -> Result<CatalogEntry, RepositoryError>;

    /// Overwrite the editable fields (everything but id) of a product.
    async fn update_product(&self, entry: &CatalogEntry) -> Result<CatalogEntry, RepositoryError>;

    /// Write a single product's rank.
    async fn set_display_order(
        &self,
        id: ProductId,
        display_order: i32,
    ) -> Result<(), RepositoryError>;

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    // Pending orders

    async fn list_pending_orders(&self) -> Result<Vec<Order>, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn create_order(&self, input: &NewOrder) -> Result<Order, RepositoryError>;

    async fn delete_order(&self, id: OrderId) -> Result<(), RepositoryError>;

    // History

    async fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoricalOrder>, RepositoryError>;

    async fn find_history_by_source(
        &self,
        order_id: OrderId,
    ) -> Result<Option<HistoricalOrder>, RepositoryError>;

    /// Copy `order` into history. Fails with `Conflict` if a record for the
    /// same source order exists.
    async fn archive_order(
        &self,
        order: &Order,
        completed_at: DateTime<Utc>,
    ) -> Result<HistoricalOrder, RepositoryError>;

    async fn delete_history(&self, id: HistoryId) -> Result<(), RepositoryError>;

    // Users

    async fn list_users(&self) -> Result<Vec<UserAccount>, RepositoryError>;

    async fn get_user(&self, id: UserAccountId) -> Result<Option<UserAccount>, RepositoryError>;

    async fn find_user_by_email(&self, email: &Email)
    -> Result<Option<UserAccount>, RepositoryError>;

    async fn create_user(&self, input: &NewUserAccount) -> Result<UserAccount, RepositoryError>;

    /// Overwrite names and role of a user. The email is never changed.
    async fn update_user(&self, account: &UserAccount) -> Result<UserAccount, RepositoryError>;

    async fn delete_user(&self, id: UserAccountId) -> Result<(), RepositoryError>;

    // Credentials

    async fn password_hash(&self, email: &Email) -> Result<Option<String>, RepositoryError>;

    /// Store a credential. Fails with `Conflict` if the email has one.
    async fn store_credential(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;

    async fn delete_credential(&self, email: &Email) -> Result<(), RepositoryError>;

    // Change feed

    /// Subscribe to write notifications.
    fn changes(&self) -> broadcast::Receiver<Collection>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(e)
}
