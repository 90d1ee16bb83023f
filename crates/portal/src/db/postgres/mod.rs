//! `PostgreSQL` implementation of the portal store.

mod orders;
mod products;
mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use supply_desk_core::{
    CatalogEntry, Email, HistoricalOrder, HistoryId, NewCatalogEntry, NewOrder, NewUserAccount,
    Order, OrderId, ProductId, UserAccount, UserAccountId,
};

pub use orders::{HistoryRepository, OrderRepository};
pub use products::ProductRepository;
pub use users::{CredentialRepository, UserRepository};

use super::{CHANGE_FEED_CAPACITY, Collection, HistoryFilter, PortalStore, RepositoryError};

/// Channel the `portal` triggers notify on.
pub const CHANGE_CHANNEL: &str = "portal_changes";

/// Store backed by a `PostgreSQL` pool.
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<Collection>,
    listener: JoinHandle<()>,
}

impl PgStore {
    /// Wrap a pool and start listening for change notifications.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the listener connection cannot be set up.
    pub async fn connect(pool: PgPool) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let sender = changes.clone();
        let listener = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match notification.payload().parse::<Collection>() {
                        // No receivers is fine: nobody is watching right now.
                        Ok(collection) => {
                            let _ = sender.send(collection);
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring change notification"),
                    },
                    Err(e) => {
                        // PgListener reconnects on the next recv; subscribers
                        // refetch everything since they may have missed writes.
                        tracing::error!(error = %e, "Change listener error");
                        for collection in [
                            Collection::Products,
                            Collection::Orders,
                            Collection::History,
                            Collection::Users,
                        ] {
                            let _ = sender.send(collection);
                        }
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        tracing::info!(channel = CHANGE_CHANNEL, "Listening for store changes");
        Ok(Self {
            pool,
            changes,
            listener,
        })
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl PortalStore for PgStore {
    async fn list_products(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        ProductRepository::new(&self.pool).list_all().await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError> {
        ProductRepository::new(&self.pool).get_by_id(id).await
    }

    async fn create_product(
        &self,
        input: &NewCatalogEntry,
        display_order: i32,
    ) -> Result<CatalogEntry, RepositoryError> {
        ProductRepository::new(&self.pool)
            .create(input, display_order)
            .await
    }

    async fn update_product(&self, entry: &CatalogEntry) -> Result<CatalogEntry, RepositoryError> {
        ProductRepository::new(&self.pool).update(entry).await
    }

    async fn set_display_order(
        &self,
        id: ProductId,
        display_order: i32,
    ) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool)
            .set_display_order(id, display_order)
            .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool).delete(id).await
    }

    async fn list_pending_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).list_pending().await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get_by_id(id).await
    }

    async fn create_order(&self, input: &NewOrder) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).create(input).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), RepositoryError> {
        OrderRepository::new(&self.pool).delete(id).await
    }

    async fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoricalOrder>, RepositoryError> {
        HistoryRepository::new(&self.pool).list(filter).await
    }

    async fn find_history_by_source(
        &self,
        order_id: OrderId,
    ) -> Result<Option<HistoricalOrder>, RepositoryError> {
        HistoryRepository::new(&self.pool)
            .find_by_source(order_id)
            .await
    }

    async fn archive_order(
        &self,
        order: &Order,
        completed_at: DateTime<Utc>,
    ) -> Result<HistoricalOrder, RepositoryError> {
        HistoryRepository::new(&self.pool)
            .archive(order, completed_at)
            .await
    }

    async fn delete_history(&self, id: HistoryId) -> Result<(), RepositoryError> {
        HistoryRepository::new(&self.pool).delete(id).await
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        UserRepository::new(&self.pool).list_all().await
    }

    async fn get_user(&self, id: UserAccountId) -> Result<Option<UserAccount>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_id(id).await
    }

    async fn find_user_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_email(email).await
    }

    async fn create_user(&self, input: &NewUserAccount) -> Result<UserAccount, RepositoryError> {
        UserRepository::new(&self.pool).create(input).await
    }

    async fn update_user(&self, account: &UserAccount) -> Result<UserAccount, RepositoryError> {
        UserRepository::new(&self.pool).update(account).await
    }

    async fn delete_user(&self, id: UserAccountId) -> Result<(), RepositoryError> {
        UserRepository::new(&self.pool).delete(id).await
    }

    async fn password_hash(&self, email: &Email) -> Result<Option<String>, RepositoryError> {
        CredentialRepository::new(&self.pool)
            .password_hash(email)
            .await
    }

    async fn store_credential(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        CredentialRepository::new(&self.pool)
            .create(email, password_hash)
            .await
    }

    async fn delete_credential(&self, email: &Email) -> Result<(), RepositoryError> {
        CredentialRepository::new(&self.pool).delete(email).await
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
