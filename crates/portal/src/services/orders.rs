//! Order lifecycle: submit, complete, cancel, and the history archive.
//!
//! ```text
//! submit ──► pending ──complete──► history (pending removed)
//!               │
//!               └──cancel──► removed, no trace
//! ```
//!
//! Completion copies the order into history and then deletes the pending
//! document. The two writes are not atomic, so completion checks for an
//! existing history record first: completing an order twice, or retrying
//! after the delete failed, never produces a second record.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::instrument;

use supply_desk_core::{
    CartLine, HistoricalOrder, HistoryId, NewOrder, Order, OrderId, Session, VehicleTag,
};

use super::hours::Clock;
use crate::db::{Collection, HistoryFilter, RepositoryError, SharedStore, Subscription, subscribe};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("select a vehicle before submitting")]
    MissingVehicle,

    #[error("unknown vehicle: {0}")]
    UnknownVehicle(VehicleTag),

    #[error("quantity for {0} must be at least 1")]
    InvalidQuantity(String),

    #[error("order not found")]
    NotFound,

    #[error("only administrators can delete history")]
    Forbidden,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Drives orders through their lifecycle.
pub struct OrderLifecycleManager {
    store: SharedStore,
    clock: Clock,
    vehicles: Vec<VehicleTag>,
}

impl OrderLifecycleManager {
    #[must_use]
    pub fn new(store: SharedStore, clock: Clock, vehicles: Vec<VehicleTag>) -> Self {
        Self {
            store,
            clock,
            vehicles,
        }
    }

    /// The fleet orders can be placed for.
    #[must_use]
    pub fn vehicles(&self) -> &[VehicleTag] {
        &self.vehicles
    }

    /// Submit a cart as a pending order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart`, `OrderError::MissingVehicle`,
    /// `OrderError::UnknownVehicle` or `OrderError::InvalidQuantity` for bad
    /// input, and `OrderError::Repository` if the write fails.
    #[instrument(skip(self, session, lines), fields(requester = %session.email, lines = lines.len()))]
    pub async fn submit(
        &self,
        session: &Session,
        vehicle: Option<&VehicleTag>,
        lines: &[CartLine],
    ) -> Result<Order, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let vehicle = vehicle.ok_or(OrderError::MissingVehicle)?;
        if !self.vehicles.contains(vehicle) {
            return Err(OrderError::UnknownVehicle(vehicle.clone()));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity < 1) {
            return Err(OrderError::InvalidQuantity(line.name.clone()));
        }

        let input = NewOrder {
            vehicle_tag: vehicle.clone(),
            lines: lines.to_vec(),
            requester: session.requester(),
            created_at: self.clock.now(),
        };
        let order = self.store.create_order(&input).await?;
        tracing::info!(order_id = %order.id, vehicle = %order.vehicle_tag, "Order submitted");
        Ok(order)
    }

    /// Complete a pending order: archive it, then remove it from pending.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if no pending order has this id.
    #[instrument(skip(self))]
    pub async fn complete(&self, id: OrderId) -> Result<HistoricalOrder, OrderError> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let record = match self.store.find_history_by_source(id).await? {
            Some(existing) => {
                tracing::warn!(order_id = %id, history_id = %existing.id, "Order already archived, skipping copy");
                existing
            }
            None => match self.store.archive_order(&order, self.clock.now()).await {
                Ok(record) => record,
                Err(RepositoryError::Conflict(_)) => self
                    .store
                    .find_history_by_source(id)
                    .await?
                    .ok_or(OrderError::NotFound)?,
                Err(e) => return Err(e.into()),
            },
        };

        match self.store.delete_order(id).await {
            // A concurrent completion removed it first.
            Ok(()) | Err(RepositoryError::NotFound) => {}
            Err(e) => {
                tracing::error!(order_id = %id, error = %e, "Archived order could not be removed from pending");
                return Err(e.into());
            }
        }

        tracing::info!(order_id = %id, history_id = %record.id, "Order completed");
        Ok(record)
    }

    /// Cancel a pending order. Leaves no history.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if no pending order has this id.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId) -> Result<(), OrderError> {
        self.store.delete_order(id).await.map_err(not_found)?;
        tracing::info!(order_id = %id, "Order cancelled");
        Ok(())
    }

    /// Permanently delete a history record. Administrators only.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Forbidden` for non-admins and
    /// `OrderError::NotFound` for an unknown record.
    #[instrument(skip(self, actor), fields(actor = %actor.email))]
    pub async fn delete_history(&self, actor: &Session, id: HistoryId) -> Result<(), OrderError> {
        if !actor.is_admin() {
            return Err(OrderError::Forbidden);
        }
        self.store.delete_history(id).await.map_err(not_found)?;
        tracing::info!(history_id = %id, "History record deleted");
        Ok(())
    }

    /// Pending orders, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn pending(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_pending_orders().await?)
    }

    /// History visible to `session`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn history_for(&self, session: &Session) -> Result<Vec<HistoricalOrder>, OrderError> {
        Ok(self.store.list_history(&history_filter(session)).await?)
    }

    /// Live pending-order list.
    #[must_use]
    pub fn subscribe_pending(&self) -> Subscription<Vec<Order>> {
        subscribe(self.store.clone(), &[Collection::Orders], |store| async move {
            store.list_pending_orders().await
        })
    }

    /// Live history visible to `session`.
    #[must_use]
    pub fn subscribe_history(&self, session: &Session) -> Subscription<Vec<HistoricalOrder>> {
        let filter = history_filter(session);
        subscribe(self.store.clone(), &[Collection::History], move |store| {
            let filter = filter.clone();
            async move { store.list_history(&filter).await }
        })
    }
}

/// Administrators see every record; everyone else only records whose
/// requester has both of their names.
#[must_use]
pub fn history_filter(session: &Session) -> HistoryFilter {
    if session.is_admin() {
        HistoryFilter::All
    } else {
        HistoryFilter::Requester(session.requester())
    }
}

/// Group history by requester display name, keeping each group's order.
#[must_use]
pub fn group_by_requester(records: Vec<HistoricalOrder>) -> BTreeMap<String, Vec<HistoricalOrder>> {
    let mut groups: BTreeMap<String, Vec<HistoricalOrder>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.order.requester.display_name())
            .or_default()
            .push(record);
    }
    groups
}

fn not_found(e: RepositoryError) -> OrderError {
    match e {
        RepositoryError::NotFound => OrderError::NotFound,
        other => OrderError::Repository(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use supply_desk_core::{Email, OrderStatus, ProductId, Role};

    use super::*;
    use crate::db::{FeedState, Fault, MemoryStore, PortalStore};

    fn session(given: &str, family: &str, role: Role) -> Session {
        Session {
            email: Email::parse(&format!("{}@flota.com", given.to_lowercase())).unwrap(),
            given_name: given.into(),
            family_name: family.into(),
            role,
        }
    }

    fn line(qty: i32) -> CartLine {
        CartLine {
            catalog_entry_id: ProductId::new(1),
            name: "Cable UTP".into(),
            quantity: qty,
        }
    }

    fn manager(store: Arc<MemoryStore>) -> OrderLifecycleManager {
        let at = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        OrderLifecycleManager::new(
            store,
            Clock::Fixed(at),
            vec![VehicleTag::parse("JX").unwrap(), VehicleTag::parse("KT").unwrap()],
        )
    }

    fn jx() -> VehicleTag {
        VehicleTag::parse("JX").unwrap()
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let orders = manager(Arc::new(MemoryStore::new()));
        let ana = session("Ana", "Paz", Role::Tecnico);

        assert!(matches!(
            orders.submit(&ana, Some(&jx()), &[]).await,
            Err(OrderError::EmptyCart)
        ));
        assert!(matches!(
            orders.submit(&ana, None, &[line(1)]).await,
            Err(OrderError::MissingVehicle)
        ));
        assert!(matches!(
            orders
                .submit(&ana, Some(&VehicleTag::parse("ZZ").unwrap()), &[line(1)])
                .await,
            Err(OrderError::UnknownVehicle(_))
        ));
        assert!(matches!(
            orders.submit(&ana, Some(&jx()), &[line(0)]).await,
            Err(OrderError::InvalidQuantity(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_stamps_requester_and_time() {
        let orders = manager(Arc::new(MemoryStore::new()));
        let ana = session("Ana", "Paz", Role::Tecnico);
        let order = orders.submit(&ana, Some(&jx()), &[line(2)]).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.requester.display_name(), "Ana Paz");
        assert_eq!(
            order.created_at,
            Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_complete_moves_order_to_history() {
        let store = Arc::new(MemoryStore::new());
        let orders = manager(store.clone());
        let ana = session("Ana", "Paz", Role::Tecnico);
        let order = orders.submit(&ana, Some(&jx()), &[line(2)]).await.unwrap();

        let record = orders.complete(order.id).await.unwrap();
        assert_eq!(record.source_order_id(), order.id);
        assert_eq!(record.order.lines, order.lines);
        assert_eq!(record.order.status, OrderStatus::Completed);

        assert!(orders.pending().await.unwrap().is_empty());
        assert_eq!(orders.history_for(&ana).await.unwrap(), vec![record]);
        assert!(matches!(
            orders.complete(order.id).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_retry_after_failed_delete_does_not_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let orders = manager(store.clone());
        let ana = session("Ana", "Paz", Role::Tecnico);
        let order = orders.submit(&ana, Some(&jx()), &[line(1)]).await.unwrap();

        store.inject(Fault::DeleteOrder);
        assert!(orders.complete(order.id).await.is_err());
        assert_eq!(orders.pending().await.unwrap().len(), 1);

        orders.complete(order.id).await.unwrap();
        assert!(orders.pending().await.unwrap().is_empty());
        assert_eq!(store.list_history(&HistoryFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_leaves_no_history() {
        let store = Arc::new(MemoryStore::new());
        let orders = manager(store.clone());
        let ana = session("Ana", "Paz", Role::Tecnico);
        let order = orders.submit(&ana, Some(&jx()), &[line(1)]).await.unwrap();

        orders.cancel(order.id).await.unwrap();
        assert!(orders.pending().await.unwrap().is_empty());
        assert!(store.list_history(&HistoryFilter::All).await.unwrap().is_empty());
        assert!(matches!(orders.cancel(order.id).await, Err(OrderError::NotFound)));
    }

    #[tokio::test]
    async fn test_history_visibility_and_deletion() {
        let store = Arc::new(MemoryStore::new());
        let orders = manager(store.clone());
        let ana = session("Ana", "Paz", Role::Tecnico);
        let luis = session("Luis", "Rey", Role::Tecnico);
        let admin = session("Jefe", "Max", Role::Admin);

        for who in [&ana, &luis, &ana] {
            let order = orders.submit(who, Some(&jx()), &[line(1)]).await.unwrap();
            orders.complete(order.id).await.unwrap();
        }

        let mine = orders.history_for(&ana).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.order.requester.display_name() == "Ana Paz"));
        assert_eq!(orders.history_for(&admin).await.unwrap().len(), 3);

        let grouped = group_by_requester(orders.history_for(&admin).await.unwrap());
        assert_eq!(grouped.keys().collect::<Vec<_>>(), ["Ana Paz", "Luis Rey"]);
        assert_eq!(grouped["Ana Paz"].len(), 2);

        assert!(matches!(
            orders.delete_history(&ana, mine[0].id).await,
            Err(OrderError::Forbidden)
        ));
        orders.delete_history(&admin, mine[0].id).await.unwrap();
        assert_eq!(orders.history_for(&ana).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_subscription_follows_writes() {
        let store = Arc::new(MemoryStore::new());
        let orders = manager(store.clone());
        let ana = session("Ana", "Paz", Role::Tecnico);

        let mut live = orders.subscribe_pending();
        assert_eq!(live.settled().await, Some(FeedState::Ready(vec![])));

        let order = orders.submit(&ana, Some(&jx()), &[line(1)]).await.unwrap();
        assert_eq!(live.next().await, Some(FeedState::Ready(vec![order])));
    }
}
