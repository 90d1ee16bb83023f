//! In-memory implementation of the portal store.
//!
//! Holds every collection in one lock-protected struct and announces writes
//! on the change feed just like the `PostgreSQL` triggers do. Failures can be
//! injected with [`MemoryStore::inject`] to exercise the error paths of the
//! services (reorder reconciliation, partial completion).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast, watch};

use supply_desk_core::{
    CatalogEntry, Email, HistoricalOrder, HistoryId, NewCatalogEntry, NewOrder, NewUserAccount,
    Order, OrderId, OrderStatus, ProductId, UserAccount, UserAccountId,
};

use super::{CHANGE_FEED_CAPACITY, Collection, HistoryFilter, PortalStore, RepositoryError};

/// A one-shot failure. The next matching operation fails with
/// `RepositoryError::Unavailable` and the fault is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Writing the rank of this product.
    SetDisplayOrder(ProductId),
    /// Listing products.
    ListProducts,
    /// Creating a pending order.
    CreateOrder,
    /// Deleting a pending order.
    DeleteOrder,
    /// Copying an order into history.
    ArchiveOrder,
}

#[derive(Default)]
struct Collections {
    products: BTreeMap<ProductId, CatalogEntry>,
    orders: BTreeMap<OrderId, Order>,
    history: BTreeMap<HistoryId, HistoricalOrder>,
    users: BTreeMap<UserAccountId, UserAccount>,
    credentials: BTreeMap<Email, String>,
    next_id: i32,
}

impl Collections {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local document store.
pub struct MemoryStore {
    data: RwLock<Collections>,
    faults: Mutex<Vec<Fault>>,
    rank_gate: Mutex<Option<watch::Receiver<bool>>>,
    changes: broadcast::Sender<Collection>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            data: RwLock::new(Collections::default()),
            faults: Mutex::new(Vec::new()),
            rank_gate: Mutex::new(None),
            changes,
        }
    }

    /// Queue a one-shot failure.
    pub fn inject(&self, fault: Fault) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(fault);
        }
    }

    /// Hold every rank write until `true` is sent on the returned channel
    /// (or the sender is dropped).
    pub fn hold_rank_writes(&self) -> watch::Sender<bool> {
        let (open, gate) = watch::channel(false);
        if let Ok(mut slot) = self.rank_gate.lock() {
            *slot = Some(gate);
        }
        open
    }

    fn take_fault(&self, fault: Fault) -> Result<(), RepositoryError> {
        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        match faults.iter().position(|f| *f == fault) {
            Some(pos) => {
                faults.remove(pos);
                Err(RepositoryError::Unavailable(format!("injected {fault:?}")))
            }
            None => Ok(()),
        }
    }

    fn announce(&self, collection: Collection) {
        let _ = self.changes.send(collection);
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        self.take_fault(Fault::ListProducts)?;
        Ok(self.data.read().await.products.values().cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError> {
        Ok(self.data.read().await.products.get(&id).cloned())
    }

    async fn create_product(
        &self,
        input: &NewCatalogEntry,
        display_order: i32,
    ) -> Result<CatalogEntry, RepositoryError> {
        let entry = {
            let mut data = self.data.write().await;
            let id = ProductId::new(data.next_id());
            let entry = CatalogEntry {
                id,
                image_ref: input.image_ref.clone(),
                name: input.name.clone(),
                min_qty: input.min_qty,
                max_qty: input.max_qty,
                category: input.category,
                availability: input.availability,
                display_order,
                updated_at: Utc::now(),
            };
            data.products.insert(id, entry.clone());
            entry
        };
        self.announce(Collection::Products);
        Ok(entry)
    }

    async fn update_product(&self, entry: &CatalogEntry) -> Result<CatalogEntry, RepositoryError> {
        let updated = {
            let mut data = self.data.write().await;
            let stored = data
                .products
                .get_mut(&entry.id)
                .ok_or(RepositoryError::NotFound)?;
            *stored = CatalogEntry {
                updated_at: Utc::now(),
                ..entry.clone()
            };
            stored.clone()
        };
        self.announce(Collection::Products);
        Ok(updated)
    }

    async fn set_display_order(
        &self,
        id: ProductId,
        display_order: i32,
    ) -> Result<(), RepositoryError> {
        self.take_fault(Fault::SetDisplayOrder(id))?;
        let gate = self.rank_gate.lock().ok().and_then(|slot| slot.clone());
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        {
            let mut data = self.data.write().await;
            let stored = data.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            stored.display_order = display_order;
            stored.updated_at = Utc::now();
        }
        self.announce(Collection::Products);
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        self.data
            .write()
            .await
            .products
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        self.announce(Collection::Products);
        Ok(())
    }

    async fn list_pending_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self.data.read().await.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.data.read().await.orders.get(&id).cloned())
    }

    async fn create_order(&self, input: &NewOrder) -> Result<Order, RepositoryError> {
        self.take_fault(Fault::CreateOrder)?;
        let order = {
            let mut data = self.data.write().await;
            let id = OrderId::new(data.next_id());
            let order = Order {
                id,
                vehicle_tag: input.vehicle_tag.clone(),
                lines: input.lines.clone(),
                created_at: input.created_at,
                status: OrderStatus::Pending,
                requester: input.requester.clone(),
            };
            data.orders.insert(id, order.clone());
            order
        };
        self.announce(Collection::Orders);
        Ok(order)
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), RepositoryError> {
        self.take_fault(Fault::DeleteOrder)?;
        self.data
            .write()
            .await
            .orders
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        self.announce(Collection::Orders);
        Ok(())
    }

    async fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoricalOrder>, RepositoryError> {
        let data = self.data.read().await;
        let mut records: Vec<HistoricalOrder> = data
            .history
            .values()
            .filter(|record| match filter {
                HistoryFilter::All => true,
                HistoryFilter::Requester(requester) => record.is_visible_to(requester),
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(records)
    }

    async fn find_history_by_source(
        &self,
        order_id: OrderId,
    ) -> Result<Option<HistoricalOrder>, RepositoryError> {
        Ok(self
            .data
            .read()
            .await
            .history
            .values()
            .find(|record| record.source_order_id() == order_id)
            .cloned())
    }

    async fn archive_order(
        &self,
        order: &Order,
        completed_at: DateTime<Utc>,
    ) -> Result<HistoricalOrder, RepositoryError> {
        self.take_fault(Fault::ArchiveOrder)?;
        let record = {
            let mut data = self.data.write().await;
            if data
                .history
                .values()
                .any(|record| record.source_order_id() == order.id)
            {
                return Err(RepositoryError::Conflict("order already archived".to_owned()));
            }
            let id = HistoryId::new(data.next_id());
            let record = HistoricalOrder {
                id,
                order: Order {
                    status: OrderStatus::Completed,
                    ..order.clone()
                },
                completed_at,
            };
            data.history.insert(id, record.clone());
            record
        };
        self.announce(Collection::History);
        Ok(record)
    }

    async fn delete_history(&self, id: HistoryId) -> Result<(), RepositoryError> {
        self.data
            .write()
            .await
            .history
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        self.announce(Collection::History);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let mut users: Vec<UserAccount> = self.data.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn get_user(&self, id: UserAccountId) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self
            .data
            .read()
            .await
            .users
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn create_user(&self, input: &NewUserAccount) -> Result<UserAccount, RepositoryError> {
        let account = {
            let mut data = self.data.write().await;
            if data.users.values().any(|user| user.email == input.email) {
                return Err(RepositoryError::Conflict("email already exists".to_owned()));
            }
            let id = UserAccountId::new(data.next_id());
            let account = UserAccount {
                id,
                given_name: input.given_name.clone(),
                family_name: input.family_name.clone(),
                email: input.email.clone(),
                role: input.role,
                created_at: Utc::now(),
            };
            data.users.insert(id, account.clone());
            account
        };
        self.announce(Collection::Users);
        Ok(account)
    }

    async fn update_user(&self, account: &UserAccount) -> Result<UserAccount, RepositoryError> {
        let updated = {
            let mut data = self.data.write().await;
            let stored = data
                .users
                .get_mut(&account.id)
                .ok_or(RepositoryError::NotFound)?;
            stored.given_name.clone_from(&account.given_name);
            stored.family_name.clone_from(&account.family_name);
            stored.role = account.role;
            stored.clone()
        };
        self.announce(Collection::Users);
        Ok(updated)
    }

    async fn delete_user(&self, id: UserAccountId) -> Result<(), RepositoryError> {
        self.data
            .write()
            .await
            .users
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        self.announce(Collection::Users);
        Ok(())
    }

    async fn password_hash(&self, email: &Email) -> Result<Option<String>, RepositoryError> {
        Ok(self.data.read().await.credentials.get(email).cloned())
    }

    async fn store_credential(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut data = self.data.write().await;
        if data.credentials.contains_key(email) {
            return Err(RepositoryError::Conflict(
                "email already registered".to_owned(),
            ));
        }
        data.credentials
            .insert(email.clone(), password_hash.to_owned());
        Ok(())
    }

    async fn delete_credential(&self, email: &Email) -> Result<(), RepositoryError> {
        self.data.write().await.credentials.remove(email);
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use supply_desk_core::{Availability, Category, CartLine, Requester, Role, VehicleTag};

    use super::*;

    fn new_entry(name: &str) -> NewCatalogEntry {
        NewCatalogEntry {
            image_ref: format!("{name}.png"),
            name: name.to_owned(),
            min_qty: 1,
            max_qty: 4,
            category: Category::Serial,
            availability: Availability::Available,
        }
    }

    fn new_order(given: &str, minutes: i64) -> NewOrder {
        NewOrder {
            vehicle_tag: VehicleTag::parse("VP").unwrap(),
            lines: vec![CartLine {
                catalog_entry_id: ProductId::new(1),
                name: "Cable".into(),
                quantity: 1,
            }],
            requester: Requester::new(given, "Perez"),
            created_at: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_writes_are_announced() {
        let store = MemoryStore::new();
        let mut changes = store.changes();

        store.create_product(&new_entry("a"), 0).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), Collection::Products);

        store.create_order(&new_order("Ana", 0)).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), Collection::Orders);
    }

    #[tokio::test]
    async fn test_fault_is_one_shot() {
        let store = MemoryStore::new();
        let entry = store.create_product(&new_entry("a"), 0).await.unwrap();

        store.inject(Fault::SetDisplayOrder(entry.id));
        assert!(matches!(
            store.set_display_order(entry.id, 3).await,
            Err(RepositoryError::Unavailable(_))
        ));
        store.set_display_order(entry.id, 3).await.unwrap();
        assert_eq!(
            store.get_product(entry.id).await.unwrap().unwrap().display_order,
            3
        );
    }

    #[tokio::test]
    async fn test_pending_orders_oldest_first_history_newest_first() {
        let store = MemoryStore::new();
        let late = store.create_order(&new_order("Ana", 10)).await.unwrap();
        let early = store.create_order(&new_order("Luis", 5)).await.unwrap();

        let pending = store.list_pending_orders().await.unwrap();
        assert_eq!(pending.iter().map(|o| o.id).collect::<Vec<_>>(), vec![early.id, late.id]);

        store.archive_order(&early, Utc::now()).await.unwrap();
        store.archive_order(&late, Utc::now()).await.unwrap();
        let history = store.list_history(&HistoryFilter::All).await.unwrap();
        assert_eq!(
            history.iter().map(|h| h.source_order_id()).collect::<Vec<_>>(),
            vec![late.id, early.id]
        );

        let mine = store
            .list_history(&HistoryFilter::Requester(Requester::new("Ana", "Perez")))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_archive_twice_conflicts() {
        let store = MemoryStore::new();
        let order = store.create_order(&new_order("Ana", 0)).await.unwrap();
        store.archive_order(&order, Utc::now()).await.unwrap();
        assert!(matches!(
            store.archive_order(&order, Utc::now()).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let input = NewUserAccount {
            given_name: "Ana".into(),
            family_name: "Perez".into(),
            email: Email::parse("ana@flota.com").unwrap(),
            role: Role::Tecnico,
        };
        store.create_user(&input).await.unwrap();
        assert!(matches!(
            store.create_user(&input).await,
            Err(RepositoryError::Conflict(_))
        ));
    }
}
