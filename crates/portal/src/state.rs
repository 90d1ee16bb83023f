//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::PortalConfig;
use crate::db::{PortalStore, SharedStore};
use crate::services::{
    AuthService, BusinessHours, CartRegistry, CatalogReorderController, Clock, NoticeHub,
    OrderLifecycleManager, UserAdminService,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. The catalog view, carts and
/// notice channels live here so every request sees the same ones.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    store: SharedStore,
    catalog: CatalogReorderController,
    orders: OrderLifecycleManager,
    carts: CartRegistry,
    notices: Arc<NoticeHub>,
    hours: BusinessHours,
}

impl AppState {
    /// Create a new application state over `store`.
    #[must_use]
    pub fn new(config: PortalConfig, store: SharedStore, clock: Clock) -> Self {
        let notices = Arc::new(NoticeHub::new());
        let catalog = CatalogReorderController::new(store.clone());
        let orders =
            OrderLifecycleManager::new(store.clone(), clock, config.ordering.vehicles.clone());
        let carts = CartRegistry::new(notices.clone(), config.ordering.cart_reminder);
        let hours = BusinessHours::new(&config.ordering, clock);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                catalog,
                orders,
                carts,
                notices,
                hours,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// The document store.
    #[must_use]
    pub fn store(&self) -> &dyn PortalStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogReorderController {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderLifecycleManager {
        &self.inner.orders
    }

    #[must_use]
    pub fn carts(&self) -> &CartRegistry {
        &self.inner.carts
    }

    #[must_use]
    pub fn notices(&self) -> &NoticeHub {
        &self.inner.notices
    }

    #[must_use]
    pub fn hours(&self) -> &BusinessHours {
        &self.inner.hours
    }

    /// Authentication over the shared store.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.store())
    }

    /// User administration over the shared store.
    #[must_use]
    pub fn users(&self) -> UserAdminService<'_> {
        UserAdminService::new(self.store())
    }
}
