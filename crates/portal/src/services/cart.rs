//! Cart accumulator.
//!
//! Each signed-in user has one cart: a selected vehicle, staged quantities
//! per catalog entry, and the committed lines that will be submitted. A
//! staged quantity that is not added to the cart within the reminder delay
//! triggers one warning notice. Changing the staged quantity restarts the
//! timer; adding, zeroing or clearing cancels it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use supply_desk_core::{CartLine, CatalogEntry, Email, ProductId, VehicleTag};

use super::notify::{Notice, NoticeHub};

/// Carts idle for this long are dropped, cancelling their reminders.
const CART_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Errors from cart operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// The entry is committed; remove it before changing its quantity.
    #[error("{0} is already in the cart")]
    AlreadyInCart(String),

    #[error("quantity for {name} must be between 0 and {max}")]
    QuantityOutOfRange { name: String, max: i32 },

    #[error("{0} is not available")]
    Unavailable(String),

    #[error("item is not in the cart")]
    NotInCart,
}

/// A staged, uncommitted quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedQuantity {
    pub catalog_entry_id: ProductId,
    pub quantity: i32,
}

/// What the ordering page shows of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub vehicle: Option<VehicleTag>,
    pub lines: Vec<CartLine>,
    pub staged: Vec<StagedQuantity>,
}

/// One user's cart.
pub struct CartAccumulator {
    owner: Email,
    vehicle: Option<VehicleTag>,
    staged: HashMap<ProductId, i32>,
    lines: Vec<CartLine>,
    reminders: HashMap<ProductId, JoinHandle<()>>,
    notices: Arc<NoticeHub>,
    delay: Duration,
}

impl CartAccumulator {
    #[must_use]
    pub fn new(owner: Email, notices: Arc<NoticeHub>, delay: Duration) -> Self {
        Self {
            owner,
            vehicle: None,
            staged: HashMap::new(),
            lines: Vec::new(),
            reminders: HashMap::new(),
            notices,
            delay,
        }
    }

    #[must_use]
    pub const fn vehicle(&self) -> Option<&VehicleTag> {
        self.vehicle.as_ref()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Staged quantity for an entry, 0 when nothing is staged.
    #[must_use]
    pub fn staged(&self, id: ProductId) -> i32 {
        self.staged.get(&id).copied().unwrap_or(0)
    }

    fn in_cart(&self, id: ProductId) -> bool {
        self.lines.iter().any(|line| line.catalog_entry_id == id)
    }

    /// Stage a quantity for `entry` and (re)start its reminder.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AlreadyInCart` for a committed entry,
    /// `CartError::Unavailable` for an unavailable one, and
    /// `CartError::QuantityOutOfRange` outside `0..=max_qty`.
    pub fn set_quantity(&mut self, entry: &CatalogEntry, qty: i32) -> Result<(), CartError> {
        if self.in_cart(entry.id) {
            return Err(CartError::AlreadyInCart(entry.name.clone()));
        }
        if !entry.is_available() {
            return Err(CartError::Unavailable(entry.name.clone()));
        }
        if !entry.accepts_quantity(qty) {
            return Err(CartError::QuantityOutOfRange {
                name: entry.name.clone(),
                max: entry.max_qty,
            });
        }

        self.cancel_reminder(entry.id);
        if qty == 0 {
            self.staged.remove(&entry.id);
            return Ok(());
        }
        self.staged.insert(entry.id, qty);

        let notices = Arc::clone(&self.notices);
        let owner = self.owner.clone();
        let delay = self.delay;
        let message = format!(
            "You selected {qty} {}. Remember to add it to the cart.",
            entry.name
        );
        let reminder = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notices.send(&owner, Notice::warning(message));
        });
        self.reminders.insert(entry.id, reminder);
        Ok(())
    }

    /// Commit the staged quantity of `entry` as a cart line.
    ///
    /// Returns `false` (and changes nothing) when nothing is staged.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AlreadyInCart` for an entry already committed.
    pub fn add_to_cart(&mut self, entry: &CatalogEntry) -> Result<bool, CartError> {
        if self.in_cart(entry.id) {
            return Err(CartError::AlreadyInCart(entry.name.clone()));
        }
        let Some(quantity) = self.staged.remove(&entry.id) else {
            return Ok(false);
        };
        self.cancel_reminder(entry.id);
        self.lines.push(CartLine {
            catalog_entry_id: entry.id,
            name: entry.name.clone(),
            quantity,
        });
        Ok(true)
    }

    /// Drop a committed line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if no line has this entry.
    pub fn remove_from_cart(&mut self, id: ProductId) -> Result<CartLine, CartError> {
        let position = self
            .lines
            .iter()
            .position(|line| line.catalog_entry_id == id)
            .ok_or(CartError::NotInCart)?;
        Ok(self.lines.remove(position))
    }

    /// Select the vehicle. A different vehicle starts an empty cart.
    pub fn select_vehicle(&mut self, vehicle: VehicleTag) {
        if self.vehicle.as_ref() != Some(&vehicle) {
            self.clear();
            self.vehicle = Some(vehicle);
        }
    }

    /// Empty the cart and staged quantities, cancelling every reminder.
    /// The vehicle stays selected.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.staged.clear();
        for (_, reminder) in self.reminders.drain() {
            reminder.abort();
        }
    }

    #[must_use]
    pub fn view(&self) -> CartView {
        let mut staged: Vec<StagedQuantity> = self
            .staged
            .iter()
            .map(|(id, qty)| StagedQuantity {
                catalog_entry_id: *id,
                quantity: *qty,
            })
            .collect();
        staged.sort_by_key(|s| s.catalog_entry_id);
        CartView {
            vehicle: self.vehicle.clone(),
            lines: self.lines.clone(),
            staged,
        }
    }

    fn cancel_reminder(&mut self, id: ProductId) {
        if let Some(reminder) = self.reminders.remove(&id) {
            reminder.abort();
        }
    }
}

impl Drop for CartAccumulator {
    fn drop(&mut self) {
        for reminder in self.reminders.values() {
            reminder.abort();
        }
    }
}

/// Carts of every signed-in user, expired after an hour idle.
pub struct CartRegistry {
    carts: Cache<Email, Arc<Mutex<CartAccumulator>>>,
    notices: Arc<NoticeHub>,
    delay: Duration,
}

impl CartRegistry {
    #[must_use]
    pub fn new(notices: Arc<NoticeHub>, delay: Duration) -> Self {
        let carts = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(CART_IDLE_TIMEOUT)
            .build();
        Self {
            carts,
            notices,
            delay,
        }
    }

    /// The cart for `owner`, created empty on first use.
    pub async fn cart_for(&self, owner: &Email) -> Arc<Mutex<CartAccumulator>> {
        self.carts
            .get_with(owner.clone(), async {
                Arc::new(Mutex::new(CartAccumulator::new(
                    owner.clone(),
                    Arc::clone(&self.notices),
                    self.delay,
                )))
            })
            .await
    }

    /// Forget a user's cart (sign-out).
    pub async fn remove(&self, owner: &Email) {
        self.carts.invalidate(owner).await;
    }
}
