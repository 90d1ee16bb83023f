//! Catalog reorder controller.
//!
//! Holds the shared, display-sorted catalog view used by the product admin
//! page. Reordering is optimistic: the view is spliced first, then one rank
//! write per moved entry is issued concurrently. If any write fails, the
//! whole view is replaced by a fresh fetch of the store (last writer wins;
//! writes that already landed are not rolled back).
//!
//! The view also follows the store's change feed: any product write, from
//! this process or another, marks it stale and the next read refetches. A
//! stale view is not refetched while a reorder batch is unconfirmed.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use supply_desk_core::{
    CatalogEntry, CatalogInputError, Category, NewCatalogEntry, ProductChanges, ProductId,
    next_display_order, sort_for_display,
};

use crate::db::{Collection, RepositoryError, SharedStore};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] CatalogInputError),

    #[error("position {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("product not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// How a reorder ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReorderOutcome {
    /// Source and destination were the same; nothing was written.
    Unchanged,
    /// Every rank write succeeded.
    Confirmed,
    /// A write failed and the view was replaced by the store's state.
    Reconciled,
    /// A write failed and so did the refetch; the optimistic view is kept
    /// and stays marked unconfirmed.
    Unconfirmed,
}

/// A copy of the view handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub entries: Vec<CatalogEntry>,
    /// True while a reorder batch has been applied locally but not yet
    /// confirmed or reconciled.
    pub pending_confirmation: bool,
}

#[derive(Debug, Default)]
struct CatalogView {
    entries: Vec<CatalogEntry>,
    loaded: bool,
    stale: bool,
    pending_batch: Option<u64>,
}

impl CatalogView {
    fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            entries: self.entries.clone(),
            pending_confirmation: self.pending_batch.is_some(),
        }
    }
}

/// Shared catalog view plus the operations that keep it in step with the
/// store.
pub struct CatalogReorderController {
    store: SharedStore,
    view: RwLock<CatalogView>,
    changes: Mutex<broadcast::Receiver<Collection>>,
    next_batch: AtomicU64,
}

impl CatalogReorderController {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        let changes = Mutex::new(store.changes());
        Self {
            store,
            view: RwLock::new(CatalogView::default()),
            changes,
            next_batch: AtomicU64::new(1),
        }
    }

    /// The current view, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the first load fails.
    pub async fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        self.ensure_loaded().await?;
        Ok(self.view.read().await.snapshot())
    }

    /// Entries technicians can order, in display order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the first load fails.
    pub async fn available(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.ensure_loaded().await?;
        Ok(self
            .view
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.is_available())
            .cloned()
            .collect())
    }

    /// Look up an entry in the view.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown id.
    pub async fn entry(&self, id: ProductId) -> Result<CatalogEntry, CatalogError> {
        self.ensure_loaded().await?;
        self.view
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }

    /// Replace the view with a fresh, sorted fetch of the store.
    ///
    /// Clears the pending-confirmation flag.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the fetch fails; the view is
    /// left as it was.
    pub async fn resync(&self) -> Result<CatalogSnapshot, CatalogError> {
        // Anything announced before the fetch is covered by it.
        self.products_changed().await;
        let mut entries = self.store.list_products().await?;
        sort_for_display(&mut entries);

        let mut view = self.view.write().await;
        view.entries = entries;
        view.loaded = true;
        view.stale = false;
        view.pending_batch = None;
        Ok(view.snapshot())
    }

    async fn ensure_loaded(&self) -> Result<(), CatalogError> {
        let changed = self.products_changed().await;
        {
            let mut view = self.view.write().await;
            view.stale |= changed;
            if view.loaded && (!view.stale || view.pending_batch.is_some()) {
                return Ok(());
            }
        }
        tracing::debug!("Catalog view stale, refetching");
        self.resync().await.map(|_| ())
    }

    /// Drain the change feed. True if products were written since the last
    /// drain, or if the feed lagged.
    async fn products_changed(&self) -> bool {
        let mut changes = self.changes.lock().await;
        let mut changed = false;
        loop {
            match changes.try_recv() {
                Ok(Collection::Products) | Err(TryRecvError::Lagged(_)) => changed = true,
                Ok(_) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return changed,
            }
        }
    }

    /// Move the entry at `from` to `to` within `category`.
    ///
    /// The view is updated before any write is issued. Every entry of the
    /// category whose rank changed gets one write; all writes run
    /// concurrently and are awaited together.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::IndexOutOfRange` for a bad position (the view
    /// is untouched). Write failures are not errors: they are reported
    /// through [`ReorderOutcome`].
    #[instrument(skip(self))]
    pub async fn reorder(
        &self,
        category: Category,
        from: usize,
        to: usize,
    ) -> Result<ReorderOutcome, CatalogError> {
        self.ensure_loaded().await?;

        let (batch, writes) = {
            let mut view = self.view.write().await;
            let (mut moving, others): (Vec<CatalogEntry>, Vec<CatalogEntry>) = view
                .entries
                .drain(..)
                .partition(|e| e.category == category);

            let len = moving.len();
            let bad_index = [from, to].into_iter().find(|index| *index >= len);
            if let Some(index) = bad_index {
                // Put the view back exactly as it was.
                moving.extend(others);
                sort_for_display(&mut moving);
                view.entries = moving;
                return Err(CatalogError::IndexOutOfRange { index, len });
            }
            if from == to {
                moving.extend(others);
                sort_for_display(&mut moving);
                view.entries = moving;
                return Ok(ReorderOutcome::Unchanged);
            }

            let moved = moving.remove(from);
            moving.insert(to, moved);

            let mut writes = Vec::new();
            for (entry, position) in moving.iter_mut().zip(0_i32..) {
                if entry.display_order != position {
                    entry.display_order = position;
                    writes.push((entry.id, position));
                }
            }

            let (mut serial, mut non_serial) = (Vec::new(), Vec::new());
            for entry in moving.into_iter().chain(others) {
                match entry.category {
                    Category::Serial => serial.push(entry),
                    Category::NonSerial => non_serial.push(entry),
                }
            }
            serial.append(&mut non_serial);
            view.entries = serial;

            let batch = self.next_batch.fetch_add(1, Ordering::Relaxed);
            view.pending_batch = Some(batch);
            (batch, writes)
        };

        tracing::debug!(batch, writes = writes.len(), "Persisting new ranks");
        let results = join_all(
            writes
                .iter()
                .map(|(id, position)| self.store.set_display_order(*id, *position)),
        )
        .await;

        let failures: Vec<_> = writes
            .iter()
            .zip(results)
            .filter_map(|((id, _), result)| result.err().map(|e| (*id, e)))
            .collect();

        if failures.is_empty() {
            let mut view = self.view.write().await;
            if view.pending_batch == Some(batch) {
                view.pending_batch = None;
            }
            return Ok(ReorderOutcome::Confirmed);
        }

        for (id, error) in &failures {
            tracing::error!(batch, product_id = %id, error = %error, "Rank write failed");
        }
        match self.resync().await {
            Ok(_) => {
                tracing::warn!(batch, "Catalog reconciled from store after failed reorder");
                Ok(ReorderOutcome::Reconciled)
            }
            Err(e) => {
                tracing::error!(batch, error = %e, "Reconciliation fetch failed, view unconfirmed");
                Ok(ReorderOutcome::Unconfirmed)
            }
        }
    }

    /// Create a product at the end of its category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for bad input.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: &NewCatalogEntry) -> Result<CatalogEntry, CatalogError> {
        input.validate()?;
        let current = self.store.list_products().await?;
        let display_order = next_display_order(&current, input.category);

        let entry = self.store.create_product(input, display_order).await?;
        tracing::info!(product_id = %entry.id, display_order, "Product created");
        self.refresh_after_write().await;
        Ok(entry)
    }

    /// Edit a product. Moving it to the other category appends it there and
    /// closes the gap it left behind.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown id and
    /// `CatalogError::Invalid` if the edited entry is invalid.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<CatalogEntry, CatalogError> {
        let current = self
            .store
            .get_product(id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        let mut merged = changes.apply_to(&current)?;

        let moved_from = (merged.category != current.category).then_some(current.category);
        if moved_from.is_some() {
            let all = self.store.list_products().await?;
            merged.display_order = next_display_order(&all, merged.category);
        }

        let updated = self.store.update_product(&merged).await.map_err(not_found)?;
        if let Some(old) = moved_from {
            self.compact(old).await?;
        }
        tracing::info!(product_id = %id, "Product updated");
        self.refresh_after_write().await;
        Ok(updated)
    }

    /// Delete a product and close the gap in its category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<(), CatalogError> {
        let entry = self
            .store
            .get_product(id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        self.store.delete_product(id).await.map_err(not_found)?;
        self.compact(entry.category).await?;
        tracing::info!(product_id = %id, name = %entry.name, "Product deleted");
        self.refresh_after_write().await;
        Ok(())
    }

    /// Renumber `category` to `0..n` in its current order.
    async fn compact(&self, category: Category) -> Result<(), CatalogError> {
        let mut entries: Vec<CatalogEntry> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|e| e.category == category)
            .collect();
        sort_for_display(&mut entries);

        let writes: Vec<(ProductId, i32)> = entries
            .iter()
            .zip(0..)
            .filter(|(entry, position)| entry.display_order != *position)
            .map(|(entry, position)| (entry.id, position))
            .collect();
        for result in join_all(
            writes
                .iter()
                .map(|(id, position)| self.store.set_display_order(*id, *position)),
        )
        .await
        {
            result?;
        }
        Ok(())
    }

    async fn refresh_after_write(&self) {
        if let Err(e) = self.resync().await {
            tracing::warn!(error = %e, "Catalog view refresh failed");
        }
    }
}

fn not_found(e: RepositoryError) -> CatalogError {
    match e {
        RepositoryError::NotFound => CatalogError::NotFound,
        other => CatalogError::Repository(other),
    }
}
