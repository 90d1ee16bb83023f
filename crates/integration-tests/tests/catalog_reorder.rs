//! Integration tests for catalog ordering.
//!
//! These run the reorder controller over the in-memory store and check the
//! rank invariants against what the store actually holds.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use supply_desk_core::{CatalogEntry, Category, ProductChanges, sort_for_display};
use supply_desk_integration_tests::product;
use supply_desk_portal::db::{Fault, MemoryStore, PortalStore, SharedStore};
use supply_desk_portal::services::{CatalogReorderController, ReorderOutcome};

const NON_SERIAL: [&str; 5] = ["cable", "clamp", "splitter", "tape", "connector"];
const SERIAL: [&str; 3] = ["modem", "router", "decoder"];

async fn seeded() -> (Arc<MemoryStore>, CatalogReorderController) {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let catalog = CatalogReorderController::new(shared);
    for name in NON_SERIAL {
        catalog
            .create(&product(name, Category::NonSerial, 10))
            .await
            .unwrap();
    }
    for name in SERIAL {
        catalog
            .create(&product(name, Category::Serial, 2))
            .await
            .unwrap();
    }
    (store, catalog)
}

fn in_category(entries: &[CatalogEntry], category: Category) -> Vec<CatalogEntry> {
    entries
        .iter()
        .filter(|e| e.category == category)
        .cloned()
        .collect()
}

fn names(entries: &[CatalogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

async fn fresh_sorted(store: &MemoryStore) -> Vec<CatalogEntry> {
    let mut entries = store.list_products().await.unwrap();
    sort_for_display(&mut entries);
    entries
}

// =============================================================================
// Rank Invariants
// =============================================================================

#[tokio::test]
async fn test_every_move_leaves_dense_ranks() {
    for from in 0..NON_SERIAL.len() {
        for to in 0..NON_SERIAL.len() {
            let (store, catalog) = seeded().await;
            let serial_before = in_category(&fresh_sorted(&store).await, Category::Serial);

            let outcome = catalog.reorder(Category::NonSerial, from, to).await.unwrap();
            let expected = if from == to {
                ReorderOutcome::Unchanged
            } else {
                ReorderOutcome::Confirmed
            };
            assert_eq!(outcome, expected, "move {from} -> {to}");

            let stored = fresh_sorted(&store).await;
            let moved = in_category(&stored, Category::NonSerial);
            for (position, entry) in moved.iter().enumerate() {
                assert_eq!(
                    usize::try_from(entry.display_order).unwrap(),
                    position,
                    "move {from} -> {to}: {} has a gap or duplicate rank",
                    entry.name
                );
            }

            let mut expected_names: Vec<&str> = NON_SERIAL.to_vec();
            let name = expected_names.remove(from);
            expected_names.insert(to, name);
            assert_eq!(names(&moved), expected_names, "move {from} -> {to}");

            assert_eq!(
                in_category(&stored, Category::Serial),
                serial_before,
                "move {from} -> {to} touched the other category"
            );
        }
    }
}

#[tokio::test]
async fn test_view_matches_store_after_confirmed_reorder() {
    let (store, catalog) = seeded().await;

    catalog.reorder(Category::Serial, 2, 0).await.unwrap();

    let snapshot = catalog.snapshot().await.unwrap();
    assert!(!snapshot.pending_confirmation);
    assert_eq!(snapshot.entries, fresh_sorted(&store).await);
    assert_eq!(
        names(&in_category(&snapshot.entries, Category::Serial)),
        vec!["decoder", "modem", "router"]
    );
}

#[tokio::test]
async fn test_out_of_range_leaves_view_untouched() {
    let (_store, catalog) = seeded().await;
    let before = catalog.snapshot().await.unwrap();

    assert!(catalog.reorder(Category::Serial, 0, 3).await.is_err());
    assert!(catalog.reorder(Category::Serial, 7, 0).await.is_err());

    assert_eq!(catalog.snapshot().await.unwrap(), before);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_failed_write_reconciles_to_store() {
    let (store, catalog) = seeded().await;
    let entries = in_category(&fresh_sorted(&store).await, Category::NonSerial);

    // Moving the first entry to the end rewrites every rank; fail the last.
    let victim = entries.last().unwrap().id;
    store.inject(Fault::SetDisplayOrder(victim));

    let outcome = catalog.reorder(Category::NonSerial, 0, 4).await.unwrap();
    assert_eq!(outcome, ReorderOutcome::Reconciled);

    let snapshot = catalog.snapshot().await.unwrap();
    assert!(!snapshot.pending_confirmation);
    assert_eq!(snapshot.entries, fresh_sorted(&store).await);
}

#[tokio::test]
async fn test_failed_refetch_keeps_view_unconfirmed() {
    let (store, catalog) = seeded().await;
    let entries = in_category(&fresh_sorted(&store).await, Category::NonSerial);

    store.inject(Fault::SetDisplayOrder(entries.first().unwrap().id));
    store.inject(Fault::ListProducts);

    let outcome = catalog.reorder(Category::NonSerial, 0, 1).await.unwrap();
    assert_eq!(outcome, ReorderOutcome::Unconfirmed);

    let snapshot = catalog.snapshot().await.unwrap();
    assert!(snapshot.pending_confirmation);
    assert_eq!(
        names(&in_category(&snapshot.entries, Category::NonSerial))[..2],
        ["clamp", "cable"]
    );

    // A manual reload clears the flag and shows the store's state.
    let reloaded = catalog.resync().await.unwrap();
    assert!(!reloaded.pending_confirmation);
    assert_eq!(reloaded.entries, fresh_sorted(&store).await);
}

// =============================================================================
// Edits and Deletes
// =============================================================================

#[tokio::test]
async fn test_category_change_appends_and_closes_gap() {
    let (store, catalog) = seeded().await;
    let clamp = in_category(&fresh_sorted(&store).await, Category::NonSerial)
        .into_iter()
        .find(|e| e.name == "clamp")
        .unwrap();

    let changes = ProductChanges {
        category: Some(Category::Serial),
        ..ProductChanges::default()
    };
    let updated = catalog.update(clamp.id, &changes).await.unwrap();
    assert_eq!(updated.display_order, 3);

    let stored = fresh_sorted(&store).await;
    let non_serial = in_category(&stored, Category::NonSerial);
    assert_eq!(names(&non_serial), vec!["cable", "splitter", "tape", "connector"]);
    for (position, entry) in non_serial.iter().enumerate() {
        assert_eq!(usize::try_from(entry.display_order).unwrap(), position);
    }
}

#[tokio::test]
async fn test_delete_closes_gap() {
    let (store, catalog) = seeded().await;
    let modem = in_category(&fresh_sorted(&store).await, Category::Serial)
        .into_iter()
        .next()
        .unwrap();

    catalog.delete(modem.id).await.unwrap();

    let serial = in_category(&fresh_sorted(&store).await, Category::Serial);
    assert_eq!(names(&serial), vec!["router", "decoder"]);
    assert_eq!(serial.iter().map(|e| e.display_order).collect::<Vec<_>>(), vec![0, 1]);
}
