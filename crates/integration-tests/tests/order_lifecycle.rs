//! Integration tests for the order lifecycle.
//!
//! Submission, completion into history, cancellation and the history
//! visibility rules, over the in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use supply_desk_core::{CartLine, Email, OrderStatus, ProductId, Role, Session, VehicleTag};
use supply_desk_integration_tests::open_clock;
use supply_desk_portal::db::{
    Fault, FeedState, HistoryFilter, MemoryStore, PortalStore, SharedStore,
};
use supply_desk_portal::services::{OrderError, OrderLifecycleManager, group_by_requester};

fn session(given: &str, family: &str, role: Role) -> Session {
    Session {
        email: Email::parse(&format!("{}@flota.com", given.to_lowercase())).unwrap(),
        given_name: given.into(),
        family_name: family.into(),
        role,
    }
}

fn line(id: i32, name: &str, quantity: i32) -> CartLine {
    CartLine {
        catalog_entry_id: ProductId::new(id),
        name: name.into(),
        quantity,
    }
}

fn setup() -> (Arc<MemoryStore>, OrderLifecycleManager) {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let vehicles = vec![VehicleTag::parse("VP").unwrap(), VehicleTag::parse("XT").unwrap()];
    (store, OrderLifecycleManager::new(shared, open_clock(), vehicles))
}

fn vp() -> VehicleTag {
    VehicleTag::parse("VP").unwrap()
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_records_requester_and_lines() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);

    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3), line(2, "clamp", 1)])
        .await
        .unwrap();

    assert_eq!(order.requester, luis.requester());
    assert_eq!(order.vehicle_tag, vp());
    assert_eq!(order.total_units(), 4);
    assert_eq!(store.list_pending_orders().await.unwrap(), vec![order]);
}

#[tokio::test]
async fn test_submit_rejects_bad_carts_without_writing() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let lines = [line(1, "cable", 3)];

    assert!(matches!(
        orders.submit(&luis, Some(&vp()), &[]).await,
        Err(OrderError::EmptyCart)
    ));
    assert!(matches!(
        orders.submit(&luis, None, &lines).await,
        Err(OrderError::MissingVehicle)
    ));
    let unknown = VehicleTag::parse("ZZ").unwrap();
    assert!(matches!(
        orders.submit(&luis, Some(&unknown), &lines).await,
        Err(OrderError::UnknownVehicle(_))
    ));
    assert!(matches!(
        orders.submit(&luis, Some(&vp()), &[line(1, "cable", 0)]).await,
        Err(OrderError::InvalidQuantity(_))
    ));

    assert!(store.list_pending_orders().await.unwrap().is_empty());
}

// =============================================================================
// Completion and Cancellation
// =============================================================================

#[tokio::test]
async fn test_complete_moves_order_into_history() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3)])
        .await
        .unwrap();

    let record = orders.complete(order.id).await.unwrap();

    assert_eq!(record.source_order_id(), order.id);
    assert_eq!(record.order.status, OrderStatus::Completed);
    assert_eq!(record.order.lines, order.lines);
    assert_eq!(record.order.requester, order.requester);
    assert!(store.list_pending_orders().await.unwrap().is_empty());
    assert_eq!(
        store.list_history(&HistoryFilter::All).await.unwrap(),
        vec![record]
    );
}

#[tokio::test]
async fn test_concurrent_completion_archives_once() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3)])
        .await
        .unwrap();

    let (first, second) = tokio::join!(orders.complete(order.id), orders.complete(order.id));

    // One of them may find the order already gone; neither duplicates it.
    assert!(first.is_ok() || second.is_ok());
    assert_eq!(store.list_history(&HistoryFilter::All).await.unwrap().len(), 1);
    assert!(store.list_pending_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_retry_after_failed_delete() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3)])
        .await
        .unwrap();

    store.inject(Fault::DeleteOrder);
    assert!(orders.complete(order.id).await.is_err());
    // Archived but still pending.
    assert_eq!(store.list_pending_orders().await.unwrap().len(), 1);

    let record = orders.complete(order.id).await.unwrap();
    assert_eq!(record.source_order_id(), order.id);
    assert_eq!(store.list_history(&HistoryFilter::All).await.unwrap().len(), 1);
    assert!(store.list_pending_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_archive_keeps_order_pending() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3)])
        .await
        .unwrap();

    store.inject(Fault::ArchiveOrder);
    assert!(orders.complete(order.id).await.is_err());

    assert_eq!(store.list_pending_orders().await.unwrap(), vec![order]);
    assert!(store.list_history(&HistoryFilter::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_leaves_no_history() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 3)])
        .await
        .unwrap();

    orders.cancel(order.id).await.unwrap();

    assert!(store.list_pending_orders().await.unwrap().is_empty());
    assert!(store.list_history(&HistoryFilter::All).await.unwrap().is_empty());
    assert!(matches!(
        orders.cancel(order.id).await,
        Err(OrderError::NotFound)
    ));
}

// =============================================================================
// History Visibility
// =============================================================================

#[tokio::test]
async fn test_history_visibility_by_requester_names() {
    let (_store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let luis_other = session("Luis", "Perez", Role::Tecnico);
    let admin = session("Ana", "Paz", Role::Admin);

    for requester in [&luis, &luis_other, &admin] {
        let order = orders
            .submit(requester, Some(&vp()), &[line(1, "cable", 1)])
            .await
            .unwrap();
        orders.complete(order.id).await.unwrap();
    }

    let mine = orders.history_for(&luis).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order.requester, luis.requester());

    let all = orders.history_for(&admin).await.unwrap();
    assert_eq!(all.len(), 3);

    let grouped = group_by_requester(all);
    assert_eq!(
        grouped.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Ana Paz", "Luis Gomez", "Luis Perez"]
    );
}

#[tokio::test]
async fn test_only_admin_deletes_history() {
    let (store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);
    let admin = session("Ana", "Paz", Role::Admin);
    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 1)])
        .await
        .unwrap();
    let record = orders.complete(order.id).await.unwrap();

    assert!(matches!(
        orders.delete_history(&luis, record.id).await,
        Err(OrderError::Forbidden)
    ));
    orders.delete_history(&admin, record.id).await.unwrap();
    assert!(store.list_history(&HistoryFilter::All).await.unwrap().is_empty());
}

// =============================================================================
// Live Feeds
// =============================================================================

#[tokio::test]
async fn test_pending_feed_follows_writes() {
    let (_store, orders) = setup();
    let luis = session("Luis", "Gomez", Role::Tecnico);

    let mut feed = orders.subscribe_pending();
    assert_eq!(feed.settled().await, Some(FeedState::Ready(vec![])));

    let order = orders
        .submit(&luis, Some(&vp()), &[line(1, "cable", 2)])
        .await
        .unwrap();
    assert_eq!(feed.next().await, Some(FeedState::Ready(vec![order.clone()])));

    orders.complete(order.id).await.unwrap();
    // Completion writes history then deletes the order; wait for the empty list.
    loop {
        match feed.next().await {
            Some(FeedState::Ready(pending)) if pending.is_empty() => break,
            Some(_) => {}
            None => panic!("feed stopped"),
        }
    }
}
