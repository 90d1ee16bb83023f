//! Live query subscriptions over the store's change feed.
//!
//! A [`Subscription`] runs a background task that refetches a query whenever
//! one of its collections changes and publishes the result into a
//! `tokio::sync::watch` channel. Readers always see the latest snapshot;
//! intermediate snapshots a slow reader never looked at are dropped. Dropping
//! the subscription aborts the task.

use std::future::Future;

use futures::Stream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::{Collection, RepositoryError, SharedStore};

/// Latest state of a live query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState<T> {
    /// The first fetch has not finished yet.
    Loading,
    /// The most recent successful fetch.
    Ready(T),
    /// The most recent fetch failed; the message is safe to show.
    Failed(String),
}

/// A live query. Keeps firing until dropped.
pub struct Subscription<T> {
    rx: watch::Receiver<FeedState<T>>,
    task: JoinHandle<()>,
}

/// Start a live query.
///
/// The change feed is joined before the first fetch so no write between the
/// two can be missed.
pub fn subscribe<T, F, Fut>(
    store: SharedStore,
    collections: &[Collection],
    fetch: F,
) -> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(SharedStore) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RepositoryError>> + Send + 'static,
{
    let (tx, rx) = watch::channel(FeedState::Loading);
    let watched = collections.to_vec();
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        loop {
            let state = match fetch(store.clone()).await {
                Ok(value) => FeedState::Ready(value),
                Err(e) => {
                    tracing::error!(error = %e, "Live query fetch failed");
                    FeedState::Failed("could not load the latest data".to_owned())
                }
            };
            if tx.send(state).is_err() {
                break;
            }

            // Wait for a relevant write; a lagged receiver refetches anyway.
            loop {
                match changes.recv().await {
                    Ok(collection) if watched.contains(&collection) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Change feed lagged, refetching");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    });

    Subscription { rx, task }
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> FeedState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot and return it.
    ///
    /// Returns `None` once the background task has stopped.
    pub async fn next(&mut self) -> Option<FeedState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the first fetch has finished.
    pub async fn settled(&mut self) -> Option<FeedState<T>> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if !matches!(state, FeedState::Loading) {
                return Some(state);
            }
            self.rx.changed().await.ok()?;
        }
    }

    /// Turn the subscription into a stream of settled snapshots.
    ///
    /// The stream owns the subscription: dropping the stream stops the
    /// background task.
    pub fn into_stream(self) -> impl Stream<Item = FeedState<T>> + Send {
        let mut sub = self;
        async_stream::stream! {
            while let Some(state) = sub.settled().await {
                yield state;
                if sub.rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
