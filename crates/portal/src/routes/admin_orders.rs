//! Pending order administration.
//!
//! Cancelling goes through `/api/confirmations`.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::Stream;
use tracing::instrument;

use supply_desk_core::{HistoricalOrder, Order, OrderId};

use crate::error::AppError;
use crate::middleware::{Gated, RequireAdmin};
use crate::services::Notice;
use crate::state::AppState;

use super::feed_sse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/orders", get(list))
        .route("/api/admin/orders/stream", get(stream))
        .route("/api/admin/orders/{id}/complete", post(complete))
}

/// Oldest first.
async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders().pending().await?))
}

async fn stream(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    feed_sse(state.orders().subscribe_pending())
}

#[instrument(skip(state, session), fields(admin = %session.email))]
async fn complete(
    State(state): State<AppState>,
    Gated(session, _): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<HistoricalOrder>, AppError> {
    let record = state.orders().complete(id).await?;
    state
        .notices()
        .send(&session.email, Notice::success(format!("Order {id} completed")));
    Ok(Json(record))
}
