//! Order history, scoped to what the signed-in user may see.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;

use supply_desk_core::HistoricalOrder;

use crate::error::AppError;
use crate::middleware::{Gated, RequireUser};
use crate::services::group_by_requester;
use crate::state::AppState;

use super::feed_sse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(list))
        .route("/api/history/grouped", get(grouped))
        .route("/api/history/stream", get(stream))
}

/// Newest first.
async fn list(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
) -> Result<Json<Vec<HistoricalOrder>>, AppError> {
    Ok(Json(state.orders().history_for(&session).await?))
}

/// Keyed by requester display name.
async fn grouped(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
) -> Result<Json<BTreeMap<String, Vec<HistoricalOrder>>>, AppError> {
    let records = state.orders().history_for(&session).await?;
    Ok(Json(group_by_requester(records)))
}

async fn stream(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    feed_sse(state.orders().subscribe_history(&session))
}
