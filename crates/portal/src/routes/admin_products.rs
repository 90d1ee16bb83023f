//! Product administration: the shared catalog view and drag reordering.
//!
//! Deletion goes through `/api/confirmations`.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::instrument;

use supply_desk_core::{CatalogEntry, Category, NewCatalogEntry, ProductChanges, ProductId};

use crate::error::AppError;
use crate::middleware::{Gated, RequireAdmin};
use crate::services::{CatalogSnapshot, Notice, ReorderOutcome};
use crate::state::AppState;

/// A drag within one category list, by position.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub category: Category,
    pub from: usize,
    pub to: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/products", get(list).post(create))
        .route("/api/admin/products/{id}", put(update))
        .route("/api/admin/products/reorder", post(reorder))
        .route("/api/admin/products/reload", post(reload))
}

async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<CatalogSnapshot>, AppError> {
    Ok(Json(state.catalog().snapshot().await?))
}

#[instrument(skip_all, fields(name = %input.name))]
async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(input): Json<NewCatalogEntry>,
) -> Result<(StatusCode, Json<CatalogEntry>), AppError> {
    let entry = state.catalog().create(&input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[instrument(skip_all, fields(product_id = %id))]
async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<ProductId>,
    Json(changes): Json<ProductChanges>,
) -> Result<Json<CatalogEntry>, AppError> {
    Ok(Json(state.catalog().update(id, &changes).await?))
}

/// Apply a drag. A failed write is reported in the outcome, not as an
/// error: the caller re-renders from the snapshot either way.
#[instrument(skip(state, session), fields(admin = %session.email))]
async fn reorder(
    State(state): State<AppState>,
    Gated(session, _): RequireAdmin,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state
        .catalog()
        .reorder(request.category, request.from, request.to)
        .await?;

    match outcome {
        ReorderOutcome::Reconciled => {
            state.notices().send(
                &session.email,
                Notice::error("The new order could not be saved. The list was reloaded."),
            );
        }
        ReorderOutcome::Unconfirmed => {
            state.notices().send(
                &session.email,
                Notice::error("The new order could not be saved. Reload the list."),
            );
        }
        ReorderOutcome::Unchanged | ReorderOutcome::Confirmed => {}
    }

    let snapshot = state.catalog().snapshot().await?;
    Ok(Json(serde_json::json!({
        "outcome": outcome,
        "catalog": snapshot,
    })))
}

async fn reload(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<CatalogSnapshot>, AppError> {
    Ok(Json(state.catalog().resync().await?))
}
