//! User administration.
//!
//! Deletion goes through `/api/confirmations`.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use tracing::instrument;

use supply_desk_core::{UserAccount, UserAccountId, UserChanges};

use crate::error::AppError;
use crate::middleware::{Gated, RequireAdmin};
use crate::services::AccountForm;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list).post(create))
        .route("/api/admin/users/{id}", put(edit))
}

async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<UserAccount>>, AppError> {
    Ok(Json(state.users().list().await?))
}

/// Add a technician account.
#[instrument(skip(state, session, form), fields(admin = %session.email, email = %form.email))]
async fn create(
    State(state): State<AppState>,
    Gated(session, _): RequireAdmin,
    Json(form): Json<AccountForm>,
) -> Result<(StatusCode, Json<UserAccount>), AppError> {
    let account = state.users().create(&form).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn edit(
    State(state): State<AppState>,
    Gated(session, _): RequireAdmin,
    Path(id): Path<UserAccountId>,
    Json(changes): Json<UserChanges>,
) -> Result<Json<UserAccount>, AppError> {
    Ok(Json(state.users().edit(&session, id, &changes).await?))
}
