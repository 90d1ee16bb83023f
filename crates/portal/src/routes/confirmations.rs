//! Two-step execution of destructive actions.
//!
//! `POST /api/confirmations` records the target in the session and returns
//! a token with the prompt; `POST /api/confirmations/confirm` with that token
//! executes it. Roles are checked on both steps.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use supply_desk_core::Session;

use crate::error::AppError;
use crate::middleware::{Gated, RequireUser, SessionCache};
use crate::services::{ConfirmTarget, Notice, permits};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub target: ConfirmTarget,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationPrompt {
    pub target: ConfirmTarget,
    pub token: Uuid,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub token: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/confirmations", post(request))
        .route("/api/confirmations/confirm", post(confirm))
        .route("/api/confirmations/cancel", post(cancel))
}

fn require_roles(session: &Session) -> Result<(), AppError> {
    if permits(ConfirmTarget::REQUIRED_ROLES, Some(session)) {
        Ok(())
    } else {
        Err(AppError::Forbidden("not allowed".to_string()))
    }
}

async fn request(
    Gated(session, _): RequireUser,
    cache: SessionCache,
    Json(body): Json<ConfirmationRequest>,
) -> Result<Json<ConfirmationPrompt>, AppError> {
    require_roles(&session)?;

    let mut gate = cache.confirmation().await?;
    let pending = gate.request(body.target);
    cache.save_confirmation(&gate).await?;

    Ok(Json(ConfirmationPrompt {
        target: pending.target,
        token: pending.token,
        prompt: pending.target.prompt(),
    }))
}

#[instrument(skip(state, session, cache, body), fields(actor = %session.email))]
async fn confirm(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
    cache: SessionCache,
    Json(body): Json<ConfirmRequest>,
) -> Result<StatusCode, AppError> {
    let mut gate = cache.confirmation().await?;
    let taken = gate.confirm(body.token);
    cache.save_confirmation(&gate).await?;
    let target = taken?;

    require_roles(&session)?;
    execute(&state, &session, target).await?;

    tracing::info!(?target, "Confirmed action executed");
    state
        .notices()
        .send(&session.email, Notice::success(done_message(target)));
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel(_user: RequireUser, cache: SessionCache) -> Result<StatusCode, AppError> {
    let mut gate = cache.confirmation().await?;
    if gate.cancel().is_some() {
        cache.save_confirmation(&gate).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn execute(state: &AppState, session: &Session, target: ConfirmTarget) -> Result<(), AppError> {
    match target {
        ConfirmTarget::Product(id) => state.catalog().delete(id).await?,
        ConfirmTarget::User(id) => state.users().delete(session, id).await?,
        ConfirmTarget::Order(id) => state.orders().cancel(id).await?,
        ConfirmTarget::History(id) => state.orders().delete_history(session, id).await?,
    }
    Ok(())
}

fn done_message(target: ConfirmTarget) -> String {
    match target {
        ConfirmTarget::Product(id) => format!("Product {id} deleted"),
        ConfirmTarget::User(id) => format!("User {id} deleted"),
        ConfirmTarget::Order(id) => format!("Order {id} cancelled"),
        ConfirmTarget::History(id) => format!("History record {id} deleted"),
    }
}
