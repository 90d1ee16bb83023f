//! Sign-in, registration and sign-out.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use supply_desk_core::{Session, UserAccount};

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{Gated, RequireUser, SessionCache};
use crate::services::{AccountForm, Notice, menu_for};
use crate::state::AppState;

/// Sign-in request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/logout", post(logout))
        .route("/api/session", get(current_session))
        .route("/api/menu", get(menu))
}

/// Sign in and cache the session.
#[instrument(skip(state, cache, request), fields(email = %request.email))]
async fn login(
    State(state): State<AppState>,
    cache: SessionCache,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .auth()
        .sign_in(&request.email, &request.password)
        .await?;
    cache.store(&session).await?;

    set_sentry_user(session.email.as_str(), session.role.as_str());
    state.notices().send(
        &session.email,
        Notice::success(format!("Welcome, {}", session.given_name)),
    );

    Ok(Json(session))
}

/// Self-registration. The new account is a technician and is not signed in.
#[instrument(skip(state, form), fields(email = %form.email))]
async fn register(
    State(state): State<AppState>,
    Json(form): Json<AccountForm>,
) -> Result<(StatusCode, Json<UserAccount>), AppError> {
    let account = state.auth().register(&form).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// Sign out: clear the cached session and drop the cart.
async fn logout(State(state): State<AppState>, cache: SessionCache) -> Result<StatusCode, AppError> {
    if let Some(session) = cache.read().await {
        state.carts().remove(&session.email).await;
        tracing::info!(email = %session.email, "User signed out");
    }
    cache.clear().await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(Gated(session, _): RequireUser) -> Json<Session> {
    Json(session)
}

async fn menu(Gated(session, _): RequireUser) -> impl IntoResponse {
    Json(json!({ "items": menu_for(session.role) }))
}
