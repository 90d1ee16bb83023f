//! Session cache and access-gate extractors.
//!
//! The signed-in user's [`Session`] is cached in the tower session under one
//! key. Only sign-in writes it and only sign-out clears it; everything else
//! reads it through [`SessionCache`].
//!
//! The gate extractors deny with the same response whether the user is not
//! signed in or signed in with the wrong role: a `303` redirect to `/login`
//! for pages, `401` with `Location: /login` for `/api/*`.

use std::marker::PhantomData;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use supply_desk_core::{RoleSet, Session};

use crate::services::{AccessGate, ConfirmationGate, GateState};

/// Session keys.
pub mod session_keys {
    /// The cached signed-in user.
    pub const CURRENT_USER: &str = "current_user";
    /// The confirmation slot for destructive actions.
    pub const CONFIRMATION: &str = "confirmation";
}

/// Read/store/clear access to the cached session.
#[derive(Clone)]
pub struct SessionCache {
    inner: tower_sessions::Session,
}

impl SessionCache {
    #[must_use]
    pub const fn new(inner: tower_sessions::Session) -> Self {
        Self { inner }
    }

    /// The cached session, if any. A session that cannot be read counts as
    /// no session.
    pub async fn read(&self) -> Option<Session> {
        match self.inner.get::<Session>(session_keys::CURRENT_USER).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cached session");
                None
            }
        }
    }

    /// Cache `session` under a fresh session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn store(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        self.inner.cycle_id().await?;
        self.inner.insert(session_keys::CURRENT_USER, session).await
    }

    /// Destroy the cached session and everything else in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn clear(&self) -> Result<(), tower_sessions::session::Error> {
        self.inner.flush().await
    }

    /// The confirmation slot, empty if none was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn confirmation(&self) -> Result<ConfirmationGate, tower_sessions::session::Error> {
        Ok(self
            .inner
            .get::<ConfirmationGate>(session_keys::CONFIRMATION)
            .await?
            .unwrap_or_default())
    }

    /// Persist the confirmation slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn save_confirmation(
        &self,
        gate: &ConfirmationGate,
    ) -> Result<(), tower_sessions::session::Error> {
        self.inner.insert(session_keys::CONFIRMATION, gate).await
    }
}

impl<S> FromRequestParts<S> for SessionCache
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<tower_sessions::Session>()
            .cloned()
            .map(Self::new)
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session layer is not configured",
            ))
    }
}

/// Response for a denied gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Redirect to the login page (for page requests).
    RedirectToLogin,
    /// Unauthorized response pointing at the login page (for API requests).
    Unauthorized,
}

impl GateRejection {
    fn for_path(path: &str) -> Self {
        if path.starts_with("/api/") {
            Self::Unauthorized
        } else {
            Self::RedirectToLogin
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::LOCATION, "/login")],
                Json(json!({ "error": "Sign in to continue" })),
            )
                .into_response(),
        }
    }
}

/// A role set a gate admits.
pub trait Allowed {
    const ROLES: RoleSet;
}

/// Any signed-in user.
pub struct AnyUser;

impl Allowed for AnyUser {
    const ROLES: RoleSet = RoleSet::ANY_USER;
}

/// Administrators only.
pub struct AdminOnly;

impl Allowed for AdminOnly {
    const ROLES: RoleSet = RoleSet::ADMIN;
}

/// Extractor that admits a cached session whose role is in `A::ROLES`.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Gated(session, _): RequireAdmin) -> impl IntoResponse {
///     format!("Hello, {}!", session.given_name)
/// }
/// ```
pub struct Gated<A: Allowed>(pub Session, pub PhantomData<A>);

/// Admin or technician.
pub type RequireUser = Gated<AnyUser>;

/// Administrator.
pub type RequireAdmin = Gated<AdminOnly>;

impl<A: Allowed> Gated<A> {
    /// The admitted session.
    #[must_use]
    pub fn into_session(self) -> Session {
        self.0
    }
}

impl<S, A> FromRequestParts<S> for Gated<A>
where
    S: Send + Sync,
    A: Allowed,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let rejection = GateRejection::for_path(parts.uri.path());
        let cache = SessionCache::from_request_parts(parts, state)
            .await
            .map_err(|_| rejection)?;
        let session = cache.read().await;

        let mut gate = AccessGate::new(A::ROLES);
        match (gate.evaluate(session.as_ref()), session) {
            (GateState::Granted, Some(session)) => Ok(Self(session, PhantomData)),
            _ => Err(rejection),
        }
    }
}

/// Extractor that optionally gets the cached session.
pub struct OptionalUser(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = match parts.extensions.get::<tower_sessions::Session>() {
            Some(inner) => SessionCache::new(inner.clone()).read().await,
            None => None,
        };
        Ok(Self(session))
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_depends_on_path() {
        assert_eq!(
            GateRejection::for_path("/api/cart"),
            GateRejection::Unauthorized
        );
        assert_eq!(
            GateRejection::for_path("/admin/products"),
            GateRejection::RedirectToLogin
        );
    }

    #[test]
    fn test_rejection_responses() {
        let page = GateRejection::RedirectToLogin.into_response();
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(page.headers()[header::LOCATION], "/login");

        let api = GateRejection::Unauthorized.into_response();
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(api.headers()[header::LOCATION], "/login");
    }
}
