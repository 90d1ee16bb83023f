//! Unified error handling for the portal.
//!
//! Every service error folds into [`AppError`], which renders as a JSON
//! `{"error": message}` body. Server-side failures are reported to Sentry
//! and their details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{
    AuthError, CartError, CatalogError, ConfirmError, OrderError, UserAdminError,
};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ordering attempted outside business hours.
    #[error("Ordering is closed outside business hours")]
    OutsideBusinessHours,

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::OutsideBusinessHours => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Message safe to show to the user.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Portal request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::NoUserData => {
                Self::Unauthorized(e.to_string())
            }
            AuthError::UserAlreadyExists => Self::Conflict(e.to_string()),
            AuthError::InvalidEmail(_)
            | AuthError::WeakPassword(_)
            | AuthError::PasswordMismatch
            | AuthError::MissingField(_) => Self::Validation(e.to_string()),
            AuthError::PasswordHash => Self::Internal(e.to_string()),
            AuthError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Invalid(_) | CatalogError::IndexOutOfRange { .. } => {
                Self::Validation(e.to_string())
            }
            CatalogError::NotFound => Self::NotFound(e.to_string()),
            CatalogError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyCart
            | OrderError::MissingVehicle
            | OrderError::UnknownVehicle(_)
            | OrderError::InvalidQuantity(_) => Self::Validation(e.to_string()),
            OrderError::NotFound => Self::NotFound(e.to_string()),
            OrderError::Forbidden => Self::Forbidden(e.to_string()),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::NotInCart => Self::NotFound(e.to_string()),
            CartError::AlreadyInCart(_)
            | CartError::QuantityOutOfRange { .. }
            | CartError::Unavailable(_) => Self::Validation(e.to_string()),
        }
    }
}

impl From<UserAdminError> for AppError {
    fn from(e: UserAdminError) -> Self {
        match e {
            UserAdminError::NotFound => Self::NotFound(e.to_string()),
            UserAdminError::RoleChangeForbidden | UserAdminError::CannotDeleteSelf => {
                Self::Forbidden(e.to_string())
            }
            UserAdminError::EmailImmutable | UserAdminError::EmptyName(_) => {
                Self::Validation(e.to_string())
            }
            UserAdminError::Auth(e) => e.into(),
            UserAdminError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ConfirmError> for AppError {
    fn from(e: ConfirmError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

/// Set the Sentry user context for the signed-in user.
pub fn set_sentry_user(email: &str, role: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            email: Some(email.to_string()),
            other: [("role".to_string(), role.into())].into_iter().collect(),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
