//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication and account creation.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] supply_desk_core::EmailError),

    /// Unknown email or wrong password. The two are not distinguished.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The credential is valid but no profile exists for it.
    #[error("no user data found for this account")]
    NoUserData,

    /// Email already has an account.
    #[error("an account with this email already exists")]
    UserAlreadyExists,

    /// Password does not meet the policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// A required form field is empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Password hashing failed.
    #[error("password hashing failed")]
    PasswordHash,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
