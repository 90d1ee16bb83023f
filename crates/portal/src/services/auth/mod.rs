//! Authentication service.
//!
//! Email/password sign-in and account creation. Password hashes are
//! Argon2id PHC strings kept by the store next to (not inside) the user
//! profile, so a credential can exist without a profile and vice versa.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use tracing::instrument;

use supply_desk_core::{Email, NewUserAccount, Role, Session, UserAccount};

use crate::db::{PortalStore, RepositoryError};

/// Minimum password length for accounts created by an administrator.
const MIN_ADMIN_PASSWORD_LENGTH: usize = 6;

/// Minimum password length for self-registration.
const MIN_REGISTER_PASSWORD_LENGTH: usize = 8;

/// Symbols a self-registered password must contain one of.
const REGISTER_SYMBOLS: &str = "@$!%*?&.";

/// Which password rules apply to a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    /// At least six characters of anything.
    Standard,
    /// At least eight characters mixing upper case, lower case, a digit and
    /// one of `@$!%*?&.`; nothing else is allowed.
    Strict,
}

impl PasswordPolicy {
    /// Check a password against the policy.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` describing the first rule broken.
    pub fn check(self, password: &str) -> Result<(), AuthError> {
        match self {
            Self::Standard => {
                if password.chars().count() < MIN_ADMIN_PASSWORD_LENGTH {
                    return Err(AuthError::WeakPassword(format!(
                        "password must be at least {MIN_ADMIN_PASSWORD_LENGTH} characters"
                    )));
                }
                Ok(())
            }
            Self::Strict => {
                let weak = |msg: &str| -> Result<(), AuthError> {
                    Err(AuthError::WeakPassword(msg.to_owned()))
                };
                if password.chars().count() < MIN_REGISTER_PASSWORD_LENGTH {
                    return Err(AuthError::WeakPassword(format!(
                        "password must be at least {MIN_REGISTER_PASSWORD_LENGTH} characters"
                    )));
                }
                if password
                    .chars()
                    .any(|c| !c.is_ascii_alphanumeric() && !REGISTER_SYMBOLS.contains(c))
                {
                    return weak("password may only contain letters, digits and @$!%*?&.");
                }
                if !password.chars().any(|c| c.is_ascii_uppercase()) {
                    return weak("password needs an upper-case letter");
                }
                if !password.chars().any(|c| c.is_ascii_lowercase()) {
                    return weak("password needs a lower-case letter");
                }
                if !password.chars().any(|c| c.is_ascii_digit()) {
                    return weak("password needs a digit");
                }
                if !password.chars().any(|c| REGISTER_SYMBOLS.contains(c)) {
                    return weak("password needs one of @$!%*?&.");
                }
                Ok(())
            }
        }
    }
}

/// Account creation form, shared by the admin "add user" view and
/// self-registration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountForm {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl std::fmt::Debug for AccountForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountForm")
            .field("given_name", &self.given_name)
            .field("family_name", &self.family_name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("confirm_password", &"[REDACTED]")
            .finish()
    }
}

impl AccountForm {
    fn require_fields(&self) -> Result<(), AuthError> {
        for (value, field) in [
            (&self.given_name, "given name"),
            (&self.family_name, "family name"),
            (&self.email, "email"),
            (&self.password, "password"),
            (&self.confirm_password, "password confirmation"),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Authentication service.
///
/// Handles sign-in, administrator-created accounts and self-registration.
pub struct AuthService<'a> {
    store: &'a dyn PortalStore,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a dyn PortalStore) -> Self {
        Self { store }
    }

    /// Sign in with email and password.
    ///
    /// Returns the session to cache for the user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed email,
    /// `AuthError::InvalidCredentials` for an unknown email or wrong password,
    /// and `AuthError::NoUserData` if the credential has no profile.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = Email::parse(email)?;

        let hash = self
            .store
            .password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &hash)?;

        let account = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::NoUserData)?;

        tracing::info!(email = %email, role = %account.role, "User signed in");
        Ok(Session::from(&account))
    }

    /// Create a technician account on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// Returns validation errors for missing fields, mismatched or short
    /// passwords, and `AuthError::UserAlreadyExists` for a used email.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn create_account(&self, form: &AccountForm) -> Result<UserAccount, AuthError> {
        self.create(form, PasswordPolicy::Standard, Role::Tecnico)
            .await
    }

    /// Self-register a technician account.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_account`], with the strict password policy.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: &AccountForm) -> Result<UserAccount, AuthError> {
        self.create(form, PasswordPolicy::Strict, Role::Tecnico)
            .await
    }

    /// Create an account with an explicit role. Used for bootstrapping
    /// administrators from the command line.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_account`].
    pub async fn provision(&self, form: &AccountForm, role: Role) -> Result<UserAccount, AuthError> {
        self.create(form, PasswordPolicy::Standard, role).await
    }

    async fn create(
        &self,
        form: &AccountForm,
        policy: PasswordPolicy,
        role: Role,
    ) -> Result<UserAccount, AuthError> {
        form.require_fields()?;
        let email = Email::parse(&form.email)?;
        if form.password != form.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        policy.check(&form.password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let hash = hash_password(&form.password)?;
        self.store
            .store_credential(&email, &hash)
            .await
            .map_err(map_conflict)?;

        let input = NewUserAccount {
            given_name: form.given_name.trim().to_owned(),
            family_name: form.family_name.trim().to_owned(),
            email: email.clone(),
            role,
        };
        let account = match self.store.create_user(&input).await {
            Ok(account) => account,
            Err(e) => {
                // Leave no orphaned credential behind.
                if let Err(cleanup) = self.store.delete_credential(&email).await {
                    tracing::warn!(error = %cleanup, email = %email, "Failed to remove credential");
                }
                return Err(map_conflict(e));
            }
        };

        tracing::info!(email = %email, role = %role, "Account created");
        Ok(account)
    }
}

fn map_conflict(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
        other => AuthError::Repository(other),
    }
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}
