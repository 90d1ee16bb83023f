//! User bootstrap command.
//!
//! The portal only creates technician accounts; the first administrator has
//! to come from here.
//!
//! # Usage
//!
//! ```bash
//! SD_PASSWORD='...' sd-cli user create -e ana@flota.com -g Ana -f Paz -r Admin
//! ```
//!
//! # Environment Variables
//!
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string for the portal
//! - the variable named by `--password-env` (default `SD_PASSWORD`)

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use supply_desk_core::{Role, UserAccountId};
use supply_desk_portal::db::PgStore;
use supply_desk_portal::services::{AccountForm, AuthService};

use super::{CommandError, connect};

/// Create a user with the given role.
///
/// The password is read from the environment variable `password_env` so it
/// never shows up in shell history.
pub async fn create(
    email: &str,
    given_name: &str,
    family_name: &str,
    role: &str,
    password_env: &str,
) -> Result<UserAccountId, CommandError> {
    let role: Role = role
        .parse()
        .map_err(|_| CommandError::InvalidRole(role.to_owned()))?;

    dotenvy::dotenv().ok();
    let password = std::env::var(password_env)
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("--password-env variable"))?;

    let pool = connect().await?;
    let store = Arc::new(PgStore::connect(pool).await?);

    tracing::info!("Creating user: {} ({})", email, role);

    let form = AccountForm {
        given_name: given_name.to_owned(),
        family_name: family_name.to_owned(),
        email: email.to_owned(),
        password: password.expose_secret().to_owned(),
        confirm_password: password.expose_secret().to_owned(),
    };
    let account = AuthService::new(store.as_ref()).provision(&form, role).await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        account.id,
        account.email,
        account.role
    );
    Ok(account.id)
}
