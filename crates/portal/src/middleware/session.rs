//! Session middleware configuration.
//!
//! Sessions are `PostgreSQL`-backed in production and process-local when the
//! portal runs over the in-memory store. Both share the same cookie
//! settings: `SameSite=Strict`, `HttpOnly`, seven days of inactivity.

use sqlx::PgPool;
use tower_sessions::session_store::SessionStore;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::PortalConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "supply_desk_session";

/// Session expiry time in seconds (7 days of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with the `PostgreSQL` store.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "portal" and "session" values).
#[must_use]
pub fn postgres_session_layer(
    pool: &PgPool,
    config: &PortalConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The session table is created by migration in the portal schema.
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("portal")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    configure(SessionManagerLayer::new(store), config)
}

/// Create the session layer with a process-local store.
#[must_use]
pub fn memory_session_layer(config: &PortalConfig) -> SessionManagerLayer<MemoryStore> {
    configure(SessionManagerLayer::new(MemoryStore::default()), config)
}

fn configure<S: SessionStore>(
    layer: SessionManagerLayer<S>,
    config: &PortalConfig,
) -> SessionManagerLayer<S> {
    layer
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.secure_cookies())
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}
