//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod user;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use supply_desk_portal::db::{self, RepositoryError};
use supply_desk_portal::services::{AuthError, CatalogError};

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid role: {0}. Valid roles: Admin, Tecnico")]
    InvalidRole(String),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    SeedFile(#[from] serde_yaml::Error),

    #[error("{0} products in the seed file are invalid")]
    InvalidProducts(usize),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Store error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Connect to the portal database named by `PORTAL_DATABASE_URL` (or
/// `DATABASE_URL`).
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("PORTAL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("PORTAL_DATABASE_URL"))?;

    tracing::info!("Connecting to portal database...");
    Ok(db::create_pool(&database_url).await?)
}
