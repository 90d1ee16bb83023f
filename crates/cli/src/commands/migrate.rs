//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! sd-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string for the portal
//!
//! Migration files live in `crates/portal/migrations/` and are embedded at
//! compile time.

use super::{CommandError, connect};

/// Run the portal migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running portal migrations...");
    sqlx::migrate!("../portal/migrations").run(&pool).await?;

    tracing::info!("Portal migrations complete!");
    Ok(())
}
