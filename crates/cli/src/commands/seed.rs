//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Fiber drop cable
//!     imageRef: catalog/fiber-drop.png
//!     minQty: 0
//!     maxQty: 20
//!     category: non_serial
//!   - name: ONT modem
//!     imageRef: catalog/ont.png
//!     minQty: 0
//!     maxQty: 4
//!     category: serial
//!     availability: unavailable
//! ```
//!
//! Entries are appended to their category in file order, exactly as if an
//! administrator had added them one by one.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use supply_desk_core::NewCatalogEntry;
use supply_desk_portal::db::{PgStore, PortalStore, SharedStore};
use supply_desk_portal::services::CatalogReorderController;

use super::{CommandError, connect};

/// Seed file layout.
#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub products: Vec<NewCatalogEntry>,
}

/// Summary of a seeding run.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub removed: usize,
    pub inserted: usize,
    pub errors: Vec<(String, String)>,
}

/// Read and parse a seed file without touching the database.
pub async fn load(file_path: &str) -> Result<ProductSeed, CommandError> {
    let content = tokio::fs::read_to_string(Path::new(file_path))
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Seed products from `file_path`, optionally removing every existing
/// product first.
pub async fn products(file_path: &str, clear_existing: bool) -> Result<(), CommandError> {
    info!(path = %file_path, "Loading products from file");
    let seed = load(file_path).await?;
    info!(products = seed.products.len(), "Parsed seed file");

    // Validate everything before connecting
    let invalid: Vec<_> = seed
        .products
        .iter()
        .filter_map(|p| p.validate().err().map(|e| format!("{}: {e}", p.name)))
        .collect();
    if !invalid.is_empty() {
        error!("Seed file validation failed:");
        for err in &invalid {
            error!("  - {err}");
        }
        return Err(CommandError::InvalidProducts(invalid.len()));
    }

    let pool = connect().await?;
    let store: SharedStore = Arc::new(PgStore::connect(pool).await?);

    let result = seed_store(store, &seed, clear_existing).await?;

    info!("Seeding complete!");
    info!("  Products removed: {}", result.removed);
    info!("  Products inserted: {}", result.inserted);
    if !result.errors.is_empty() {
        error!("  Errors: {}", result.errors.len());
        for (name, err) in &result.errors {
            error!("    - {name}: {err}");
        }
    }
    Ok(())
}

/// Insert `seed` into `store`. A product that fails is reported and the
/// rest are still inserted.
pub async fn seed_store(
    store: SharedStore,
    seed: &ProductSeed,
    clear_existing: bool,
) -> Result<SeedResult, CommandError> {
    let mut result = SeedResult::default();

    if clear_existing {
        for product in store.list_products().await? {
            store.delete_product(product.id).await?;
            result.removed += 1;
        }
    }

    let catalog = CatalogReorderController::new(store);
    for product in &seed.products {
        match catalog.create(product).await {
            Ok(_) => result.inserted += 1,
            Err(e) => result.errors.push((product.name.clone(), e.to_string())),
        }
    }
    Ok(result)
}
