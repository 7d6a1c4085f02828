//! SQLite storage for valet tenants
//!
//! This crate implements the `SiteDirectory` and `CarStore` traits using
//! SQLite through an sqlx connection pool.
//!
//! # Features
//! - `sites` table mapping site numbers to per-tenant table names
//! - Per-tenant active, archive (append-only) and user tables
//! - Guarded transitions as single conditional statements
//! - Archival as one insert-then-delete transaction
//!
//! # Example
//! ```no_run
//! # use valet_store_sqlite::{SqliteCarStore, SqliteStoreConfig};
//! # async fn example() -> valet_core::Result<()> {
//! let store = SqliteCarStore::connect("sqlite://valet.db", SqliteStoreConfig::default()).await?;
//! let directory = store.site_directory();
//! # Ok(())
//! # }
//! ```

mod car_store;
mod config;
mod rows;
mod schema;
mod site_directory;

pub use car_store::SqliteCarStore;
pub use config::SqliteStoreConfig;
pub use site_directory::SqliteSiteDirectory;
