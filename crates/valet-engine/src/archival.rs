//! Hand-over archival

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use valet_core::{ArchivedRecord, CarStore, Error, Result, TenantTables};

/// Moves handed-over cars from the active to the archive data set
pub struct ArchivalMover {
    store: Arc<dyn CarStore>,
}

impl ArchivalMover {
    pub fn new(store: Arc<dyn CarStore>) -> Self {
        Self { store }
    }

    /// Archive a `brought_to_client` car, stamping the hand-over time.
    ///
    /// The store performs the copy and the removal in one transaction; on
    /// `StorageFailure` the active record is unchanged and the caller may
    /// retry.
    pub async fn archive(
        &self,
        tables: &TenantTables,
        car_no: &str,
        at: DateTime<Utc>,
    ) -> Result<ArchivedRecord> {
        match self.store.archive(tables, car_no, at).await {
            Ok(record) => {
                info!(site_no = %tables.site_no, car_no, "Car handed over");
                Ok(record)
            }
            Err(e @ Error::StorageFailure(_)) => {
                warn!(site_no = %tables.site_no, car_no, "Archival rolled back: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
