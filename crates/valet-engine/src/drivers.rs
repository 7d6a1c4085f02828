//! Driver assignment and per-driver statistics

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};
use valet_core::{CarRecord, CarStore, DayRange, DriverStats, Error, Result, TenantTables};

/// Assigns drivers to car legs and aggregates their workload
pub struct DriverAssignmentManager {
    store: Arc<dyn CarStore>,
}

impl DriverAssignmentManager {
    pub fn new(store: Arc<dyn CarStore>) -> Self {
        Self { store }
    }

    /// Bind `driver_id` to whichever leg the car's status selects.
    ///
    /// The driver check and the status guard are evaluated by the store
    /// inside the write itself.
    pub async fn assign(
        &self,
        tables: &TenantTables,
        car_no: &str,
        driver_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CarRecord> {
        let driver_id = driver_id.trim();
        if driver_id.is_empty() {
            return Err(Error::UnknownDriver(String::new()));
        }

        let record = self
            .store
            .assign_driver(tables, car_no, driver_id, at)
            .await?;

        info!(
            site_no = %tables.site_no,
            car_no,
            driver_id,
            status = %record.status,
            "Driver assigned"
        );
        Ok(record)
    }

    /// Jobs currently bound to a registered driver
    ///
    /// # Errors
    /// - `Error::UnknownDriver` if the id is not a driver of the tenant
    pub async fn jobs_for(&self, tables: &TenantTables, driver_id: &str) -> Result<Vec<CarRecord>> {
        if !self.store.is_driver(tables, driver_id).await? {
            return Err(Error::UnknownDriver(driver_id.to_string()));
        }
        self.store.list_driver_jobs(tables, driver_id).await
    }

    /// Statistics for every driver of the tenant, queried concurrently
    pub async fn stats(&self, tables: &TenantTables, day: &DayRange) -> Result<Vec<DriverStats>> {
        let drivers = self.store.list_drivers(tables).await?;
        debug!(site_no = %tables.site_no, drivers = drivers.len(), "Collecting driver stats");

        try_join_all(
            drivers
                .into_iter()
                .map(|driver_id| self.stats_for(tables, driver_id, day)),
        )
        .await
    }

    async fn stats_for(
        &self,
        tables: &TenantTables,
        driver_id: String,
        day: &DayRange,
    ) -> Result<DriverStats> {
        let ((parking_today, retrieval_today), jobs_completed_today) = tokio::try_join!(
            self.store.count_jobs_in_progress(tables, &driver_id),
            self.store.count_legs_completed(tables, &driver_id, day),
        )?;

        Ok(DriverStats {
            driver_id,
            jobs_in_progress: parking_today + retrieval_today,
            jobs_completed_today,
            parking_today,
            retrieval_today,
        })
    }
}
