//! Tenant-scoped car lifecycle engine
//!
//! [`ValetEngine`] is the surface the request layer calls. Every operation
//! resolves the tenant first, then delegates to the store, which applies
//! the lifecycle guard inside the write. The engine performs no retries.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Arc;
use tracing::info;
use valet_core::{
    Advance, ArchivedRecord, CarRecord, CarStore, Clock, DayRange, DriverStats, Error, Leg,
    NewCar, NewUser, RecordSource, Result, SiteDirectory, SiteUser, SourcedRecord, SystemClock,
    TenantTables, UserStats,
};

use crate::archival::ArchivalMover;
use crate::drivers::DriverAssignmentManager;
use crate::registry::{IntoSiteNo, TenantRegistry};

/// Maximum number of search hits returned
pub const SEARCH_LIMIT: usize = 100;

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(value)
}

fn sourced(records: Vec<CarRecord>, source: RecordSource) -> impl Iterator<Item = SourcedRecord> {
    records
        .into_iter()
        .map(move |record| SourcedRecord { record, source })
}

/// Merge active and archive hits, most recent car-in first
fn merge_newest_first(
    active: Vec<CarRecord>,
    archive: Vec<CarRecord>,
    limit: Option<usize>,
) -> Vec<SourcedRecord> {
    let mut merged: Vec<SourcedRecord> = sourced(active, RecordSource::Active)
        .chain(sourced(archive, RecordSource::Archive))
        .collect();
    merged.sort_by(|a, b| b.record.car_in_requested_at.cmp(&a.record.car_in_requested_at));
    if let Some(limit) = limit {
        merged.truncate(limit);
    }
    merged
}

pub struct ValetEngine {
    registry: TenantRegistry,
    store: Arc<dyn CarStore>,
    drivers: DriverAssignmentManager,
    archival: ArchivalMover,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
}

impl ValetEngine {
    /// Engine on the wall clock, with calendar days in UTC
    pub fn new(store: Arc<dyn CarStore>, directory: Arc<dyn SiteDirectory>) -> Self {
        Self {
            registry: TenantRegistry::new(directory),
            drivers: DriverAssignmentManager::new(Arc::clone(&store)),
            archival: ArchivalMover::new(Arc::clone(&store)),
            store,
            clock: Arc::new(SystemClock),
            utc_offset: Utc.fix(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Offset that fixes the calendar-day boundary for "today"
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    async fn tenant(&self, site: impl IntoSiteNo) -> Result<Arc<TenantTables>> {
        self.registry.resolve(site).await
    }

    /// Register a car at the drop-off point
    ///
    /// # Errors
    /// - `Error::DuplicateKey` if the car number or valet id is already active
    /// - `Error::InvalidInput` if the car number or valet id is blank
    pub async fn submit_car_in(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
        valet_id: &str,
        phone_number: Option<&str>,
    ) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        let car = NewCar {
            car_no: required("car_no", car_no)?.to_string(),
            valet_id: required("valet_id", valet_id)?.to_string(),
            phone_number: phone_number
                .map(str::trim)
                .filter(|phone| !phone.is_empty())
                .map(str::to_string),
        };

        let record = self.store.insert_car(&tables, &car, self.clock.now()).await?;
        info!(site_no = %tables.site_no, car_no = %record.car_no, valet_id = %record.valet_id, "Car in");
        Ok(record)
    }

    /// Assign or reassign the driver of the leg the car's status selects
    pub async fn assign_driver(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
        driver_id: &str,
    ) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        self.drivers
            .assign(&tables, car_no.trim(), driver_id, self.clock.now())
            .await
    }

    pub async fn mark_parked(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
        parking_spot: &str,
    ) -> Result<CarRecord> {
        let step = Advance::Parked {
            parking_spot: required("parking_spot", parking_spot)?.to_string(),
        };
        self.advance(site, car_no, step).await
    }

    pub async fn request_car_out(&self, site: impl IntoSiteNo, car_no: &str) -> Result<CarRecord> {
        self.advance(site, car_no, Advance::OutRequested).await
    }

    /// # Errors
    /// - `Error::PreconditionFailed` unless the car is `assigned_bringing`
    pub async fn mark_brought(&self, site: impl IntoSiteNo, car_no: &str) -> Result<CarRecord> {
        self.advance(site, car_no, Advance::Brought).await
    }

    async fn advance(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
        step: Advance,
    ) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        let car_no = car_no.trim();
        let record = self
            .store
            .advance(&tables, car_no, &step, self.clock.now())
            .await?;
        info!(site_no = %tables.site_no, car_no, status = %record.status, "Car advanced");
        Ok(record)
    }

    /// Hand the car back to its owner and archive the record
    ///
    /// # Errors
    /// - `Error::PreconditionFailed` unless the car is `brought_to_client`
    /// - `Error::StorageFailure` if the move rolled back
    pub async fn mark_handed_over(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
    ) -> Result<ArchivedRecord> {
        let tables = self.tenant(site).await?;
        self.archival
            .archive(&tables, car_no.trim(), self.clock.now())
            .await
    }

    /// Record that the assigned driver acknowledged a leg
    pub async fn mark_seen(
        &self,
        site: impl IntoSiteNo,
        car_no: &str,
        leg: Leg,
    ) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        self.store
            .mark_seen(&tables, car_no.trim(), leg, self.clock.now())
            .await
    }

    pub async fn list_active(&self, site: impl IntoSiteNo) -> Result<Vec<CarRecord>> {
        let tables = self.tenant(site).await?;
        self.store.list_active(&tables).await
    }

    pub async fn list_driver_jobs(
        &self,
        site: impl IntoSiteNo,
        driver_id: &str,
    ) -> Result<Vec<CarRecord>> {
        let tables = self.tenant(site).await?;
        self.drivers.jobs_for(&tables, driver_id.trim()).await
    }

    /// Search by exact valet id, car number substring or last four
    /// characters, most recent first. Every match is returned for a query;
    /// without one, the listing stops at [`SEARCH_LIMIT`] records.
    pub async fn search(
        &self,
        site: impl IntoSiteNo,
        query: Option<&str>,
        include_archive: bool,
    ) -> Result<Vec<SourcedRecord>> {
        let tables = self.tenant(site).await?;
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let limit = query.is_none().then_some(SEARCH_LIMIT);

        if !include_archive {
            let active = self
                .store
                .search(&tables, RecordSource::Active, query, limit)
                .await?;
            return Ok(sourced(active, RecordSource::Active).collect());
        }

        let (active, archive) = tokio::try_join!(
            self.store
                .search(&tables, RecordSource::Active, query, limit),
            self.store
                .search(&tables, RecordSource::Archive, query, limit),
        )?;
        Ok(merge_newest_first(active, archive, limit))
    }

    /// Workload of every driver of the tenant, "today" per the engine clock
    pub async fn driver_stats(&self, site: impl IntoSiteNo) -> Result<Vec<DriverStats>> {
        let tables = self.tenant(site).await?;
        let today = DayRange::containing(self.clock.now(), self.utc_offset);
        self.drivers.stats(&tables, &today).await
    }

    /// The active car holding a valet ticket
    pub async fn find_by_valet_id(&self, site: impl IntoSiteNo, valet_id: &str) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        let valet_id = valet_id.trim();
        self.store
            .find_by_valet_id(&tables, valet_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No active car for valet id {}", valet_id)))
    }

    pub async fn get_car(&self, site: impl IntoSiteNo, car_no: &str) -> Result<CarRecord> {
        let tables = self.tenant(site).await?;
        let car_no = car_no.trim();
        self.store
            .get_car(&tables, car_no)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Car {} not found", car_no)))
    }

    /// Active and archived cars checked in on `date`, most recent first
    pub async fn history_for_day(
        &self,
        site: impl IntoSiteNo,
        date: NaiveDate,
    ) -> Result<Vec<SourcedRecord>> {
        let tables = self.tenant(site).await?;
        let day = DayRange::for_date(date, self.utc_offset);

        let (active, archive) = tokio::try_join!(
            self.store
                .records_checked_in(&tables, RecordSource::Active, &day),
            self.store
                .records_checked_in(&tables, RecordSource::Archive, &day),
        )?;
        Ok(merge_newest_first(active, archive, None))
    }

    pub async fn history_today(&self, site: impl IntoSiteNo) -> Result<Vec<SourcedRecord>> {
        let today = self.clock.now().with_timezone(&self.utc_offset).date_naive();
        self.history_for_day(site, today).await
    }

    pub async fn list_drivers(&self, site: impl IntoSiteNo) -> Result<Vec<String>> {
        let tables = self.tenant(site).await?;
        self.store.list_drivers(&tables).await
    }

    /// Add a user to the site, within its user cap
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the id or role is blank
    /// - `Error::UserLimitReached` if the site already holds `max_users` users
    /// - `Error::DuplicateKey` if the id is already taken
    pub async fn add_user(&self, site: impl IntoSiteNo, user: &NewUser) -> Result<SiteUser> {
        let tables = self.tenant(site).await?;
        let user = NewUser {
            id: required("id", &user.id)?.to_string(),
            password: user.password.clone(),
            role: required("role", &user.role)?.to_lowercase(),
        };
        self.store.add_user(&tables, &user, self.clock.now()).await
    }

    /// Remove a user; admins cannot be removed
    ///
    /// # Errors
    /// - `Error::NotFound` if the id is not a user of the site
    /// - `Error::ProtectedUser` if the user is an admin
    pub async fn remove_user(&self, site: impl IntoSiteNo, user_id: &str) -> Result<SiteUser> {
        let tables = self.tenant(site).await?;
        self.store
            .remove_user(&tables, required("user_id", user_id)?)
            .await
    }

    pub async fn user_stats(&self, site: impl IntoSiteNo) -> Result<UserStats> {
        let tables = self.tenant(site).await?;
        let current_users = self.store.count_users(&tables).await?;
        Ok(UserStats {
            site_no: tables.site_no,
            current_users,
            max_users: tables.max_users,
        })
    }

    /// Users of the site ordered by id, without credentials
    pub async fn list_users(&self, site: impl IntoSiteNo) -> Result<Vec<SiteUser>> {
        let tables = self.tenant(site).await?;
        self.store.list_users(&tables).await
    }
}
