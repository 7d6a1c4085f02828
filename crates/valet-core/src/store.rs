//! Store traits for tenant-scoped car data
//!
//! [`SiteDirectory`] maps site numbers to raw table names; [`CarStore`]
//! operates on one tenant's data sets through validated [`TenantTables`].
//! Implementations:
//! - `SqliteSiteDirectory` / `SqliteCarStore` (valet-store-sqlite)
//! - `StaticSiteDirectory` (valet-engine, configuration-provided sites)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Result,
    car::{ArchivedRecord, CarRecord, Leg, NewCar, RecordSource},
    clock::DayRange,
    lifecycle::Advance,
    tenant::{SiteDefinition, SiteNo, TenantTables},
    user::{NewUser, SiteUser},
};

/// Source of per-site table names
#[async_trait]
pub trait SiteDirectory: Send + Sync {
    /// Look up a site's raw definition
    ///
    /// # Returns
    /// `None` when no configuration exists for the site.
    ///
    /// # Errors
    /// - `Error::StorageFailure` when the directory cannot be read
    async fn lookup(&self, site_no: SiteNo) -> Result<Option<SiteDefinition>>;

    /// List configured sites
    async fn list_sites(&self) -> Result<Vec<SiteNo>> {
        Ok(Vec::new())
    }
}

/// Car store trait
///
/// Every method that writes must re-check its guard inside the same
/// statement or transaction that performs the write. On a rejected guard
/// nothing is modified.
#[async_trait]
pub trait CarStore: Send + Sync {
    /// Insert a record in `in_request` with both seen flags cleared
    ///
    /// # Errors
    /// - `Error::DuplicateKey` if `car_no` or `valet_id` is already active
    async fn insert_car(
        &self,
        tables: &TenantTables,
        car: &NewCar,
        at: DateTime<Utc>,
    ) -> Result<CarRecord>;

    /// Bind `driver_id` to the leg selected by the record's current status,
    /// clear that leg's seen flag and stamp the assignment time
    ///
    /// # Errors
    /// - `Error::UnknownDriver` if the id is not a driver of the tenant
    /// - `Error::NotFound` if no active record has `car_no`
    /// - `Error::InvalidTransition` if the status accepts no assignment
    async fn assign_driver(
        &self,
        tables: &TenantTables,
        car_no: &str,
        driver_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CarRecord>;

    /// Apply a status-advancing step
    ///
    /// # Errors
    /// - `Error::NotFound` if no active record has `car_no`
    /// - the step's rejection (`InvalidTransition` or `PreconditionFailed`)
    async fn advance(
        &self,
        tables: &TenantTables,
        car_no: &str,
        step: &Advance,
        at: DateTime<Utc>,
    ) -> Result<CarRecord>;

    /// Set a leg's seen flag. Idempotent: an already-seen leg keeps its
    /// original timestamp.
    async fn mark_seen(
        &self,
        tables: &TenantTables,
        car_no: &str,
        leg: Leg,
        at: DateTime<Utc>,
    ) -> Result<CarRecord>;

    /// Move a `brought_to_client` record into the archive in one transaction
    ///
    /// # Errors
    /// - `Error::PreconditionFailed` if the record is in another state
    /// - `Error::NotFound` if no active record has `car_no`
    /// - `Error::StorageFailure` if the move could not complete; the active
    ///   record is left untouched
    async fn archive(
        &self,
        tables: &TenantTables,
        car_no: &str,
        at: DateTime<Utc>,
    ) -> Result<ArchivedRecord>;

    async fn get_car(&self, tables: &TenantTables, car_no: &str) -> Result<Option<CarRecord>>;

    async fn find_by_valet_id(
        &self,
        tables: &TenantTables,
        valet_id: &str,
    ) -> Result<Option<CarRecord>>;

    /// All active records, most recent car-in first
    async fn list_active(&self, tables: &TenantTables) -> Result<Vec<CarRecord>>;

    /// Active records whose parking leg is `assigned_parking` or bringing leg
    /// is `assigned_bringing` with `driver_id`, most recent car-in first
    async fn list_driver_jobs(
        &self,
        tables: &TenantTables,
        driver_id: &str,
    ) -> Result<Vec<CarRecord>>;

    /// Records of one data set matching `query` (exact valet id, car number
    /// substring, or last-four match), most recent car-in first. `None`
    /// returns every match.
    async fn search(
        &self,
        tables: &TenantTables,
        source: RecordSource,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CarRecord>>;

    /// Records of one data set whose car-in timestamp falls inside `day`
    async fn records_checked_in(
        &self,
        tables: &TenantTables,
        source: RecordSource,
        day: &DayRange,
    ) -> Result<Vec<CarRecord>>;

    /// Whether `driver_id` is a user of the tenant with role `driver`
    async fn is_driver(&self, tables: &TenantTables, driver_id: &str) -> Result<bool>;

    async fn list_drivers(&self, tables: &TenantTables) -> Result<Vec<String>>;

    /// Add a user unless the site already holds `tables.max_users` users.
    /// The cap check and the insert happen in one statement.
    ///
    /// # Errors
    /// - `Error::UserLimitReached` if the site is full
    /// - `Error::DuplicateKey` if the id is already a user of the tenant
    async fn add_user(
        &self,
        tables: &TenantTables,
        user: &NewUser,
        at: DateTime<Utc>,
    ) -> Result<SiteUser>;

    /// Remove a user that is not an admin
    ///
    /// # Errors
    /// - `Error::NotFound` if the id is not a user of the tenant
    /// - `Error::ProtectedUser` if the user is an admin
    async fn remove_user(&self, tables: &TenantTables, user_id: &str) -> Result<SiteUser>;

    async fn count_users(&self, tables: &TenantTables) -> Result<u64>;

    /// Users of the tenant ordered by id
    async fn list_users(&self, tables: &TenantTables) -> Result<Vec<SiteUser>>;

    /// Jobs currently bound to `driver_id` in a not-yet-completed state:
    /// `(assigned_parking, assigned_bringing)`
    async fn count_jobs_in_progress(
        &self,
        tables: &TenantTables,
        driver_id: &str,
    ) -> Result<(u64, u64)>;

    /// Legs completed by `driver_id` inside `day` across active and archive.
    /// Each leg of a record counts once.
    async fn count_legs_completed(
        &self,
        tables: &TenantTables,
        driver_id: &str,
        day: &DayRange,
    ) -> Result<u64>;
}
