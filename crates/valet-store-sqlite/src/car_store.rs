//! SQLite car store implementation
//!
//! Every write is a single conditional statement whose filter carries the
//! lifecycle guard taken from `Event::accepted_from`. When the statement
//! matches no row, the same transaction reads the record to tell a missing
//! car from a rejected transition, then rolls back.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};
use valet_core::{
    Advance, ArchivedRecord, CarRecord, CarStatus, CarStore, DayRange, Error, Event, KeyKind, Leg,
    NewCar, NewUser, ROLE_ADMIN, ROLE_DRIVER, RecordSource, Result, SiteUser, TableName,
    TenantTables,
};

use crate::config::SqliteStoreConfig;
use crate::rows::{CAR_COLUMNS, CarRow, escape_like, into_records, last_four, status_list};
use crate::schema;
use crate::site_directory::SqliteSiteDirectory;

pub(crate) fn storage_error(context: &str, error: sqlx::Error) -> Error {
    Error::StorageFailure(format!("Failed to {}: {}", context, error))
}

fn not_found(car_no: &str) -> Error {
    Error::NotFound(format!("Car {} not found", car_no))
}

type UserRow = (String, String, DateTime<Utc>);

fn site_user((id, role, created_at): UserRow) -> SiteUser {
    SiteUser {
        id,
        role,
        created_at,
    }
}

/// Columns of a leg's seen flag and seen timestamp
fn seen_columns(leg: Leg) -> (&'static str, &'static str) {
    match leg {
        Leg::Parking => ("seen_parking", "timestamp_seen_parking"),
        Leg::Bringing => ("seen_bringing", "timestamp_seen_bringing"),
    }
}

async fn rollback(tx: Transaction<'_, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        warn!("Failed to roll back transaction: {}", e);
    }
}

/// SQLite-backed [`CarStore`]
#[derive(Clone)]
pub struct SqliteCarStore {
    pool: SqlitePool,
}

impl SqliteCarStore {
    /// Open (creating if missing) the database at `url` and ensure the
    /// `sites` table exists
    ///
    /// # Errors
    /// - `Error::Config` if the url cannot be parsed
    /// - `Error::StorageFailure` if the database cannot be opened
    pub async fn connect(url: &str, config: SqliteStoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Config(format!("Invalid database url {:?}: {}", url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);

        // Create directory if needed
        if let Some(parent) = options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::StorageFailure(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| storage_error("open database", e))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and ensure the `sites` table exists
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::initialize_directory(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Site directory sharing this store's pool
    pub fn site_directory(&self) -> SqliteSiteDirectory {
        SqliteSiteDirectory::new(self.pool.clone())
    }

    /// Create a tenant's tables if they do not exist yet
    pub async fn provision_site(&self, tables: &TenantTables) -> Result<()> {
        schema::provision_tenant(&self.pool, tables).await?;
        info!(site_no = %tables.site_no, active = %tables.active, "Provisioned site tables");
        Ok(())
    }

    /// Insert or replace a user of a tenant, ignoring the site's user cap.
    ///
    /// Provisioning helper; site administration goes through `add_user`.
    pub async fn register_user(
        &self,
        tables: &TenantTables,
        user_id: &str,
        password: Option<&str>,
        role: &str,
    ) -> Result<()> {
        let sql = format!(
            r#"INSERT INTO "{}" (id, password, site_no, role) VALUES (?, ?, ?, ?)
            ON CONFLICT(site_no, id) DO UPDATE SET password = excluded.password, role = excluded.role"#,
            tables.users
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(password)
            .bind(i64::from(tables.site_no))
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("register user", e))?;
        Ok(())
    }

    async fn current_status(
        conn: &mut SqliteConnection,
        tables: &TenantTables,
        car_no: &str,
    ) -> Result<Option<CarStatus>> {
        let sql = format!(
            r#"SELECT status FROM "{}" WHERE site_no = ? AND car_no = ?"#,
            tables.active
        );
        let status: Option<String> = sqlx::query_scalar(&sql)
            .bind(i64::from(tables.site_no))
            .bind(car_no)
            .fetch_optional(conn)
            .await
            .map_err(|e| storage_error("read car status", e))?;

        status.map(|s| s.parse()).transpose()
    }

    async fn driver_exists(
        conn: &mut SqliteConnection,
        tables: &TenantTables,
        driver_id: &str,
    ) -> Result<bool> {
        let sql = format!(
            r#"SELECT EXISTS(SELECT 1 FROM "{}" WHERE site_no = ? AND id = ? AND role = '{}')"#,
            tables.users,
            ROLE_DRIVER
        );
        let exists: i64 = sqlx::query_scalar(&sql)
            .bind(i64::from(tables.site_no))
            .bind(driver_id)
            .fetch_one(conn)
            .await
            .map_err(|e| storage_error("look up driver", e))?;
        Ok(exists != 0)
    }

    /// Explain why a guarded write on `car_no` matched nothing
    async fn rejection(
        conn: &mut SqliteConnection,
        tables: &TenantTables,
        car_no: &str,
        event: Event,
    ) -> Error {
        match Self::current_status(conn, tables, car_no).await {
            Ok(Some(status)) => event.rejection(car_no, status),
            Ok(None) => not_found(car_no),
            Err(e) => e,
        }
    }

    /// Run a guarded `UPDATE ... RETURNING` inside a transaction.
    ///
    /// `bind` receives the statement with no arguments bound and must bind
    /// every placeholder in order.
    async fn guarded_update<'q, F>(
        &self,
        tables: &TenantTables,
        car_no: &str,
        event: Event,
        sql: &'q str,
        bind: F,
    ) -> Result<CarRecord>
    where
        F: FnOnce(
            sqlx::query::QueryAs<'q, Sqlite, CarRow, sqlx::sqlite::SqliteArguments<'q>>,
        ) -> sqlx::query::QueryAs<'q, Sqlite, CarRow, sqlx::sqlite::SqliteArguments<'q>>,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin transaction", e))?;

        let updated = bind(sqlx::query_as::<_, CarRow>(sql))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage_error("update car", e))?;

        let Some(row) = updated else {
            let error = Self::rejection(&mut tx, tables, car_no, event).await;
            rollback(tx).await;
            return Err(error);
        };

        tx.commit()
            .await
            .map_err(|e| storage_error("commit transaction", e))?;

        CarRecord::try_from(row)
    }

    fn table_for(tables: &TenantTables, source: RecordSource) -> &TableName {
        match source {
            RecordSource::Active => &tables.active,
            RecordSource::Archive => &tables.archive,
        }
    }
}

/// Map a unique violation on the active table to the key that collided.
/// SQLite names the columns as `<table>.<column>`.
fn duplicate_key(error: sqlx::Error, table: &TableName, car: &NewCar) -> Error {
    if let sqlx::Error::Database(db) = &error
        && db.is_unique_violation()
    {
        return if db.message().contains(&format!("{}.valet_id", table)) {
            Error::DuplicateKey {
                key: KeyKind::ValetId,
                value: car.valet_id.clone(),
            }
        } else {
            Error::DuplicateKey {
                key: KeyKind::CarNo,
                value: car.car_no.clone(),
            }
        };
    }
    storage_error("insert car", error)
}

fn duplicate_user(error: sqlx::Error, user_id: &str) -> Error {
    if let sqlx::Error::Database(db) = &error
        && db.is_unique_violation()
    {
        return Error::DuplicateKey {
            key: KeyKind::UserId,
            value: user_id.to_string(),
        };
    }
    storage_error("add user", error)
}

#[async_trait]
impl CarStore for SqliteCarStore {
    async fn insert_car(
        &self,
        tables: &TenantTables,
        car: &NewCar,
        at: DateTime<Utc>,
    ) -> Result<CarRecord> {
        let sql = format!(
            r#"INSERT INTO "{}" (car_no, site_no, valet_id, phone_number, status,
                seen_parking, seen_bringing, timestamp_car_in_request)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            RETURNING {CAR_COLUMNS}"#,
            tables.active
        );

        let row = sqlx::query_as::<_, CarRow>(&sql)
            .bind(&car.car_no)
            .bind(i64::from(tables.site_no))
            .bind(&car.valet_id)
            .bind(car.phone_number.as_deref())
            .bind(CarStatus::InRequest.as_str())
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| duplicate_key(e, &tables.active, car))?;

        debug!(site_no = %tables.site_no, car_no = %car.car_no, "Inserted car");
        CarRecord::try_from(row)
    }

    async fn assign_driver(
        &self,
        tables: &TenantTables,
        car_no: &str,
        driver_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CarRecord> {
        let parking = status_list(&Leg::Parking.assignable_from());
        let bringing = status_list(&Leg::Bringing.assignable_from());
        let assignable = status_list(Event::AssignDriver.accepted_from());
        let assigned_parking = Leg::Parking.assigned_status().as_str();
        let assigned_bringing = Leg::Bringing.assigned_status().as_str();

        // SET expressions all see the pre-update row, so `status` in each
        // CASE is the status the guard accepted.
        let sql = format!(
            r#"UPDATE "{active}" SET
                driver_assigned_for_parking = CASE WHEN status IN ({parking}) THEN ? ELSE driver_assigned_for_parking END,
                seen_parking = CASE WHEN status IN ({parking}) THEN 0 ELSE seen_parking END,
                timestamp_seen_parking = CASE WHEN status IN ({parking}) THEN NULL ELSE timestamp_seen_parking END,
                driver_assigned_for_bringing = CASE WHEN status IN ({bringing}) THEN ? ELSE driver_assigned_for_bringing END,
                seen_bringing = CASE WHEN status IN ({bringing}) THEN 0 ELSE seen_bringing END,
                timestamp_seen_bringing = CASE WHEN status IN ({bringing}) THEN NULL ELSE timestamp_seen_bringing END,
                status = CASE WHEN status IN ({parking}) THEN '{assigned_parking}' ELSE '{assigned_bringing}' END,
                timestamp_driver_assigned = ?
            WHERE site_no = ? AND car_no = ? AND status IN ({assignable})
                AND EXISTS (SELECT 1 FROM "{users}" WHERE site_no = ? AND id = ? AND role = '{ROLE_DRIVER}')
            RETURNING {CAR_COLUMNS}"#,
            active = tables.active,
            users = tables.users,
        );

        let site_no = i64::from(tables.site_no);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin transaction", e))?;

        let updated = sqlx::query_as::<_, CarRow>(&sql)
            .bind(driver_id)
            .bind(driver_id)
            .bind(at)
            .bind(site_no)
            .bind(car_no)
            .bind(site_no)
            .bind(driver_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage_error("assign driver", e))?;

        let Some(row) = updated else {
            let error = match Self::driver_exists(&mut tx, tables, driver_id).await {
                Ok(false) => Error::UnknownDriver(driver_id.to_string()),
                Ok(true) => Self::rejection(&mut tx, tables, car_no, Event::AssignDriver).await,
                Err(e) => e,
            };
            rollback(tx).await;
            return Err(error);
        };

        tx.commit()
            .await
            .map_err(|e| storage_error("commit transaction", e))?;

        debug!(site_no = %tables.site_no, car_no, driver_id, "Assigned driver");
        CarRecord::try_from(row)
    }

    async fn advance(
        &self,
        tables: &TenantTables,
        car_no: &str,
        step: &Advance,
        at: DateTime<Utc>,
    ) -> Result<CarRecord> {
        let event = step.event();
        let accepted = status_list(event.accepted_from());
        let target = step.target().as_str();
        let (stamps, parking_spot) = match step {
            Advance::Parked { parking_spot } => (
                "parking_spot = ?, timestamp_parked = ?",
                Some(parking_spot.as_str()),
            ),
            Advance::OutRequested => ("timestamp_car_out_request = ?", None),
            Advance::Brought => ("timestamp_car_brought = ?", None),
        };

        let sql = format!(
            r#"UPDATE "{active}" SET status = '{target}', {stamps}
            WHERE site_no = ? AND car_no = ? AND status IN ({accepted})
            RETURNING {CAR_COLUMNS}"#,
            active = tables.active,
        );

        let site_no = i64::from(tables.site_no);
        let record = self
            .guarded_update(tables, car_no, event, &sql, |query| {
                let query = match parking_spot {
                    Some(spot) => query.bind(spot),
                    None => query,
                };
                query.bind(at).bind(site_no).bind(car_no)
            })
            .await?;

        debug!(site_no = %tables.site_no, car_no, status = %record.status, "Advanced car");
        Ok(record)
    }

    async fn mark_seen(
        &self,
        tables: &TenantTables,
        car_no: &str,
        leg: Leg,
        at: DateTime<Utc>,
    ) -> Result<CarRecord> {
        let event = Event::MarkSeen(leg);
        let accepted = status_list(event.accepted_from());
        let (seen, seen_at) = seen_columns(leg);

        // The seen timestamp is cleared together with the flag on
        // reassignment, so COALESCE keeps the first acknowledgment.
        let sql = format!(
            r#"UPDATE "{active}" SET {seen} = 1, {seen_at} = COALESCE({seen_at}, ?)
            WHERE site_no = ? AND car_no = ? AND status IN ({accepted})
            RETURNING {CAR_COLUMNS}"#,
            active = tables.active,
        );

        let site_no = i64::from(tables.site_no);
        self.guarded_update(tables, car_no, event, &sql, |query| {
            query.bind(at).bind(site_no).bind(car_no)
        })
        .await
    }

    async fn archive(
        &self,
        tables: &TenantTables,
        car_no: &str,
        at: DateTime<Utc>,
    ) -> Result<ArchivedRecord> {
        let event = Event::MarkHandedOver;
        let accepted = status_list(event.accepted_from());
        let handed_over = CarStatus::HandedOver.as_str();

        let copy_sql = format!(
            r#"INSERT INTO "{archive}" ({CAR_COLUMNS})
            SELECT car_no, site_no, valet_id, phone_number, '{handed_over}', parking_spot,
                driver_assigned_for_parking, driver_assigned_for_bringing,
                seen_parking, seen_bringing, timestamp_car_in_request, timestamp_driver_assigned,
                timestamp_parked, timestamp_car_out_request, timestamp_car_brought,
                ?, timestamp_seen_parking, timestamp_seen_bringing
            FROM "{active}"
            WHERE site_no = ? AND car_no = ? AND status IN ({accepted})
            RETURNING {CAR_COLUMNS}"#,
            archive = tables.archive,
            active = tables.active,
        );
        let delete_sql = format!(
            r#"DELETE FROM "{}" WHERE site_no = ? AND car_no = ? AND status IN ({accepted})"#,
            tables.active,
        );

        let site_no = i64::from(tables.site_no);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin transaction", e))?;

        let copied = sqlx::query_as::<_, CarRow>(&copy_sql)
            .bind(at)
            .bind(site_no)
            .bind(car_no)
            .fetch_optional(&mut *tx)
            .await;

        let row = match copied {
            Ok(Some(row)) => row,
            Ok(None) => {
                let error = Self::rejection(&mut tx, tables, car_no, event).await;
                rollback(tx).await;
                return Err(error);
            }
            Err(e) => {
                rollback(tx).await;
                return Err(storage_error("copy car to archive", e));
            }
        };

        let deleted = sqlx::query(&delete_sql)
            .bind(site_no)
            .bind(car_no)
            .execute(&mut *tx)
            .await;

        match deleted {
            Ok(result) if result.rows_affected() == 1 => {}
            Ok(result) => {
                rollback(tx).await;
                return Err(Error::StorageFailure(format!(
                    "Archiving car {} removed {} active records",
                    car_no,
                    result.rows_affected()
                )));
            }
            Err(e) => {
                rollback(tx).await;
                return Err(storage_error("remove archived car", e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("commit archive", e))?;

        info!(site_no = %tables.site_no, car_no, "Archived car");
        CarRecord::try_from(row)
    }

    async fn get_car(&self, tables: &TenantTables, car_no: &str) -> Result<Option<CarRecord>> {
        let sql = format!(
            r#"SELECT {CAR_COLUMNS} FROM "{}" WHERE site_no = ? AND car_no = ?"#,
            tables.active
        );
        let row = sqlx::query_as::<_, CarRow>(&sql)
            .bind(i64::from(tables.site_no))
            .bind(car_no)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("get car", e))?;

        row.map(CarRecord::try_from).transpose()
    }

    async fn find_by_valet_id(
        &self,
        tables: &TenantTables,
        valet_id: &str,
    ) -> Result<Option<CarRecord>> {
        let sql = format!(
            r#"SELECT {CAR_COLUMNS} FROM "{}" WHERE site_no = ? AND valet_id = ?"#,
            tables.active
        );
        let row = sqlx::query_as::<_, CarRow>(&sql)
            .bind(i64::from(tables.site_no))
            .bind(valet_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("find car by valet id", e))?;

        row.map(CarRecord::try_from).transpose()
    }

    async fn list_active(&self, tables: &TenantTables) -> Result<Vec<CarRecord>> {
        let sql = format!(
            r#"SELECT {CAR_COLUMNS} FROM "{}" WHERE site_no = ?
            ORDER BY timestamp_car_in_request DESC"#,
            tables.active
        );
        let rows = sqlx::query_as::<_, CarRow>(&sql)
            .bind(i64::from(tables.site_no))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list active cars", e))?;

        into_records(rows)
    }

    async fn list_driver_jobs(
        &self,
        tables: &TenantTables,
        driver_id: &str,
    ) -> Result<Vec<CarRecord>> {
        let sql = format!(
            r#"SELECT {CAR_COLUMNS} FROM "{}" WHERE site_no = ?
                AND ((driver_assigned_for_parking = ? AND status = '{}')
                  OR (driver_assigned_for_bringing = ? AND status = '{}'))
            ORDER BY timestamp_car_in_request DESC"#,
            tables.active,
            CarStatus::AssignedParking.as_str(),
            CarStatus::AssignedBringing.as_str(),
        );
        let rows = sqlx::query_as::<_, CarRow>(&sql)
            .bind(i64::from(tables.site_no))
            .bind(driver_id)
            .bind(driver_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list driver jobs", e))?;

        into_records(rows)
    }

    async fn search(
        &self,
        tables: &TenantTables,
        source: RecordSource,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CarRecord>> {
        let table = Self::table_for(tables, source);
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let mut sql = format!(r#"SELECT {CAR_COLUMNS} FROM "{table}" WHERE site_no = ?"#);
        if query.is_some() {
            sql.push_str(
                r" AND (valet_id = ? OR car_no LIKE ? ESCAPE '\' OR substr(car_no, -4) LIKE ? ESCAPE '\')",
            );
        }
        sql.push_str(" ORDER BY timestamp_car_in_request DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut statement = sqlx::query_as::<Sqlite, CarRow>(&sql).bind(i64::from(tables.site_no));
        if let Some(q) = query {
            statement = statement
                .bind(q)
                .bind(format!("%{}%", escape_like(q)))
                .bind(format!("%{}%", escape_like(last_four(q))));
        }
        if let Some(limit) = limit {
            statement = statement.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("search cars", e))?;

        into_records(rows)
    }

    async fn records_checked_in(
        &self,
        tables: &TenantTables,
        source: RecordSource,
        day: &DayRange,
    ) -> Result<Vec<CarRecord>> {
        let table = Self::table_for(tables, source);
        let sql = format!(
            r#"SELECT {CAR_COLUMNS} FROM "{table}" WHERE site_no = ?
                AND timestamp_car_in_request >= ? AND timestamp_car_in_request < ?
            ORDER BY timestamp_car_in_request DESC"#
        );
        let rows = sqlx::query_as::<_, CarRow>(&sql)
            .bind(i64::from(tables.site_no))
            .bind(day.start)
            .bind(day.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list cars checked in", e))?;

        into_records(rows)
    }

    async fn is_driver(&self, tables: &TenantTables, driver_id: &str) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| storage_error("acquire connection", e))?;
        Self::driver_exists(&mut conn, tables, driver_id).await
    }

    async fn list_drivers(&self, tables: &TenantTables) -> Result<Vec<String>> {
        let sql = format!(
            r#"SELECT id FROM "{}" WHERE site_no = ? AND role = '{}' ORDER BY id"#,
            tables.users,
            ROLE_DRIVER
        );
        sqlx::query_scalar::<_, String>(&sql)
            .bind(i64::from(tables.site_no))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list drivers", e))
    }

    async fn add_user(
        &self,
        tables: &TenantTables,
        user: &NewUser,
        at: DateTime<Utc>,
    ) -> Result<SiteUser> {
        let sql = format!(
            r#"INSERT INTO "{users}" (id, password, site_no, role, created_at)
            SELECT ?, ?, ?, ?, ?
            WHERE ? IS NULL OR (SELECT COUNT(*) FROM "{users}" WHERE site_no = ?) < ?
            RETURNING id, role, created_at"#,
            users = tables.users,
        );

        let site_no = i64::from(tables.site_no);
        let max_users = tables.max_users.map(i64::from);
        let inserted = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.id)
            .bind(user.password.as_deref())
            .bind(site_no)
            .bind(&user.role)
            .bind(at)
            .bind(max_users)
            .bind(site_no)
            .bind(max_users)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| duplicate_user(e, &user.id))?;

        match (inserted, tables.max_users) {
            (Some(row), _) => {
                info!(site_no = %tables.site_no, user_id = %user.id, role = %user.role, "Added user");
                Ok(site_user(row))
            }
            (None, Some(max_users)) => Err(Error::UserLimitReached {
                site_no: tables.site_no.to_string(),
                max_users,
            }),
            (None, None) => Err(Error::StorageFailure(format!(
                "Adding user {} inserted no row",
                user.id
            ))),
        }
    }

    async fn remove_user(&self, tables: &TenantTables, user_id: &str) -> Result<SiteUser> {
        let delete_sql = format!(
            r#"DELETE FROM "{}" WHERE site_no = ? AND id = ? AND role <> '{}'
            RETURNING id, role, created_at"#,
            tables.users, ROLE_ADMIN
        );
        let role_sql = format!(
            r#"SELECT role FROM "{}" WHERE site_no = ? AND id = ?"#,
            tables.users
        );

        let site_no = i64::from(tables.site_no);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin transaction", e))?;

        let deleted = sqlx::query_as::<_, UserRow>(&delete_sql)
            .bind(site_no)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage_error("remove user", e))?;

        let Some(row) = deleted else {
            let role: std::result::Result<Option<String>, _> = sqlx::query_scalar(&role_sql)
                .bind(site_no)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await;
            rollback(tx).await;
            return Err(match role {
                Ok(Some(_)) => Error::ProtectedUser(user_id.to_string()),
                Ok(None) => Error::NotFound(format!("User {} not found", user_id)),
                Err(e) => storage_error("read user role", e),
            });
        };

        tx.commit()
            .await
            .map_err(|e| storage_error("commit transaction", e))?;

        info!(site_no = %tables.site_no, user_id, "Removed user");
        Ok(site_user(row))
    }

    async fn count_users(&self, tables: &TenantTables) -> Result<u64> {
        let sql = format!(
            r#"SELECT COUNT(*) FROM "{}" WHERE site_no = ?"#,
            tables.users
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(i64::from(tables.site_no))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("count users", e))?;

        Ok(count.max(0) as u64)
    }

    async fn list_users(&self, tables: &TenantTables) -> Result<Vec<SiteUser>> {
        let sql = format!(
            r#"SELECT id, role, created_at FROM "{}" WHERE site_no = ? ORDER BY id"#,
            tables.users
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(i64::from(tables.site_no))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list users", e))?;

        Ok(rows.into_iter().map(site_user).collect())
    }

    async fn count_jobs_in_progress(
        &self,
        tables: &TenantTables,
        driver_id: &str,
    ) -> Result<(u64, u64)> {
        let sql = format!(
            r#"SELECT
                COALESCE(SUM(driver_assigned_for_parking = ? AND status = '{}'), 0),
                COALESCE(SUM(driver_assigned_for_bringing = ? AND status = '{}'), 0)
            FROM "{}" WHERE site_no = ?"#,
            CarStatus::AssignedParking.as_str(),
            CarStatus::AssignedBringing.as_str(),
            tables.active,
        );
        let (parking, bringing): (i64, i64) = sqlx::query_as(&sql)
            .bind(driver_id)
            .bind(driver_id)
            .bind(i64::from(tables.site_no))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("count jobs in progress", e))?;

        Ok((parking.max(0) as u64, bringing.max(0) as u64))
    }

    async fn count_legs_completed(
        &self,
        tables: &TenantTables,
        driver_id: &str,
        day: &DayRange,
    ) -> Result<u64> {
        // A record lives in exactly one of the two data sets, so each leg is
        // counted once.
        let sql = format!(
            r#"SELECT
                COALESCE(SUM(driver_assigned_for_parking = ?
                    AND timestamp_parked >= ? AND timestamp_parked < ?), 0)
              + COALESCE(SUM(driver_assigned_for_bringing = ?
                    AND timestamp_car_brought >= ? AND timestamp_car_brought < ?), 0)
            FROM (
                SELECT driver_assigned_for_parking, timestamp_parked,
                       driver_assigned_for_bringing, timestamp_car_brought
                FROM "{active}" WHERE site_no = ?
                UNION ALL
                SELECT driver_assigned_for_parking, timestamp_parked,
                       driver_assigned_for_bringing, timestamp_car_brought
                FROM "{archive}" WHERE site_no = ?
            )"#,
            active = tables.active,
            archive = tables.archive,
        );

        let site_no = i64::from(tables.site_no);
        let completed: i64 = sqlx::query_scalar(&sql)
            .bind(driver_id)
            .bind(day.start)
            .bind(day.end)
            .bind(driver_id)
            .bind(day.start)
            .bind(day.end)
            .bind(site_no)
            .bind(site_no)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("count completed legs", e))?;

        Ok(completed.max(0) as u64)
    }
}
