//! Schema creation for the site directory and per-tenant tables
//!
//! Table names are only ever interpolated from validated `TableName`s and
//! always double-quoted.

use sqlx::SqlitePool;
use valet_core::{Result, TenantTables};

use crate::car_store::storage_error;

pub(crate) async fn initialize_directory(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            site_no INTEGER PRIMARY KEY CHECK (site_no > 0),
            login_table TEXT NOT NULL,
            car_table TEXT NOT NULL,
            dump_table TEXT NOT NULL,
            max_users INTEGER,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| storage_error("create sites table", e))?;

    Ok(())
}

/// Columns shared by the active and archive tables
const RECORD_COLUMNS: &str = r#"
            car_no TEXT NOT NULL,
            site_no INTEGER NOT NULL,
            valet_id TEXT NOT NULL,
            phone_number TEXT,
            status TEXT NOT NULL,
            parking_spot TEXT,
            driver_assigned_for_parking TEXT,
            driver_assigned_for_bringing TEXT,
            seen_parking BOOLEAN NOT NULL DEFAULT 0,
            seen_bringing BOOLEAN NOT NULL DEFAULT 0,
            timestamp_car_in_request TIMESTAMP NOT NULL,
            timestamp_driver_assigned TIMESTAMP,
            timestamp_parked TIMESTAMP,
            timestamp_car_out_request TIMESTAMP,
            timestamp_car_brought TIMESTAMP,
            timestamp_car_handed_over TIMESTAMP,
            timestamp_seen_parking TIMESTAMP,
            timestamp_seen_bringing TIMESTAMP"#;

/// Create a tenant's active, archive and user tables if missing
pub(crate) async fn provision_tenant(pool: &SqlitePool, tables: &TenantTables) -> Result<()> {
    let active = tables.active.as_str();
    let archive = tables.archive.as_str();
    let users = tables.users.as_str();

    let statements = [
        // Active records: unique car number and valet id per tenant
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{active}" ({RECORD_COLUMNS},
            PRIMARY KEY (site_no, car_no),
            UNIQUE (site_no, valet_id)
        )"#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{active}_car_in" ON "{active}"(site_no, timestamp_car_in_request DESC)"#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{active}_drivers" ON "{active}"(driver_assigned_for_parking, driver_assigned_for_bringing)"#
        ),
        // Archive: append-only, a car number may be handed over many times
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{archive}" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,{RECORD_COLUMNS}
        )"#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{archive}_car_in" ON "{archive}"(site_no, timestamp_car_in_request DESC)"#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{archive}_car_no" ON "{archive}"(car_no)"#
        ),
        format!(
            r#"CREATE TRIGGER IF NOT EXISTS "{archive}_no_update" BEFORE UPDATE ON "{archive}"
            BEGIN SELECT RAISE(ABORT, 'archive records are immutable'); END"#
        ),
        format!(
            r#"CREATE TRIGGER IF NOT EXISTS "{archive}_no_delete" BEFORE DELETE ON "{archive}"
            BEGIN SELECT RAISE(ABORT, 'archive records are immutable'); END"#
        ),
        // Users of the site; admins are never removed through the engine
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{users}" (
            id TEXT NOT NULL,
            password TEXT,
            site_no INTEGER NOT NULL,
            role TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            PRIMARY KEY (site_no, id)
        )"#
        ),
    ];

    for statement in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| storage_error("provision tenant tables", e))?;
    }

    Ok(())
}
