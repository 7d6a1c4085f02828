//! Common test utilities for engine integration tests

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use valet_core::{CarRecord, Clock, FixedClock, SiteDefinition, SiteNo, TenantTables};
use valet_engine::ValetEngine;
use valet_store_sqlite::{SqliteCarStore, SqliteStoreConfig};

/// An engine over a fresh SQLite file with sites 1 and 2 provisioned.
///
/// Each site has drivers `D1` and `D2`, a manager `M1` and an admin `A1`.
/// Site 1 allows 20 users, site 2 only 5.
#[allow(dead_code)]
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteCarStore>,
    pub clock: Arc<FixedClock>,
    pub engine: ValetEngine,
}

#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 8, 30, 0).unwrap()
}

#[allow(dead_code)]
pub fn tables(site: i64) -> TenantTables {
    TenantTables::from_definition(&SiteDefinition::conventional(SiteNo::new(site).unwrap()))
        .unwrap()
}

#[allow(dead_code)]
impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("valet.db").display());
        let store = Arc::new(
            SqliteCarStore::connect(&url, SqliteStoreConfig::default())
                .await
                .unwrap(),
        );

        let directory = store.site_directory();
        for (site, max_users) in [(1, 20), (2, 5)] {
            let definition = SiteDefinition {
                max_users: Some(max_users),
                ..SiteDefinition::conventional(SiteNo::new(site).unwrap())
            };
            directory.register_site(&definition).await.unwrap();

            let tables = tables(site);
            store.provision_site(&tables).await.unwrap();
            for (id, role) in [("D1", "driver"), ("D2", "driver"), ("M1", "manager"), ("A1", "admin")] {
                store
                    .register_user(&tables, id, Some("secret"), role)
                    .await
                    .unwrap();
            }
        }

        let clock = Arc::new(FixedClock::new(start_time()));
        let engine = ValetEngine::new(store.clone(), Arc::new(directory)).with_clock(clock.clone());

        Self {
            dir,
            store,
            clock,
            engine,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Car-in followed by a parking assignment to `driver`
    pub async fn checked_in_and_assigned(&self, site: i64, car_no: &str, valet_id: &str, driver: &str) -> CarRecord {
        self.engine
            .submit_car_in(site, car_no, valet_id, None)
            .await
            .unwrap();
        self.engine
            .assign_driver(site, car_no, driver)
            .await
            .unwrap()
    }

    /// Drive a car all the way to `brought_to_client`
    pub async fn brought_to_client(&self, site: i64, car_no: &str, valet_id: &str) -> CarRecord {
        self.checked_in_and_assigned(site, car_no, valet_id, "D1")
            .await;
        self.engine
            .mark_parked(site, car_no, "A12")
            .await
            .unwrap();
        self.engine.request_car_out(site, car_no).await.unwrap();
        self.engine
            .assign_driver(site, car_no, "D2")
            .await
            .unwrap();
        self.engine.mark_brought(site, car_no).await.unwrap()
    }
}
