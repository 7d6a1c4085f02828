//! Site directory backed by the `sites` table

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use valet_core::{Error, Result, SiteDefinition, SiteDirectory, SiteNo};

use crate::car_store::storage_error;

/// Reads per-site table names from the `sites` table.
///
/// Names are returned raw; validation happens when the registry turns a
/// definition into `TenantTables`.
#[derive(Clone)]
pub struct SqliteSiteDirectory {
    pool: SqlitePool,
}

impl SqliteSiteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a site's table names and user cap
    pub async fn register_site(&self, definition: &SiteDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sites (site_no, login_table, car_table, dump_table, max_users)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(site_no) DO UPDATE SET
                login_table = excluded.login_table,
                car_table = excluded.car_table,
                dump_table = excluded.dump_table,
                max_users = excluded.max_users
            "#,
        )
        .bind(i64::from(definition.site_no))
        .bind(&definition.login_table)
        .bind(&definition.car_table)
        .bind(&definition.dump_table)
        .bind(definition.max_users.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("register site", e))?;

        debug!(site_no = %definition.site_no, "Registered site");
        Ok(())
    }
}

#[async_trait]
impl SiteDirectory for SqliteSiteDirectory {
    async fn lookup(&self, site_no: SiteNo) -> Result<Option<SiteDefinition>> {
        let row = sqlx::query(
            "SELECT login_table, car_table, dump_table, max_users FROM sites WHERE site_no = ?",
        )
        .bind(i64::from(site_no))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("look up site", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let max_users: Option<i64> = row
            .try_get("max_users")
            .map_err(|e| storage_error("decode site", e))?;
        let max_users = max_users
            .map(u32::try_from)
            .transpose()
            .map_err(|_| Error::Config(format!("max_users of site {site_no} is out of range")))?;

        Ok(Some(SiteDefinition {
            site_no,
            login_table: row
                .try_get("login_table")
                .map_err(|e| storage_error("decode site", e))?,
            car_table: row
                .try_get("car_table")
                .map_err(|e| storage_error("decode site", e))?,
            dump_table: row
                .try_get("dump_table")
                .map_err(|e| storage_error("decode site", e))?,
            max_users,
        }))
    }

    async fn list_sites(&self) -> Result<Vec<SiteNo>> {
        let values: Vec<i64> = sqlx::query_scalar("SELECT site_no FROM sites ORDER BY site_no")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list sites", e))?;

        values.into_iter().map(SiteNo::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteCarStore, SqliteStoreConfig};
    use tempfile::TempDir;

    async fn directory() -> (TempDir, SqliteSiteDirectory) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("sites.db").display());
        let store = SqliteCarStore::connect(&url, SqliteStoreConfig::default())
            .await
            .unwrap();
        (dir, store.site_directory())
    }

    #[tokio::test]
    async fn test_lookup_missing_site() {
        let (_dir, directory) = directory().await;
        let site = SiteNo::new(9).unwrap();
        assert!(directory.lookup(site).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let (_dir, directory) = directory().await;
        let site = SiteNo::new(3).unwrap();
        let definition = SiteDefinition {
            max_users: Some(10),
            ..SiteDefinition::conventional(site)
        };

        directory.register_site(&definition).await.unwrap();
        assert_eq!(directory.lookup(site).await.unwrap(), Some(definition));

        let renamed = SiteDefinition {
            car_table: "site3_cars_v2".to_string(),
            ..SiteDefinition::conventional(site)
        };
        directory.register_site(&renamed).await.unwrap();
        assert_eq!(directory.lookup(site).await.unwrap(), Some(renamed));
    }

    #[tokio::test]
    async fn test_raw_names_are_returned_unvalidated() {
        let (_dir, directory) = directory().await;
        let site = SiteNo::new(4).unwrap();
        let definition = SiteDefinition {
            car_table: "cars; DROP TABLE sites".to_string(),
            ..SiteDefinition::conventional(site)
        };

        directory.register_site(&definition).await.unwrap();
        let found = directory.lookup(site).await.unwrap().unwrap();
        assert_eq!(found.car_table, "cars; DROP TABLE sites");
    }

    #[tokio::test]
    async fn test_list_sites() {
        let (_dir, directory) = directory().await;
        for n in [5, 2, 7] {
            let site = SiteNo::new(n).unwrap();
            directory
                .register_site(&SiteDefinition::conventional(site))
                .await
                .unwrap();
        }

        let sites: Vec<u32> = directory
            .list_sites()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.get())
            .collect();
        assert_eq!(sites, vec![2, 5, 7]);
    }
}
