//! Tenant registry
//!
//! Resolves a site number to validated [`TenantTables`]. Resolutions are
//! cached in a concurrent map; callers that know the site configuration
//! changed can invalidate an entry or force a fresh resolve.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use valet_core::{Error, Result, SiteDirectory, SiteNo, TenantTables};

/// Anything that can name a tenant
pub trait IntoSiteNo {
    /// # Errors
    /// - `Error::InvalidTenant` when the value is not a positive integer
    fn into_site_no(self) -> Result<SiteNo>;
}

impl IntoSiteNo for SiteNo {
    fn into_site_no(self) -> Result<SiteNo> {
        Ok(self)
    }
}

impl IntoSiteNo for i64 {
    fn into_site_no(self) -> Result<SiteNo> {
        SiteNo::new(self)
    }
}

impl IntoSiteNo for i32 {
    fn into_site_no(self) -> Result<SiteNo> {
        SiteNo::new(i64::from(self))
    }
}

impl IntoSiteNo for u32 {
    fn into_site_no(self) -> Result<SiteNo> {
        SiteNo::new(i64::from(self))
    }
}

impl IntoSiteNo for u64 {
    fn into_site_no(self) -> Result<SiteNo> {
        let value = i64::try_from(self)
            .map_err(|_| Error::InvalidTenant(format!("Site number out of range: {}", self)))?;
        SiteNo::new(value)
    }
}

impl IntoSiteNo for &str {
    fn into_site_no(self) -> Result<SiteNo> {
        self.parse()
    }
}

impl IntoSiteNo for String {
    fn into_site_no(self) -> Result<SiteNo> {
        self.parse()
    }
}

/// Cached site-number to table-handle resolver
pub struct TenantRegistry {
    directory: Arc<dyn SiteDirectory>,
    cache: DashMap<SiteNo, Arc<TenantTables>>,
    /// Bumped by every invalidation. A resolve that started under an older
    /// generation returns its result without caching it.
    generation: AtomicU64,
}

impl TenantRegistry {
    pub fn new(directory: Arc<dyn SiteDirectory>) -> Self {
        Self {
            directory,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a tenant, serving from the cache when possible
    ///
    /// # Errors
    /// - `Error::InvalidTenant` if the site number is not positive or unknown
    /// - `Error::UnsafeIdentifier` if a configured table name fails validation
    pub async fn resolve(&self, site: impl IntoSiteNo) -> Result<Arc<TenantTables>> {
        let site_no = site.into_site_no()?;
        if let Some(tables) = self.cache.get(&site_no) {
            return Ok(Arc::clone(tables.value()));
        }
        self.resolve_fresh(site_no).await
    }

    /// Resolve a tenant from the directory, replacing any cached entry
    pub async fn resolve_fresh(&self, site: impl IntoSiteNo) -> Result<Arc<TenantTables>> {
        let site_no = site.into_site_no()?;
        let generation = self.generation.load(Ordering::Acquire);

        let definition = match self.directory.lookup(site_no).await? {
            Some(definition) => definition,
            None => {
                self.cache.remove(&site_no);
                return Err(Error::InvalidTenant(format!(
                    "No configuration for site {}",
                    site_no
                )));
            }
        };

        let tables = match TenantTables::from_definition(&definition) {
            Ok(tables) => Arc::new(tables),
            Err(e) => {
                self.cache.remove(&site_no);
                warn!(site_no = %site_no, "Rejected site configuration: {}", e);
                return Err(e);
            }
        };

        // The shard lock held by the entry orders this check against the
        // bump-then-remove of a concurrent invalidation
        match self.cache.entry(site_no) {
            Entry::Occupied(mut entry) if self.generation.load(Ordering::Acquire) == generation => {
                entry.insert(Arc::clone(&tables));
            }
            Entry::Vacant(entry) if self.generation.load(Ordering::Acquire) == generation => {
                entry.insert(Arc::clone(&tables));
            }
            _ => {
                debug!(site_no = %site_no, "Site invalidated during resolve; not caching");
                return Ok(tables);
            }
        }

        debug!(site_no = %site_no, active = %tables.active, "Resolved site");
        Ok(tables)
    }

    /// Drop a cached resolution; the next resolve reads the directory
    pub fn invalidate(&self, site_no: SiteNo) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(&site_no);
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
    }

    /// Number of cached resolutions
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
