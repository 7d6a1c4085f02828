//! Site directory built from configuration

use async_trait::async_trait;
use std::collections::HashMap;
use valet_core::{Result, SiteDefinition, SiteDirectory, SiteNo};

/// In-memory site directory, for sites listed in the server configuration
#[derive(Debug, Clone, Default)]
pub struct StaticSiteDirectory {
    sites: HashMap<SiteNo, SiteDefinition>,
}

impl StaticSiteDirectory {
    pub fn new(definitions: impl IntoIterator<Item = SiteDefinition>) -> Self {
        Self {
            sites: definitions
                .into_iter()
                .map(|definition| (definition.site_no, definition))
                .collect(),
        }
    }
}

#[async_trait]
impl SiteDirectory for StaticSiteDirectory {
    async fn lookup(&self, site_no: SiteNo) -> Result<Option<SiteDefinition>> {
        Ok(self.sites.get(&site_no).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<SiteNo>> {
        let mut sites: Vec<SiteNo> = self.sites.keys().copied().collect();
        sites.sort();
        Ok(sites)
    }
}
