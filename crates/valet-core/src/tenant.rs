//! Tenant types: site numbers and validated data-set handles

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

static SAFE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

/// Positive integer identifying a tenant ("site").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SiteNo(u32);

impl SiteNo {
    /// Create a site number, rejecting zero, negatives and out-of-range values
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(Error::InvalidTenant(format!(
                "Site number must be positive, got {}",
                value
            )));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| Error::InvalidTenant(format!("Site number out of range: {}", value)))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for SiteNo {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SiteNo> for i64 {
    fn from(site: SiteNo) -> Self {
        i64::from(site.0)
    }
}

impl FromStr for SiteNo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|e| Error::InvalidTenant(format!("Invalid site number {:?}: {}", s, e)))?;
        Self::new(value)
    }
}

impl fmt::Display for SiteNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A data-set (table) name that passed the identifier safety check.
///
/// The only way to obtain one is [`TableName::parse`], so storage adapters
/// may interpolate it into statements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(site_no: SiteNo, name: &str) -> Result<Self> {
        if SAFE_IDENTIFIER.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::UnsafeIdentifier {
                site_no: site_no.to_string(),
                name: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw site configuration as stored by a [`crate::SiteDirectory`].
///
/// Names are unchecked until turned into [`TenantTables`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub site_no: SiteNo,
    /// Active car records
    pub car_table: String,
    /// Archived (handed-over) car records
    pub dump_table: String,
    /// Credentials and roles
    pub login_table: String,
    /// Cap on the number of users of the site; `None` is unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<u32>,
}

impl SiteDefinition {
    /// Conventional table names for a site (`site_<n>_cars`, ...)
    pub fn conventional(site_no: SiteNo) -> Self {
        Self {
            site_no,
            car_table: format!("site_{}_cars", site_no),
            dump_table: format!("site_{}_dump", site_no),
            login_table: format!("site_{}_users", site_no),
            max_users: None,
        }
    }
}

/// Resolved, validated data-set handles for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantTables {
    pub site_no: SiteNo,
    pub active: TableName,
    pub archive: TableName,
    pub users: TableName,
    pub max_users: Option<u32>,
}

impl TenantTables {
    /// Validate every name of a site definition.
    ///
    /// # Errors
    /// - `Error::UnsafeIdentifier` naming the first offending table
    pub fn from_definition(definition: &SiteDefinition) -> Result<Self> {
        let site_no = definition.site_no;
        Ok(Self {
            site_no,
            active: TableName::parse(site_no, &definition.car_table)?,
            archive: TableName::parse(site_no, &definition.dump_table)?,
            users: TableName::parse(site_no, &definition.login_table)?,
            max_users: definition.max_users,
        })
    }
}
