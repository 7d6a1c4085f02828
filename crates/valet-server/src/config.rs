use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use valet_core::{Error, Result, SiteDefinition, SiteNo, TenantTables};
use valet_store_sqlite::SqliteStoreConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub sites: SitesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite url, e.g. `sqlite://~/.valet/valet.db`. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long a request waits for a free pool connection
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_false")]
    pub log_sql_queries: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Offset from UTC, in minutes, of the calendar day used for "today"
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSource {
    /// The `sites` table of the database
    #[default]
    Database,
    /// The `sites.definitions` list of this file
    Static,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SitesConfig {
    #[serde(default)]
    pub source: SiteSource,

    #[serde(default)]
    pub definitions: Vec<SiteEntry>,
}

/// A statically configured site. Omitted table names follow the
/// `site_<n>_cars` / `site_<n>_dump` / `site_<n>_users` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteEntry {
    pub site_no: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<u32>,
}

impl SiteEntry {
    pub fn definition(&self) -> Result<SiteDefinition> {
        let conventional = SiteDefinition::conventional(SiteNo::new(self.site_no)?);
        Ok(SiteDefinition {
            car_table: self.car_table.clone().unwrap_or(conventional.car_table),
            dump_table: self.dump_table.clone().unwrap_or(conventional.dump_table),
            login_table: self.login_table.clone().unwrap_or(conventional.login_table),
            site_no: conventional.site_no,
            max_users: self.max_users,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
            sites: SitesConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_sql_queries: false,
        }
    }
}

impl ServerConfig {
    /// Load a YAML or TOML file (chosen by extension)
    pub fn from_file(path: &str) -> Result<Self> {
        // Expand tilde in path
        let expanded = shellexpand::tilde(path);
        let path = PathBuf::from(expanded.as_ref());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {}", e)))
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {}", e)))
        }
    }

    /// File (if any), then environment overrides, then validation
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("VALET_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("VALET_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => eprintln!("Warning: Invalid VALET_PORT '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("VALET_DATABASE_URL") {
            self.database.url = Some(val);
        }

        if let Ok(val) = std::env::var("VALET_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("VALET_LOG_FORMAT") {
            match val.to_lowercase().as_str() {
                "text" => self.logging.format = LogFormat::Text,
                "json" => self.logging.format = LogFormat::Json,
                _ => eprintln!("Warning: Invalid VALET_LOG_FORMAT '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("VALET_UTC_OFFSET_MINUTES") {
            match val.parse::<i32>() {
                Ok(minutes) => self.stats.utc_offset_minutes = minutes,
                Err(_) => {
                    eprintln!("Warning: Invalid VALET_UTC_OFFSET_MINUTES '{}', ignoring", val)
                }
            }
        }
    }

    /// Fail fast on anything the server cannot start with
    pub fn validate(&self) -> Result<()> {
        match self.database.url.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(Error::Config(
                    "database.url is required (or set VALET_DATABASE_URL)".to_string(),
                ));
            }
            Some(_) => {}
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid logging.level '{}', expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        self.utc_offset()?;

        if self.sites.source == SiteSource::Static {
            if self.sites.definitions.is_empty() {
                return Err(Error::Config(
                    "sites.definitions must list at least one site when sites.source is 'static'"
                        .to_string(),
                ));
            }
            self.static_sites()?;
        }

        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.stats
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!(
                    "stats.utc_offset_minutes out of range: {}",
                    self.stats.utc_offset_minutes
                ))
            })
    }

    /// Database url with `~` expanded in the file path
    pub fn database_url(&self) -> Result<String> {
        let url = self
            .database
            .url
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| Error::Config("database.url is required".to_string()))?;

        Ok(match url.strip_prefix("sqlite://") {
            Some(path) => format!("sqlite://{}", shellexpand::tilde(path)),
            None => shellexpand::tilde(url).into_owned(),
        })
    }

    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig::default()
            .with_max_connections(self.database.max_connections)
            .with_busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .with_acquire_timeout(Duration::from_millis(self.database.acquire_timeout_ms))
    }

    /// Validated definitions of statically configured sites
    pub fn static_sites(&self) -> Result<Vec<SiteDefinition>> {
        let mut seen = HashSet::new();
        let mut sites = Vec::with_capacity(self.sites.definitions.len());

        for entry in &self.sites.definitions {
            let definition = entry
                .definition()
                .map_err(|e| Error::Config(format!("sites.definitions: {}", e)))?;
            if !seen.insert(definition.site_no) {
                return Err(Error::Config(format!(
                    "sites.definitions: site {} listed twice",
                    definition.site_no
                )));
            }
            TenantTables::from_definition(&definition)
                .map_err(|e| Error::Config(format!("sites.definitions: {}", e)))?;
            sites.push(definition);
        }

        Ok(sites)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_false() -> bool {
    false
}
