//! Valet server binary
//!
//! Loads configuration, opens the SQLite store and serves the engine over HTTP.

mod app;
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{LogFormat, ServerConfig, SiteSource};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use valet_core::{SiteDirectory, TenantTables};
use valet_engine::{StaticSiteDirectory, ValetEngine};
use valet_store_sqlite::SqliteCarStore;

/// Valet parking server
#[derive(Parser)]
#[command(name = "valet-server")]
#[command(about = "Tenant-scoped valet parking car lifecycle service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "VALET_CONFIG",
        global = true
    )]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default if no command specified)
    Serve,
    /// Create the site directory and the tables of every known site
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration faults abort before anything binds
    let config = ServerConfig::load(cli.config.as_deref())?;
    init_tracing(&config)?;

    match cli.command {
        Some(Commands::InitDb) => init_db(&config).await,
        Some(Commands::Serve) | None => serve(config).await,
    }
}

fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // sqlx logs every statement at INFO; keep it quiet unless asked
    if !config.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Warning: Failed to parse sqlx log directive: {}", e),
        }
    }

    match config.logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_env_filter(filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<SqliteCarStore>> {
    let url = config.database_url()?;
    let store = SqliteCarStore::connect(&url, config.store_config())
        .await
        .with_context(|| format!("Failed to open database {}", url))?;
    info!("Opened database {}", url);
    Ok(Arc::new(store))
}

async fn init_db(config: &ServerConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let directory = store.site_directory();

    for definition in config.static_sites()? {
        directory.register_site(&definition).await?;
    }

    let mut provisioned = 0;
    for site_no in directory.list_sites().await? {
        let Some(definition) = directory.lookup(site_no).await? else {
            continue;
        };
        match TenantTables::from_definition(&definition) {
            Ok(tables) => {
                store.provision_site(&tables).await?;
                provisioned += 1;
            }
            Err(e) => warn!(site_no = %site_no, "Skipping site: {}", e),
        }
    }

    info!("Database initialized, {} site(s) provisioned", provisioned);
    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_store(&config).await?;

    let directory: Arc<dyn SiteDirectory> = match config.sites.source {
        SiteSource::Database => Arc::new(store.site_directory()),
        SiteSource::Static => Arc::new(StaticSiteDirectory::new(config.static_sites()?)),
    };

    let sites = directory.list_sites().await?;
    if sites.is_empty() {
        warn!("No sites configured; every tenant request will be rejected");
    } else {
        info!("Serving {} site(s)", sites.len());
    }

    let engine = ValetEngine::new(store, directory).with_utc_offset(config.utc_offset()?);
    let app = app::router(app::AppState::new(Arc::new(engine)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Valet server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
