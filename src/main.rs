//! Sheet Store Server
//!
//! Serves the document API over a spreadsheet backend, or prepares and checks
//! the backend with the `setup` and `check` subcommands.

use clap::{Arg, ArgMatches, Command};
use sheet_store::api::{start_server, AppState};
use sheet_store::core::config::parse_backend;
use sheet_store::storage::{create_transport, Database, StoreOptions};
use sheet_store::{core::Config, Result};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let matches = Command::new("sheet-store")
        .version(sheet_store::VERSION)
        .about("Document store over a remote spreadsheet.")
        .subcommand(Command::new("serve").about("Serve the HTTP API (default)"))
        .subcommand(Command::new("setup").about("Create any missing collection sheets"))
        .subcommand(Command::new("check").about("Test connectivity to the backend"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("http-addr")
                .long("http-addr")
                .value_name("ADDR")
                .global(true)
                .help("HTTP server bind address"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_name("TYPE")
                .global(true)
                .help("Storage backend (memory, sheets)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .get_matches();

    // Load configuration
    let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
        Config::load_from(config_path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    apply_cli_overrides(&mut config, &matches)?;
    config.validate()?;

    sheet_store::init(&config.logging)?;
    info!("Starting Sheet Store v{}", sheet_store::VERSION);

    let db = Database::new();
    db.connect(create_transport(&config.store)?, StoreOptions::from(&config.store))?;

    match matches.subcommand_name() {
        Some("setup") => setup(&db, &config).await,
        Some("check") => check(&db, &config).await,
        _ => serve(db, config).await,
    }
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(addr) = matches.get_one::<String>("http-addr") {
        config.server.http_addr = addr
            .parse()
            .map_err(|e| sheet_store::Error::config(format!("Invalid HTTP address: {}", e)))?;
    }

    if let Some(backend) = matches.get_one::<String>("backend") {
        config.store.backend = parse_backend(backend)?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    Ok(())
}

async fn serve(db: Database, config: Config) -> Result<()> {
    let state = AppState::new(db, config.store.collections.clone(), config.metrics.enable_prometheus)
        .with_request_timeout(config.server.request_timeout);

    info!(backend = ?config.store.backend, "Starting HTTP server on {}", config.server.http_addr);
    start_server(config.server.http_addr, state, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Create every configured collection that does not exist yet
async fn setup(db: &Database, config: &Config) -> Result<()> {
    let created = db.ensure_collections(&config.store.collections).await?;
    if created.is_empty() {
        info!("All {} collections already exist", config.store.collections.len());
    } else {
        info!(created = ?created, "Created {} collections", created.len());
    }
    Ok(())
}

/// Connectivity test: list sheets and read each configured header row
async fn check(db: &Database, config: &Config) -> Result<()> {
    let existing = db.ping().await?;
    info!("Connected, backend holds {} sheets", existing.len());

    for name in &config.store.collections {
        if !existing.contains(name) {
            warn!(collection = %name, "Collection missing, run `sheet-store setup`");
            continue;
        }
        let collection = db.collection(name.as_str());
        let headers = collection.headers().await?;
        let documents = collection.find_all().await?;
        info!(
            collection = %name,
            headers = headers.len(),
            documents = documents.len(),
            "Collection reachable"
        );
    }
    Ok(())
}

/// Setup graceful shutdown signal handling
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
    warn!("Received shutdown signal, initiating graceful shutdown...");
}
