//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::csv_adapter::CsvStockReader;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::account_service;
use crate::domain::config_validation::{Backend, interest_rate, validate_store_config};
use crate::domain::credentials::hash_password;
use crate::domain::error::StsError;
use crate::domain::stock_service;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "stsserver", about = "Stock trading system backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create tables and seed the interest rate
    InitSchema {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load the stock catalog from a CSV file
    ImportStocks {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Re-key a securities account and relink its fund accounts
    AlterSecuritiesId {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        from: i64,
        #[arg(long)]
        to: i64,
    },
    /// Credit interest to every active fund account
    AccrueInterest {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Output an argon2 hash for a password read from stdin
    HashPassword,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitSchema { config } => run_init_schema(&config),
        Command::ImportStocks { config, file } => run_import_stocks(&config, &file),
        Command::AlterSecuritiesId { config, from, to } => {
            run_alter_securities_id(&config, from, to)
        }
        Command::AccrueInterest { config } => run_accrue_interest(&config),
        Command::HashPassword => run_hash_password(),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, kind = e.kind().as_str(), "command failed");
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StsError> {
    let config = FileConfigAdapter::from_file(path)?;
    init_logging(Some(&config as &dyn ConfigPort));
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Install the global subscriber. `RUST_LOG` wins over `[logging] filter`.
///
/// Later calls are ignored, so tests may call this freely.
pub fn init_logging(config: Option<&dyn ConfigPort>) {
    let fallback = config
        .and_then(|c| c.get_string("logging", "filter"))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// Open the configured backend without touching its schema.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn StorePort>, StsError> {
    connect(config, false)
}

/// Open the configured backend, creating tables and seeding the rate row.
pub fn bootstrap_store(config: &dyn ConfigPort) -> Result<Arc<dyn StorePort>, StsError> {
    connect(config, true)
}

fn connect(config: &dyn ConfigPort, bootstrap: bool) -> Result<Arc<dyn StorePort>, StsError> {
    match validate_store_config(config)? {
        Backend::Sqlite => connect_sqlite(config, bootstrap),
        Backend::Postgres => connect_postgres(config, bootstrap),
    }
}

#[cfg(feature = "sqlite")]
fn connect_sqlite(
    config: &dyn ConfigPort,
    bootstrap: bool,
) -> Result<Arc<dyn StorePort>, StsError> {
    use crate::adapters::sqlite_adapter::SqliteStore;

    let store = SqliteStore::from_config(config)?;
    if bootstrap {
        store.initialize_schema(interest_rate(config))?;
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn connect_sqlite(
    _config: &dyn ConfigPort,
    _bootstrap: bool,
) -> Result<Arc<dyn StorePort>, StsError> {
    Err(backend_not_built("sqlite"))
}

#[cfg(feature = "postgres")]
fn connect_postgres(
    config: &dyn ConfigPort,
    bootstrap: bool,
) -> Result<Arc<dyn StorePort>, StsError> {
    use crate::adapters::postgres_adapter::PostgresStore;

    let store = PostgresStore::from_config(config)?;
    if bootstrap {
        store.initialize_schema(interest_rate(config))?;
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
fn connect_postgres(
    _config: &dyn ConfigPort,
    _bootstrap: bool,
) -> Result<Arc<dyn StorePort>, StsError> {
    Err(backend_not_built("postgres"))
}

#[allow(dead_code)]
fn backend_not_built(backend: &str) -> StsError {
    StsError::ConfigInvalid {
        section: "database".into(),
        key: "backend".into(),
        reason: format!("built without the {backend} feature"),
    }
}

#[cfg(feature = "web")]
fn run_serve(config_path: &Path) -> Result<(), StsError> {
    use crate::adapters::web::{AppState, build_router};
    use crate::domain::config_validation::{listen_addr, validate_server_config};
    use std::time::Duration;

    let config = load_config(config_path)?;
    validate_server_config(&config)?;

    let addr = listen_addr(&config)?;
    let request_timeout =
        Duration::from_secs(config.get_int("web", "request_timeout_secs", 30) as u64);
    let store = open_store(&config)?;
    let router = build_router(AppState {
        store,
        request_timeout,
    });

    tokio::runtime::Runtime::new()?.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
    })?;

    info!("server stopped");
    Ok(())
}

#[cfg(not(feature = "web"))]
fn run_serve(_config_path: &Path) -> Result<(), StsError> {
    Err(StsError::ConfigInvalid {
        section: "web".into(),
        key: "listen".into(),
        reason: "built without the web feature".into(),
    })
}

fn run_init_schema(config_path: &Path) -> Result<(), StsError> {
    let config = load_config(config_path)?;
    bootstrap_store(&config)?;
    eprintln!("schema ready");
    Ok(())
}

fn run_import_stocks(config_path: &Path, file: &Path) -> Result<(), StsError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let stocks = CsvStockReader::new(file).read_stocks()?;
    let imported = stock_service::import_stocks(store.as_ref(), &stocks)?;
    eprintln!("imported {imported} stocks from {}", file.display());
    Ok(())
}

fn run_alter_securities_id(config_path: &Path, from: i64, to: i64) -> Result<(), StsError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let moved = account_service::alter_securities_id(store.as_ref(), from, to)?;
    eprintln!("securities account {from} is now {to}; {moved} fund accounts relinked");
    Ok(())
}

fn run_accrue_interest(config_path: &Path) -> Result<(), StsError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let accrual = account_service::accrue_interest(store.as_ref())?;
    eprintln!(
        "credited {:.4} to {} fund accounts at rate {}",
        accrual.total, accrual.accounts, accrual.rate
    );
    Ok(())
}

fn run_hash_password() -> Result<(), StsError> {
    init_logging(None);
    eprintln!("Enter password to hash:");
    println!("{}", hash_first_line(io::stdin().lock())?);
    Ok(())
}

/// Hash the first line of `input`, without its line ending.
fn hash_first_line(input: impl BufRead) -> Result<String, StsError> {
    let password = input.lines().next().transpose()?.unwrap_or_default();
    let hash = hash_password(password.trim_end())?;
    info!("fund password hashed");
    Ok(hash)
}
