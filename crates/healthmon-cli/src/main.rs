//! healthmon - terminal front end for the MyDataHelps participant session.
//!
//! Signs in through the project's OAuth2 server, links Fitbit through the
//! provider's authorization page and reads back participant and Fitbit data.

mod browser;
mod commands;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use healthmon_core::auth::{
    AuthError, AuthSession, CredentialStore, EncryptedFileStore, KeyringStore, DEFAULT_FITBIT_DAYS,
};
use healthmon_core::cache::CacheManager;
use healthmon_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use browser::ConsoleBrowser;

/// How long to wait for a pasted redirect before giving up
const BROWSER_TIMEOUT_SECS: u64 = 600;

#[derive(Parser)]
#[command(name = "healthmon")]
#[command(about = "Sign in to MyDataHelps, link Fitbit and read health data")]
#[command(version)]
struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Keep credentials in an encrypted file instead of the OS keychain
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Passphrase for --vault
    #[arg(long, env = "HEALTHMON_VAULT_PASSPHRASE", hide_env_values = true, global = true)]
    vault_passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in through the browser
    Login {
        /// Start a new sign-in even when a session exists
        #[arg(long)]
        force: bool,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show session state
    Status,
    /// Link an external account
    Connect {
        #[arg(default_value = "Fitbit")]
        provider: String,
    },
    /// List linked external accounts
    Accounts,
    /// Show recent Fitbit activity and heart rate
    Fitbit {
        #[arg(long, default_value_t = DEFAULT_FITBIT_DAYS)]
        days: u32,
        /// Use the cached snapshot without contacting the server
        #[arg(long)]
        offline: bool,
    },
    /// Issue an authenticated request and print the JSON response
    Call {
        /// Path relative to the API base, e.g. /participants/me
        endpoint: String,
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
        /// JSON body (query parameters for GET)
        #[arg(long, short = 'd')]
        data: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g. RUST_LOG=healthmon_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "healthmon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("healthmon starting");

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if e
                .downcast_ref::<AuthError>()
                .is_some_and(AuthError::requires_reauthentication)
            {
                eprintln!("Your session has ended. Run `healthmon login` to sign in again.");
            }
            Err(e)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    config.apply_env()?;

    let store = open_store(cli.vault.as_deref(), cli.vault_passphrase.as_deref())?;
    let browser = Arc::new(ConsoleBrowser::new(Duration::from_secs(BROWSER_TIMEOUT_SECS)));
    let cache = CacheManager::new(config.cache_dir()?)?;

    let session = Arc::new(AuthSession::new(config, store, browser)?);
    session.initialize().await;

    match cli.command {
        Command::Login { force } => commands::login(&session, force).await,
        Command::Logout => commands::logout(&session, &cache).await,
        Command::Status => commands::status(&session, &cache).await,
        Command::Connect { provider } => commands::connect(&session, &provider).await,
        Command::Accounts => commands::accounts(&session).await,
        Command::Fitbit { days, offline } => {
            commands::fitbit(&session, &cache, days, offline).await
        }
        Command::Call {
            endpoint,
            method,
            data,
        } => commands::call(&session, &endpoint, &method, data.as_deref()).await,
    }
}

fn open_store(vault: Option<&Path>, passphrase: Option<&str>) -> Result<Arc<dyn CredentialStore>> {
    match vault {
        Some(path) => {
            let passphrase = passphrase
                .filter(|p| !p.is_empty())
                .context("--vault needs a passphrase (set HEALTHMON_VAULT_PASSPHRASE)")?;
            let store = EncryptedFileStore::open(path, passphrase)
                .with_context(|| format!("Failed to open vault {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(KeyringStore::new())),
    }
}
