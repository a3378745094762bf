//! tablekit - command-line session client for the table-extraction service.
//!
//! Signs in, registers and signs out against the backend API, keeping the
//! session in the same durable storage the other tablekit hosts use.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tablekit_core::{
    ApiSettings, AuthOutcome, Config, FileStore, Gate, HeadlessNavigator, SessionStore,
};

/// Log file written inside the cache directory
const LOG_FILE: &str = "tablekit.log";

#[derive(Parser)]
#[command(name = "tablekit", version, about = "Session client for the tablekit service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login { username: Option<String> },
    /// Create a new account
    Register { username: Option<String> },
    /// Sign out and purge this user's cached data
    Logout,
    /// Show who is signed in
    Status,
    /// Show the resolved API endpoints
    Endpoints,
}

/// Initialize the tracing subscriber for logging.
///
/// Stderr gets `RUST_LOG` filtered output (default `warn`); the log file in
/// the cache directory gets everything at `debug`.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(filter);

    let (file_layer, guard) = match Config::cache_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("tablekit_core=debug,tablekit=debug"));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_username(given: Option<String>, last: Option<&str>) -> Result<String> {
    if let Some(username) = given {
        return Ok(username);
    }
    match last {
        Some(last) => {
            let input = prompt_line(&format!("Username [{}]", last))?;
            Ok(if input.is_empty() { last.to_string() } else { input })
        }
        None => prompt_line("Username"),
    }
}

fn report(outcome: &AuthOutcome) -> ExitCode {
    match outcome {
        AuthOutcome::Success { .. } => {
            println!("{}", outcome);
            ExitCode::SUCCESS
        }
        AuthOutcome::Failure { error } => {
            eprintln!("Error: {}", error);
            ExitCode::FAILURE
        }
    }
}

/// Wire storage, navigator, gate and store together
fn open_store(settings: &ApiSettings) -> Result<SessionStore> {
    let storage = Arc::new(
        FileStore::open(&Config::cache_dir()?).context("Failed to open session storage")?,
    );
    let navigator = Arc::new(HeadlessNavigator::default());
    let gate = Gate::new(settings.base_url(), storage, navigator)
        .context("Failed to create HTTP client")?;
    Ok(SessionStore::new(Arc::new(gate)))
}

fn print_status(store: &SessionStore) {
    let Some(user) = store.user() else {
        println!("Not signed in");
        return;
    };
    println!("Signed in as {} (id {})", user.username, user.id);

    if let Some(cache) = store.cache() {
        match cache.load_last_record::<serde_json::Value>() {
            Ok(Some(record)) => println!("Last record cached {}", record.age_display()),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Unreadable cached record"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = init_tracing();
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %format!("{:#}", e), "Ignoring unreadable config");
        Config::default()
    });

    let settings = ApiSettings::from_env().with_fallback_url(config.api_url.clone());
    debug!(?settings, "Resolved API settings");

    let code = match cli.command {
        Command::Endpoints => {
            println!("API URL:      {}", settings.resolve_api_url());
            println!("Proxy target: {}", settings.proxy_target());
            println!("Requests go:  {}", settings.base_url());
            ExitCode::SUCCESS
        }
        Command::Login { username } => {
            let store = open_store(&settings)?;
            let username = prompt_username(username, config.last_username.as_deref())?;
            let password = rpassword::prompt_password("Password: ")?;
            let outcome = store.login(&username, &password).await;
            if outcome.is_success() {
                config.last_username = Some(username);
                if let Err(e) = config.save() {
                    warn!(error = %format!("{:#}", e), "Failed to save config");
                }
            }
            report(&outcome)
        }
        Command::Register { username } => {
            let store = open_store(&settings)?;
            let username = prompt_username(username, None)?;
            let password = rpassword::prompt_password("Password: ")?;
            report(&store.register(&username, &password).await)
        }
        Command::Logout => {
            open_store(&settings)?.logout();
            println!("Signed out");
            ExitCode::SUCCESS
        }
        Command::Status => {
            print_status(&open_store(&settings)?);
            ExitCode::SUCCESS
        }
    };

    info!("tablekit finished");
    Ok(code)
}
