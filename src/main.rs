use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drivr::client::{AuthClient, HttpAuthApi, HttpSessionMint};
use drivr::config::Config;
use drivr::AppState;

#[derive(Parser, Debug)]
#[command(name = "drivr")]
#[command(author, version, about = "Session and authentication core for a driving-instructor marketplace", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "drivr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Server origin the auth subcommands talk to
    #[arg(long, env = "DRIVR_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Smoke-test commands that drive the client auth flow against a running
/// server.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in against the upstream API and mint a session cookie
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the session on the server
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Login { email, password }) => run_login(&cli.api_url, &config, &email, &password).await,
        Some(Commands::Logout) => run_logout(&cli.api_url, &config).await,
        None => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting drivr v{}", env!("CARGO_PKG_VERSION"));

    if config.using_dev_secret_in_production() {
        tracing::warn!(
            "Running in production with the development session secret; set {} before deploying",
            drivr::config::SESSION_SECRET_ENV
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config));
    let app = drivr::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn auth_client(api_url: &str, config: &Config) -> Result<AuthClient> {
    let timeout = Duration::from_secs(config.upstream.timeout_secs);
    let api = HttpAuthApi::new(config.upstream.base_url.clone(), timeout)?;
    let sessions = HttpSessionMint::new(api_url.to_string(), timeout)?;
    Ok(AuthClient::new(Arc::new(api), Arc::new(sessions)))
}

async fn run_login(api_url: &str, config: &Config, email: &str, password: &str) -> Result<()> {
    let mut client = auth_client(api_url, config)?;

    match client.login(email, password).await {
        Ok(()) => {
            let user = client.user().expect("authenticated client has a user");
            println!("Signed in as {} ({})", user.email, user.account_type);
            Ok(())
        }
        Err(err) if err.is_retryable() => {
            eprintln!("{} (retryable)", err);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

async fn run_logout(api_url: &str, config: &Config) -> Result<()> {
    let mut client = auth_client(api_url, config)?;
    client.logout().await;
    println!("Signed out");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
