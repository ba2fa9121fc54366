//! fedsend binary entry point

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fedsend::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Send ActivityPub notes to remote inboxes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deliver a direct note from a local actor to one remote account
    Send {
        /// Local actor username
        #[arg(short, long)]
        from: String,
        /// Recipient address (user@host)
        #[arg(short, long)]
        to: String,
        /// Note content
        #[arg(short, long)]
        message: String,
    },
    /// Serve WebFinger, actor documents and inboxes for local actors
    Server,
}

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics and AppState
/// 4. Run the selected command
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fedsend: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);

    // 3. Initialize metrics and state
    fedsend::metrics::init_metrics();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            return ExitCode::FAILURE;
        }
    };

    // 4. Run
    let outcome = match cli.command {
        Command::Send { from, to, message } => send(&state, &from, &to, &message).await,
        Command::Server => serve(state).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fedsend failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(logging: &config::LoggingConfig) {
    let default_filter = format!("fedsend={},tower_http=debug", logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn send(state: &AppState, from: &str, to: &str, message: &str) -> anyhow::Result<()> {
    let result = state.dispatcher.send(from, to, message).await?;

    tracing::info!(
        inbox = %result.inbox_uri,
        activity = %result.activity_id,
        success = result.success,
        status = ?result.status_code,
        body = ?result.body,
        "Delivery finished"
    );

    if !result.success {
        anyhow::bail!(
            "delivery to {} failed: {}",
            result.inbox_uri,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let public_url = state.config.server.base_url().to_string();
    let app = fedsend::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", public_url);

    axum::serve(listener, app).await?;
    Ok(())
}
