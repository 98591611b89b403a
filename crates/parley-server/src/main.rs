//! Parley server - HTTP front end for agent conversation sessions
//!
//! Hosts a [`SessionManager`] behind a small JSON API and streams each
//! session's events to the client as server-sent events.

mod echo;
mod routes;
mod stdio;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_core::{Config, ConversationEngine, EngineKind, SessionInit, SessionManager};

use echo::EchoEngine;
use routes::AppState;
use stdio::StdioEngine;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Session server for streaming agent conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,parley_core=debug,parley_server=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn build_engine(config: &Config) -> anyhow::Result<Arc<dyn ConversationEngine>> {
    let engine: Arc<dyn ConversationEngine> = match config.engine.kind {
        EngineKind::Echo => Arc::new(EchoEngine::new()),
        EngineKind::Stdio => {
            let command = config.engine.require_command()?;
            Arc::new(StdioEngine::new(command, config.engine.args.clone()))
        }
    };
    Ok(engine)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    let options = config.engine.to_options();
    let sessions = Arc::new(
        SessionManager::new(engine, move || {
            SessionInit::new(()).with_options(options.clone())
        })
        .with_idle_timeout(config.session.idle_timeout()),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(run_cleanup(
        sessions.clone(),
        config.session.cleanup_interval(),
        shutdown.clone(),
    ));

    let app = routes::router(AppState::new(sessions.clone()), &config.server);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        %addr,
        base_path = %config.server.base_path,
        engine = ?config.engine.kind,
        "Parley server listening"
    );

    let shutdown_sessions = sessions.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            // Open event streams only end once their sessions do
            let aborted = shutdown_sessions.abort_all();
            info!(aborted, "Shutting down");
        })
        .await?;

    shutdown.cancel();
    Ok(())
}

async fn run_cleanup(
    sessions: Arc<SessionManager<()>>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = sessions.cleanup();
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "Evicted idle sessions");
                }
            }
        }
    }
}
