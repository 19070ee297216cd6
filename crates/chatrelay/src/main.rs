use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::{Config, Credentials};
use chatrelay::dispatch::Dispatcher;
use chatrelay::llm::ProviderRegistry;
use chatrelay::server::{AppState, DEFAULT_LOG_FILTER, build_app};

#[derive(Debug, Parser)]
#[command(name = "chatrelay", version, about)]
struct Cli {
    /// Path to the YAML config file. A missing file means defaults.
    #[arg(short, long, default_value = "chatrelay.yaml")]
    config: PathBuf,

    /// Listen address (overrides `server.host`).
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides `server.port`).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials usually live in a .env next to the binary.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let credentials = Credentials::from_env(&config.providers);
    let providers = ProviderRegistry::from_config(&config.providers, &credentials)
        .context("building provider clients")?;

    let app = build_app(AppState {
        dispatcher: Dispatcher::new(providers),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "chatrelay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chatrelay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
