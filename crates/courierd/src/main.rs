//! # courierd
//!
//! Courier relay server binary — wires settings, provider, store, and the
//! HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use courier_llm::openai::{OpenAiConfig, OpenAiProvider};
use courier_llm::provider::StreamOptions;
use courier_relay::relay::RelayConfig;
use courier_relay::store::SessionStore;
use courier_server::{CourierServer, ServerConfig};
use courier_settings::{load_settings, load_settings_from_path, CourierSettings};

/// How often the idle-eviction sweep runs, at most.
const EVICTION_SWEEP_CAP: Duration = Duration::from_secs(60);

/// Courier relay server.
#[derive(Parser, Debug)]
#[command(name = "courierd", about = "Courier chat relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.courier/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load(cli: &Cli) -> Result<CourierSettings> {
    let settings = match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = load(&cli)?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let api_key = settings
        .provider
        .api_key
        .clone()
        .context("provider API key missing: set provider.apiKey or COURIER_API_KEY")?;

    let provider = Arc::new(OpenAiProvider::new(
        OpenAiConfig::new(api_key, settings.provider.model.clone())
            .with_base_url(settings.provider.base_url.clone()),
    ));
    let store = Arc::new(SessionStore::new());

    let server_config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_connections: settings.server.max_connections,
        send_queue_capacity: settings.server.send_queue_capacity,
    };
    let relay_config = RelayConfig {
        chunk_delay: Duration::from_millis(settings.relay.chunk_delay_ms),
        cancel_policy: settings.relay.cancel_policy,
    };
    let stream_options = StreamOptions {
        tool_choice: settings.provider.tool_choice,
        max_tokens: settings.provider.max_tokens,
        temperature: settings.provider.temperature,
    };

    let server = CourierServer::new(
        server_config,
        Arc::clone(&store),
        provider,
        relay_config,
        settings.relay.delivery_mode,
    )
    .with_stream_options(stream_options);

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    if let Some(secs) = settings.relay.session_idle_timeout_secs {
        background.push(spawn_idle_eviction(
            Arc::clone(&store),
            Duration::from_secs(secs),
            server.shutdown().token(),
        ));
    }

    let router = server.router();
    let bind_addr = server.config().bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        mode = ?settings.relay.delivery_mode,
        model = %settings.provider.model,
        "courier listening"
    );

    let shutdown = Arc::clone(server.shutdown());
    let signal_shutdown = Arc::clone(&shutdown);
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_shutdown.shutdown();
        }
    }));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.token().cancelled_owned())
        .await
        .context("server error")?;

    shutdown.graceful_shutdown(background, None).await;
    info!("courier stopped");
    Ok(())
}

/// Periodically evict sessions idle past `max_idle` until shutdown.
fn spawn_idle_eviction(
    store: Arc<SessionStore>,
    max_idle: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) -> JoinHandle<()> {
    let sweep = max_idle.min(EVICTION_SWEEP_CAP);
    info!(max_idle_secs = max_idle.as_secs(), "idle session eviction enabled");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = store.evict_idle(max_idle);
                    if evicted > 0 {
                        debug!(evicted, "idle sessions evicted");
                    }
                }
            }
        }
    })
}
