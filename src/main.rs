use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderName;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{BackendKind, GatekeeperConfig, LogFormat, LoggingConfig};
use gatekeeper::http::{actor, probe, HttpServer, RateLimitGateway};
use gatekeeper::ratelimit::{CounterBackend, CounterRegistry, DefaultKeyDeriver, RemoteCounters};

/// Per-key fixed-window rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the counter backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Override the remote counter service URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Override the log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatekeeperConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(backend) = cli.backend {
        config.limiter.backend = backend;
    }
    if let Some(url) = cli.remote_url {
        config.limiter.remote_url = Some(url);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting Gatekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?config.limiter.backend,
        call_timeout_ms = config.limiter.call_timeout_ms,
        "Configuration loaded"
    );

    let policies = config.policy_table()?;
    let probe_policy = policies
        .get(&config.gateway.probe_policy)
        .with_context(|| format!("Unknown probe policy '{}'", config.gateway.probe_policy))?;

    // Counters are always hosted locally so this node can serve the actor API.
    let registry = Arc::new(CounterRegistry::new());
    let sweeper = registry.spawn_sweeper(
        config.limiter.sweep_interval(),
        config.limiter.idle_ttl(),
    );

    let backend: Arc<dyn CounterBackend> = match config.limiter.backend {
        BackendKind::Local => registry.clone(),
        BackendKind::Remote => {
            let url = config
                .limiter
                .remote_url
                .as_deref()
                .context("limiter.remote_url is required for the remote backend")?;
            info!(remote_url = %url, "Using remote counter service");
            Arc::new(RemoteCounters::new(url, config.limiter.call_timeout())?)
        }
    };

    let trusted_ip_header = HeaderName::try_from(config.gateway.trusted_ip_header.as_str())?;
    let gateway = RateLimitGateway::new(backend, probe_policy)
        .with_deriver(DefaultKeyDeriver::new(trusted_ip_header))
        .with_call_timeout(config.limiter.call_timeout());
    info!(
        policy = %config.gateway.probe_policy,
        limit = probe_policy.limit(),
        window_seconds = probe_policy.window_seconds(),
        "Rate limit gateway initialized"
    );

    let app = actor::router(registry).merge(probe::router(Arc::new(gateway)));
    let server = HttpServer::new(config.server.listen_addr, app);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Gatekeeper Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
