//! esignd - signature orchestration daemon
//!
//! Serves the provider webhook endpoint and the operator REST API.

use clap::Parser;
use esign_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "esignd", version, about = "Signature orchestration service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ESIGN_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides `server.listen_addr`
    #[arg(short, long, env = "ESIGN_LISTEN_ADDR")]
    listen: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "ESIGN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ESIGN_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.log_json;

    init_tracing(&config);

    let state = ServiceState::bootstrap(&config).await?;
    let app = build_router(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!("esign-service listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("esign-service shutting down");
    Ok(())
}

fn init_tracing(config: &ServiceConfig) {
    let default_filter = format!(
        "esign_service={level},esign_core={level},{level}",
        level = config.logging.level
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
