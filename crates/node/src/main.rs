// Path: crates/node/src/main.rs
//! `quilld`, the Quill signing service daemon.
//!
//! Startup order: logging, configuration, signer factory (fatal on any
//! misconfigured signer), gateway state, background chain refresh, then
//! the HTTP server with graceful shutdown on SIGINT/SIGTERM.

mod config;
mod refresh;

use anyhow::Context;
use clap::Parser;
use quill_gateway::{run_server, GatewayConfig, GatewayState};
use quill_signers::build_registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "quilld", about = "Multi-tenant signing service")]
struct Args {
    /// Path to the service configuration file.
    #[arg(short, long, env = "QUILL_CONFIG", default_value = "quill.toml")]
    config: PathBuf,
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(target: "node", "failed to install SIGTERM handler: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!(target: "node", "shutdown signal received");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quill_telemetry::init_tracing()?;
    let args = Args::parse();

    let service_config = config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    service_config
        .validate()
        .context("configuration validation failed")?;

    tracing::info!(
        target: "node",
        signers = service_config.signers.len(),
        principals = service_config.principals.len(),
        "configuration loaded"
    );

    // Serial per signer; a misconfigured signer aborts startup with a
    // diagnostic naming its id.
    let registry = build_registry(&service_config.signers)
        .await
        .context("signer initialization failed")?;

    let gateway_config = GatewayConfig {
        listen_addr: service_config.server.listen_address.clone(),
        rps: service_config.server.rps,
        burst: service_config.server.burst,
        body_limit_kb: service_config.server.body_limit_kb,
        trusted_proxies: service_config.server.trusted_proxies.clone(),
    };
    let state = Arc::new(GatewayState::new(&service_config, registry.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));
    tokio::spawn(refresh::run(registry, shutdown_rx.clone()));

    run_server(gateway_config, state, shutdown_rx).await
}
