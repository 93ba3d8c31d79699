//! release-historyd — the release history daemon.
//!
//! Opens the event store, creates its tables if needed, and serves the
//! REST API until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! POSTGRES_CONNECTION_STRING=postgres://... USERNAME=ci PASSWORD=... release-historyd
//! release-historyd --database-url redb:///var/lib/release-history/events.redb --port 3000
//! ```

mod config;

use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

use release_history_api::{AuthConfig, build_router};
use release_history_store::StoreUrl;

use crate::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    run(cli).await
}

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "info,release_historyd=debug,release_history_api=debug,release_history_store=debug";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("release history daemon starting");

    // ── Event store ────────────────────────────────────────────

    let url = StoreUrl::parse(&cli.database_url)?;
    let store = release_history_store::open(&url, cli.max_connections).await?;
    info!(backend = url.backend(), "event store opened");

    // ── API server ─────────────────────────────────────────────

    let auth = AuthConfig::new(cli.username, cli.password);
    let router = build_router(store.clone(), auth);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    });

    server.await?;

    store.close().await;
    info!("release history daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_names_each_crate() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for target in ["release_historyd", "release_history_api", "release_history_store"] {
            assert!(DEFAULT_LOG_FILTER.contains(&format!("{target}=debug")), "{target}");
        }
    }
}
