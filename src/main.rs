// api-cache entry point.
// Loads configuration, starts the refresh loop and serves HTTP until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::info;

use api_cache::github::GitHubClient;
use api_cache::server::{AppState, build_router};
use api_cache::{AppConfig, CacheStore, RefreshScheduler};

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_cache=info".parse()?),
        )
        .init();

    let config = AppConfig::load()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream.base_url,
        org = %config.upstream.org,
        authenticated = config.upstream.api_token.is_some(),
        interval_secs = config.refresh.interval_secs,
        "api-cache starting"
    );

    let client = GitHubClient::from_config(&config.upstream)?;
    let store = Arc::new(CacheStore::new());

    let scheduler = RefreshScheduler::new(
        client.clone(),
        Arc::clone(&store),
        config.upstream.org.clone(),
        &config.refresh,
    );
    let refresh = tokio::spawn(scheduler.run());

    let state = Arc::new(AppState::new(store, client, config.upstream.org.clone()));
    let app = build_router(state);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh.abort();
    info!("Server shutdown complete");
    Ok(())
}
