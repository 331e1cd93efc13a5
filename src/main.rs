use resizekit::cache::MemoryCache;
use resizekit::config::ResizerConfig;
use resizekit::coordinator::ResizeService;
use resizekit::fetch::HttpFetcher;
use resizekit::transform::RasterTransformer;
use resizekit::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

/// resizekit standalone server entry point.
///
/// Initializes tracing, loads and validates configuration, starts the cache
/// sweeper and serves the HTTP API until SIGINT/SIGTERM.
///
/// # Configuration
/// See [`ResizerConfig::from_env`] for the environment variables; `RUST_LOG`
/// controls verbosity (default: "resizekit=debug,tower_http=debug").
///
/// # Deployment
/// Server binds to 0.0.0.0 to accept external connections, required for
/// containerized deployment.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with environment-based filtering
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resizekit=debug,tower_http=debug".into())
        )
        .init();

    tracing::info!("Starting resizekit server");

    let cfg = ResizerConfig::from_env()?;
    cfg.validate()?;
    tracing::info!(
        "Configuration loaded: cache_ttl={:?}, sweep_interval={:?}, fetch_timeout={:?}, max_download={}B, max_upload={}B, oversize={:?}",
        cfg.cache_ttl, cfg.sweep_interval, cfg.fetch_timeout, cfg.max_download_size, cfg.max_upload_size, cfg.oversize_policy
    );

    let cache = Arc::new(MemoryCache::new(cfg.cache_ttl));
    let sweeper = cache
        .start_sweeper(cfg.sweep_interval)
        .ok_or("cache sweeper already running")?;

    let service = Arc::new(ResizeService::new(cache, Arc::new(RasterTransformer)));
    let fetcher = Arc::new(HttpFetcher::from_config(&cfg)?);
    let app = router(AppState::new(service, fetcher, &cfg));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", cfg.port);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
