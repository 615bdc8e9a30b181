pub mod auth;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod secret_store;
pub mod settings;
pub mod state;


use anyhow::Result;
use axum::Router;
use state::AppState;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assemble the proxy application: version probe and health check without
/// authentication, registry endpoints behind the registry auth middleware.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(proxy::routes::public_routes());

    Router::new()
        .merge(public_routes)
        .merge(proxy::routes::registry_routes(state.clone()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(
                    middleware::request_id_middleware,
                )),
        )
}

/// Run the HTTP server until SIGINT or SIGTERM
pub async fn run_server(settings: settings::Settings) -> Result<()> {
    let state = AppState::new(&settings)?;

    let sweeper = state
        .resolver
        .cache()
        .spawn_sweeper(Duration::from_secs(settings.cache.sweep_interval_secs));
    info!(
        "Credential cache: ttl {}s, sweep every {}s",
        settings.cache.ttl_secs, settings.cache.sweep_interval_secs
    );

    let app = router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Registry proxy listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("HTTP server shutdown complete");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Wait for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
