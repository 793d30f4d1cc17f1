use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use transfer_dispatch::api;
use transfer_dispatch::auth::AccessPolicy;
use transfer_dispatch::config::Config;
use transfer_dispatch::error::AppError;
use transfer_dispatch::geo::resolver::GreatCircleResolver;
use transfer_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let known_places = config.load_known_places()?;
    tracing::info!(places = known_places.len(), "distance gazetteer loaded");
    let resolver = Arc::new(GreatCircleResolver::new(known_places, config.road_factor));
    let policy = AccessPolicy::new(config.system_admin_ids.iter().copied());

    let app_state = AppState::new(config.event_buffer_size, resolver, policy)
        .with_distance_timeout(config.distance_timeout);
    let app = api::rest::router(Arc::new(app_state));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
