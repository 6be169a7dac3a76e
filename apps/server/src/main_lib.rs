use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bienestar_context::ServiceContext;
use bienestar_core::sync::MIRROR_SHUTDOWN_GRACE_SECS;

use crate::api;
use crate::config::ServerConfig;
use crate::mirror_engine;

pub struct AppState {
    pub context: Arc<ServiceContext>,
    pub config: ServerConfig,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(api::form_page))
        .nest("/api", api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    info!("Initializing service context...");
    let context = Arc::new(ServiceContext::initialize(&config.mirror).await?);
    let state = Arc::new(AppState {
        context: Arc::clone(&context),
        config,
    });

    if let Some(interval_secs) = state.config.mirror.interval_secs {
        mirror_engine::ensure_background_mirror_started(Arc::clone(&context), interval_secs)
            .await;
    }

    let address = state.config.listen_address()?;
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {}", address);

    axum::serve(listener, app_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    mirror_engine::ensure_background_mirror_stopped(
        context,
        Duration::from_secs(MIRROR_SHUTDOWN_GRACE_SECS),
    )
    .await;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
