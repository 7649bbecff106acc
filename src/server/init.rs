//! Server initialization and main run loop

use super::config::AppConfig;
use super::loader::load_config;
use super::validation::validate_production_config;
use anyhow::{Context, Result};
use axum::http::HeaderValue;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use strata_collab::{CollabConfig, RoomRegistry, SignedTokenAuthenticator, SqliteStore, Store};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting Strata v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    validate_production_config(&config)?;

    let store = open_store(&config).await?;
    let registry = RoomRegistry::new(
        store,
        Arc::new(authenticator(&config)),
        CollabConfig::from(&config.collab),
    );

    let app = crate::api::router(registry.clone())
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server error")?;

    registry.flush_all().await;
    info!("Strata stopped");
    Ok(())
}

/// Token authenticator built from the auth settings
pub fn authenticator(config: &AppConfig) -> SignedTokenAuthenticator {
    SignedTokenAuthenticator::new(
        &config.auth.signing_key,
        config.auth.bearer_ttl_secs,
        config.auth.invite_ttl_secs,
    )
}

/// Connect to the project database and make sure the schema exists
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.store.max_connections)
        .connect(&config.store.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.store.database_url))?;

    let store = SqliteStore::new(pool);
    store.init().await.context("Failed to initialize schema")?;
    info!("Project store initialized");

    Ok(Arc::new(store))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    token.cancel();
}
