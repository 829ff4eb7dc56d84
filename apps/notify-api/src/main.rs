use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_api::config::{Config, StoreBackend};
use notify_api::gateway::PushGateway;
use notify_api::store::{MemoryNotificationStore, NotificationStore, PgNotificationStore};
use notify_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn NotificationStore> = match (config.store_backend, &config.database_url) {
        (StoreBackend::Postgres, Some(url)) => {
            let db = notify_api::db::pool::connect(url, config.db_pool_size)
                .await
                .unwrap_or_else(|e| panic!("failed to build connection pool: {e}"));
            Arc::new(PgNotificationStore::new(db))
        }
        (StoreBackend::Postgres, None) => panic!("DATABASE_URL env var is required"),
        (StoreBackend::Memory, _) => {
            tracing::warn!("using in-memory notification store; nothing will survive a restart");
            Arc::new(MemoryNotificationStore::new())
        }
    };

    tracing::info!(
        backend = ?config.store_backend,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "notify-api configured"
    );

    let state = AppState::new(config, store);
    let heartbeat = state.gateway.spawn_heartbeat();
    let gateway = state.gateway.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(notify_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "notify-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(gateway))
        .await
        .expect("server error");

    let _ = heartbeat.await;
}

async fn shutdown_signal(gateway: PushGateway) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for ctrl-c");
        return;
    }
    gateway.shutdown();
}
