mod ai;
mod api;
mod config;
mod db;
mod http;
mod metrics;
mod models;
mod products;
mod session;
mod slug;
mod storage;
mod targets;

use ai::{GeminiClient, GeminiConfig};
use api::AppState;
use config::{ServerConfig, env_string};
use db::{MemoryProductStore, PgProductStore, ProductStore};
use eyre::WrapErr;
use metrics_exporter_prometheus::PrometheusBuilder;
use products::ProductService;
use session::SessionRegistry;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore, Uploader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "studio.api", "server crashed: {err:#}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();

    let pg = PgProductStore::from_env()
        .await
        .wrap_err("connecting to DATABASE_URL")?;
    let pool = pg.as_ref().map(|store| store.pool().clone());
    let store: Arc<dyn ProductStore> = match pg {
        Some(store) => Arc::new(store),
        None => {
            warn!(target = "studio.db", "DATABASE_URL not set, using in-memory demo catalogue");
            Arc::new(MemoryProductStore::demo())
        }
    };

    let (objects, assets): (Arc<dyn ObjectStore>, Option<MemoryObjectStore>) =
        match S3ObjectStore::from_env().await {
            Some(s3) => (Arc::new(s3), None),
            None => {
                warn!(target = "studio.storage", "S3_BUCKET not set, keeping uploads in memory");
                let memory = MemoryObjectStore::new();
                (Arc::new(memory.clone()), Some(memory))
            }
        };
    let public_base = env_string("PUBLIC_ASSET_BASE_URL")
        .unwrap_or_else(|| format!("http://localhost:{}/assets", config.port));
    let uploader = Uploader::new(objects, public_base);

    let gemini = GeminiClient::new(
        GeminiConfig::from_env(),
        config.http_timeout_secs,
        config.http_connect_timeout_secs,
    );

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(target = "studio.metrics", error = %err, "prometheus recorder unavailable");
            None
        }
    };

    let sessions = SessionRegistry::new(config.history_limit);
    sessions.spawn_sweeper(
        Duration::from_secs(config.session_idle_secs),
        Duration::from_secs(60),
    );

    let state = AppState {
        products: ProductService::new(store, uploader),
        sessions,
        model: Arc::new(gemini),
        assets,
        prometheus,
        metrics_key: config.metrics_key.clone(),
    };
    let app = api::router(state, config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "studio.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("serving http")?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    info!(target = "studio.api", "shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "studio.api", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "studio.api", "shutdown requested");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
