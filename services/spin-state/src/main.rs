//! Spin-state HTTP service.
//!
//! Thin request/response layer over [`spindeck_engine::SpinEngine`]: an
//! unauthenticated public route for polling clients and admin routes for the
//! staff console. There is no push delivery; clients poll and use the state
//! `version` to detect changes. Auth is a deployment concern mounted in
//! front of the `/api/admin` prefix.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use spindeck_engine::{
    EngineError, FileCatalog, FileStore, RedisStore, SpinEngine, StoreBackend,
};
use spindeck_types::{
    BulkSpinRequest, GiveawayItemRequest, RunGiveawayRequest, SetFlagRequest, SpinRecord,
    SpinRequest, SpinStateView,
};

type ServiceEngine = SpinEngine<FileCatalog, StoreBackend>;

#[derive(Clone, Debug)]
struct ServiceConfig {
    host: String,
    port: u16,
    redis_url: Option<String>,
    state_dir: PathBuf,
    state_key: String,
    catalog_file: PathBuf,
}

impl ServiceConfig {
    fn from_env() -> Self {
        Self {
            host: read_string("SPIN_STATE_HOST", "0.0.0.0"),
            port: read_u16("SPIN_STATE_PORT", 9280),
            redis_url: std::env::var("SPIN_STATE_REDIS_URL").ok().filter(|v| !v.is_empty()),
            state_dir: PathBuf::from(read_string("SPIN_STATE_STATE_DIR", "./data")),
            state_key: read_string("SPIN_STATE_STATE_KEY", "spin-state"),
            catalog_file: PathBuf::from(read_string("SPIN_STATE_CATALOG_FILE", "./catalog.csv")),
        }
    }
}

fn read_string(key: &str, fallback: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.to_string())
}

fn read_u16(key: &str, fallback: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(fallback)
}

#[derive(Clone)]
struct AppState {
    engine: Arc<ServiceEngine>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::Store(_) => StatusCode::BAD_GATEWAY,
        EngineError::Catalog(_) | EngineError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    let body = ErrorBody {
        code: err.code().to_string(),
        message: err.to_string(),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkSpinResponse {
    state: SpinStateView,
    results: Vec<SpinRecord>,
}

async fn healthz() -> &'static str {
    "ok"
}

/// Public projection for polling clients. Reconciles first, so the served
/// `version` always reflects the current catalog.
async fn public_state(AxumState(app): AxumState<AppState>) -> Response {
    match app.engine.ensure_state().await {
        Ok(state) => Json(SpinStateView::public_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn admin_state(AxumState(app): AxumState<AppState>) -> Response {
    match app.engine.ensure_state().await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn spin_once(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<SpinRequest>,
) -> Response {
    match app
        .engine
        .spin_once(&request.auction_number, &request.username)
        .await
    {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn spin_bulk(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<BulkSpinRequest>,
) -> Response {
    match app
        .engine
        .spin_bulk(&request.auction_number_start, &request.username, request.count)
        .await
    {
        Ok(outcome) => Json(BulkSpinResponse {
            state: SpinStateView::admin_view(&outcome.state),
            results: outcome.results,
        })
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn reset_pool(AxumState(app): AxumState<AppState>) -> Response {
    match app.engine.reset_spin_state().await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn reset_all(AxumState(app): AxumState<AppState>) -> Response {
    match app.engine.reset_pool_and_clear_history().await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn clear_history(AxumState(app): AxumState<AppState>) -> Response {
    match app.engine.clear_spin_history().await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_offline(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<SetFlagRequest>,
) -> Response {
    match app.engine.set_public_offline(request.value).await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_testing_mode(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<SetFlagRequest>,
) -> Response {
    match app.engine.set_testing_mode(request.value).await {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_giveaway_item(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<GiveawayItemRequest>,
) -> Response {
    match app
        .engine
        .set_current_buyers_giveaway_item(&request.name)
        .await
    {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn run_giveaway(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<RunGiveawayRequest>,
) -> Response {
    match app
        .engine
        .run_buyers_giveaway(request.item_name.as_deref())
        .await
    {
        Ok(state) => Json(SpinStateView::admin_view(&state)).into_response(),
        Err(err) => error_response(err),
    }
}

fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/spin", get(public_state))
        .route("/api/admin/spin", get(admin_state).post(spin_once))
        .route("/api/admin/spin/bulk", post(spin_bulk))
        .route("/api/admin/spin/reset", post(reset_pool))
        .route("/api/admin/spin/reset-all", post(reset_all))
        .route("/api/admin/spin/clear-history", post(clear_history))
        .route("/api/admin/offline", post(set_offline))
        .route("/api/admin/testing-mode", post(set_testing_mode))
        .route("/api/admin/giveaway/item", post(set_giveaway_item))
        .route("/api/admin/giveaway/run", post(run_giveaway))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServiceConfig::from_env();
    let store = match &config.redis_url {
        Some(url) => {
            info!("state store: redis");
            StoreBackend::Redis(RedisStore::new(url).context("open redis state store")?)
        }
        None => {
            // Deployment-time fallback, not a runtime retry policy.
            info!(dir = %config.state_dir.display(), "state store: file");
            StoreBackend::File(FileStore::new(&config.state_dir))
        }
    };
    let catalog = FileCatalog::new(&config.catalog_file);
    let engine = Arc::new(SpinEngine::new(catalog, store, config.state_key.clone()));

    let app = build_router(AppState { engine });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen addr")?;
    info!(%addr, "spin state service listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
