use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogFormat};
use crate::forwarder::{Forwarder, HttpForwarder};
use crate::handler::{handle_invoke, pick_target};
use crate::record::ServiceRecord;
use crate::registry::{HttpStore, MemoryStore, RegistryStore, ResolutionCache};
use crate::resolver::{RegisterError, ServiceResolver};
use crate::stats::StatsSnapshot;

/// Initialize tracing subscriber for native builds.
/// Uses RUST_LOG env var for filtering (defaults to info).
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

/// Everything a request handler needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub resolver: ServiceResolver,
    pub forwarder: Arc<dyn Forwarder>,
    pub targets: Arc<Vec<String>>,
}

impl AppState {
    /// Wire up the store, cache and forwarder described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let store: Arc<dyn RegistryStore> = if config.registry_url.is_empty() {
            info!(
                seeded = config.services.len(),
                "using in-memory service registry"
            );
            Arc::new(MemoryStore::with_records(config.services.iter().cloned()))
        } else {
            info!(url = %config.registry_url, "using remote service registry");
            Arc::new(HttpStore::new(
                &config.registry_url,
                config.registry_timeout(),
            )?)
        };

        let policy = config.cache.eviction_policy();
        info!(?policy, "resolution cache configured");
        let cache = Arc::new(ResolutionCache::new(policy));
        let forwarder = Arc::new(HttpForwarder::new(config.forward_timeout())?);

        Ok(Self {
            resolver: ServiceResolver::new(cache, store),
            forwarder,
            targets: Arc::new(config.targets.clone()),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_invoke_default))
        .route("/invoke/:id", post(handle_invoke_named))
        .route("/services", post(handle_register))
        .route("/services/:id", get(handle_get_service))
        .route("/stats", get(handle_stats))
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .with_state(state)
}

async fn invoke(state: &AppState, id: &str, body: &[u8]) -> Response {
    match handle_invoke(id, body, &state.resolver, state.forwarder.as_ref()).await {
        Ok(out) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            out,
        )
            .into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.to_string()).into_response()
        }
    }
}

async fn handle_invoke_default(State(state): State<AppState>, body: Bytes) -> Response {
    match pick_target(&state.targets) {
        Some(id) => {
            let id = id.to_string();
            invoke(&state, &id, &body).await
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "no target services configured".to_string(),
        )
            .into_response(),
    }
}

async fn handle_invoke_named(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    invoke(&state, &id, &body).await
}

async fn handle_get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceRecord>, (StatusCode, Json<serde_json::Value>)> {
    state
        .resolver
        .resolve(&id)
        .await
        .map(|record| Json(record.as_ref().clone()))
        .map_err(|_| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "service not found"})),
            )
        })
}

async fn handle_register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ServiceRecord>), (StatusCode, String)> {
    let record: ServiceRecord = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid JSON: {}", e)))?;

    state
        .resolver
        .register(record.clone())
        .await
        .map(|()| (StatusCode::CREATED, Json(record)))
        .map_err(|e| {
            let status = match e {
                RegisterError::Invalid(_) | RegisterError::Rejected(_) => StatusCode::BAD_REQUEST,
                RegisterError::Duplicate(_) => StatusCode::CONFLICT,
                RegisterError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, e.to_string())
        })
}

async fn handle_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.resolver.stats())
}
