use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hybrid_rag::{Document, HybridSearchPipeline, RetrievalError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<HybridSearchPipeline>,
}

impl AppState {
    pub fn new(pipeline: HybridSearchPipeline) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("pipeline", &self.pipeline).finish()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT }
    }
}

impl ServerConfig {
    /// Read `HYBRID_RAG_HOST` and `HYBRID_RAG_PORT`, keeping defaults for unset values.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HYBRID_RAG_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("HYBRID_RAG_PORT") {
            config.port =
                port.parse().with_context(|| format!("invalid HYBRID_RAG_PORT: {port}"))?;
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Document>,
}

/// A retrieval failure rendered as an HTTP error.
#[derive(Debug)]
pub struct ApiError(RetrievalError);

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            RetrievalError::RetrievalUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Search service temporarily unavailable".to_string(),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, format!("Search failed: {other}")),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/search", post(search))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for hybrid-rag-server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("hybrid-rag-server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn index() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the hybrid RAG search API" }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let pipeline = &state.pipeline;
    let limit = request.limit.unwrap_or(pipeline.config().default_limit);

    let results = pipeline.search(&request.query, limit).await.map_err(|e| {
        error!(query = %request.query, limit, error = %e, "search request failed");
        ApiError::from(e)
    })?;

    Ok(Json(SearchResponse { results }))
}
