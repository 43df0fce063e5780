use crate::{
    catalog::{Category, ContentItem},
    semantic::{BuildResult, SearchResponse, SemanticSearchError, SemanticSearchService},
};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

const DEFAULT_LIMIT: usize = 5;

#[derive(Clone)]
struct SharedState {
    service: Arc<SemanticSearchService>,
}

pub fn router(service: Arc<SemanticSearchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/", get(health))
        .route("/index", post(index))
        .route("/search", post(search))
        .route("/recommend", post(recommend))
        .route("/embed", post(embed))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(service: Arc<SemanticSearchService>, listen_addr: &str) -> anyhow::Result<()> {
    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    log::error!("failed to install signal handler: {e}");
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
        log::warn!("shutting down");
    }

    let app = router(service);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(service: Arc<SemanticSearchService>, listen_addr: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(service, listen_addr).await })
}

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

// Tell axum how to convert `HttpError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

impl From<SemanticSearchError> for HttpError {
    fn from(err: SemanticSearchError) -> Self {
        let status = match &err {
            SemanticSearchError::EmptyCatalog
            | SemanticSearchError::IndexNotBuilt
            | SemanticSearchError::InvalidLimit
            | SemanticSearchError::UnknownCategory(_) => StatusCode::BAD_REQUEST,
            SemanticSearchError::EncoderNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                log::error!("{err:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// `Json` extractor that reports malformed bodies as `HttpError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(HttpError))]
struct JsonBody<T>(T);

/// Run a blocking service call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, HttpError>
where
    F: FnOnce() -> Result<T, SemanticSearchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SemanticSearchError::Internal(format!("worker failed: {e}")))?
        .map_err(Into::into)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub index_size: usize,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.service.is_model_loaded(),
        index_size: state.service.indexed_count(),
    })
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub contents: Vec<ContentItem>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: BuildResult,
}

async fn index(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<IndexRequest>,
) -> Result<Json<IndexResponse>, HttpError> {
    log::debug!("indexing {} items", payload.contents.len());

    let service = state.service.clone();
    let result = blocking(move || service.build(payload.contents)).await?;

    Ok(Json(IndexResponse {
        success: true,
        result,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Category filter: film, dizi or kitap
    #[serde(default, alias = "category")]
    pub tur: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

async fn search(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let category =
        Category::parse_filter(payload.tur.as_deref()).map_err(SemanticSearchError::from)?;
    let service = state.service.clone();
    let query = payload.query.clone();
    let limit = payload.limit;
    let results = blocking(move || service.search(&query, limit, category)).await?;

    Ok(Json(SearchResponse::new(payload.query, results)))
}

async fn recommend(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let category =
        Category::parse_filter(payload.tur.as_deref()).map_err(SemanticSearchError::from)?;
    let service = state.service.clone();
    let query = payload.query.clone();
    let limit = payload.limit;
    let results = blocking(move || service.recommend(&query, limit, category)).await?;

    Ok(Json(SearchResponse::new(payload.query, results)))
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

async fn embed(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<EmbedRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let service = state.service.clone();
    let embedding = blocking(move || service.embed_probe(&payload.text)).await?;

    Ok(Json(json!({
        "dimension": embedding.len(),
        "embedding": embedding,
    })))
}
