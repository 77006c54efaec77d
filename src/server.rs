//! Thin HTTP adapter over the depot library.
//!
//! Authentication and tenant resolution belong to the fronting
//! middleware; every request here names its tenant explicitly and the
//! handlers only adapt transport to library calls.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest/media` | Stream a binary artifact (query: tenant, filename, mime?, comment?) |
//! | `POST` | `/ingest/json` | Route and store a JSON document |
//! | `POST` | `/search` | Prefix/semantic/hybrid retrieval |
//! | `GET`  | `/files/:id` | Catalog row for a stored file |
//! | `GET`  | `/files/:id/bytes` | The stored bytes |
//! | `GET`  | `/docs/:id` | Catalog row plus reassembled document |
//! | `DELETE` | `/artifacts/:id` | Delete a file or document by id |
//! | `POST` | `/reindex/:id` | Chunk + embed a stored file |
//! | `GET`  | `/health` | Liveness and version |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "kind": "quota_exceeded", "message": "...", "hint": "..." } }
//! ```

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::app::Depot;
use crate::error::DepotError;
use crate::media;
use crate::models::SearchMode;
use crate::reindex;
use crate::retrieval::{self, SearchOptions};
use crate::router as json_router;

/// Shared state for all handlers.
#[derive(Clone)]
struct AppState {
    depot: Arc<Depot>,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(depot: Arc<Depot>) -> anyhow::Result<()> {
    let bind_addr = depot.config.server.bind.clone();
    let state = AppState { depot };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest/media", post(handle_ingest_media))
        .route("/ingest/json", post(handle_ingest_json))
        .route("/search", post(handle_search))
        .route("/files", get(handle_list_files))
        .route("/docs", get(handle_list_docs))
        .route("/files/:id", get(handle_get_file))
        .route("/files/:id/bytes", get(handle_get_file_bytes))
        .route("/docs/:id", get(handle_get_doc))
        .route("/artifacts/:id", delete(handle_delete))
        .route("/reindex/:id", post(handle_reindex))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!("depot listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error envelope ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

struct AppError(DepotError);

impl From<DepotError> for AppError {
    fn from(e: DepotError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DepotError::Validation(_) => StatusCode::BAD_REQUEST,
            DepotError::Forbidden(_) => StatusCode::FORBIDDEN,
            DepotError::NotFound(_) => StatusCode::NOT_FOUND,
            DepotError::QuotaExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            DepotError::NameCollision(_) => StatusCode::CONFLICT,
            DepotError::StoreUnavailable(_) | DepotError::EmbeddingUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DepotError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DepotError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            DepotError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind().to_string(),
                message: self.0.to_string(),
                hint: self.0.hint().map(|h| h.to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Enforce the per-request deadline at the operation boundary.
async fn with_deadline<T>(
    depot: &Depot,
    fut: impl std::future::Future<Output = Result<T, DepotError>>,
) -> Result<T, AppError> {
    let limit = Duration::from_secs(depot.config.server.request_timeout_secs);
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(AppError),
        Err(_) => Err(AppError(DepotError::Timeout(format!(
            "request exceeded {}s",
            limit.as_secs()
        )))),
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct IngestMediaParams {
    tenant: String,
    filename: String,
    mime: Option<String>,
    comment: Option<String>,
}

async fn handle_ingest_media(
    State(state): State<AppState>,
    Query(params): Query<IngestMediaParams>,
    body: axum::body::Body,
) -> Result<impl IntoResponse, AppError> {
    let stream = body.into_data_stream();
    let reader = StreamReader::new(stream.map_err(std::io::Error::other));
    let cancel = CancellationToken::new();

    let file = with_deadline(
        &state.depot,
        media::ingest_media(
            &state.depot,
            &params.tenant,
            reader,
            &params.filename,
            params.mime.as_deref(),
            params.comment.as_deref(),
            None,
            &cancel,
        ),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

#[derive(Deserialize)]
struct IngestJsonRequest {
    tenant: String,
    data: serde_json::Value,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Serialize)]
struct IngestJsonResponse {
    #[serde(flatten)]
    catalog: crate::models::CatalogJson,
    reasons: Vec<String>,
    sql_score: f64,
    nosql_score: f64,
}

async fn handle_ingest_json(
    State(state): State<AppState>,
    Json(req): Json<IngestJsonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = CancellationToken::new();
    let (catalog, routing) = with_deadline(
        &state.depot,
        json_router::ingest_json(&state.depot, &req.tenant, req.data, req.tags, &cancel),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestJsonResponse {
            catalog,
            reasons: routing.reasons,
            sql_score: routing.sql_score,
            nosql_score: routing.nosql_score,
        }),
    ))
}

#[derive(Deserialize)]
struct SearchRequest {
    tenant: String,
    query: String,
    #[serde(default = "default_mode")]
    mode: SearchMode,
    top_k: Option<usize>,
    #[serde(default)]
    categories: Option<Vec<String>>,
}

fn default_mode() -> SearchMode {
    SearchMode::Hybrid
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let opts = SearchOptions {
        mode: req.mode,
        top_k: req.top_k.unwrap_or(state.depot.config.retrieval.top_k),
        categories: req.categories,
    };
    let response = with_deadline(
        &state.depot,
        retrieval::search(&state.depot, &req.tenant, &req.query, &opts),
    )
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct TenantParam {
    tenant: String,
}

#[derive(Deserialize)]
struct ListParams {
    tenant: String,
    category: Option<String>,
    backing: Option<String>,
    limit: Option<i64>,
}

async fn handle_list_files(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let scope = state.depot.guard.scope(&params.tenant).await?;
    let files = crate::catalog::list_files(
        &state.depot.pool,
        scope,
        params.category.as_deref(),
        params.limit.unwrap_or(100),
    )
    .await?;
    Ok(Json(files))
}

async fn handle_list_docs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let scope = state.depot.guard.scope(&params.tenant).await?;
    let backing = match params.backing.as_deref() {
        Some(s) => Some(crate::models::Backing::parse(s).ok_or_else(|| {
            DepotError::Validation(format!("unknown backing: {} (relational|document)", s))
        })?),
        None => None,
    };
    let docs = crate::catalog::list_json(
        &state.depot.pool,
        scope,
        backing,
        params.limit.unwrap_or(100),
    )
    .await?;
    Ok(Json(docs))
}

async fn handle_get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<impl IntoResponse, AppError> {
    let scope = state.depot.guard.scope(&params.tenant).await?;
    let file = crate::catalog::get_file(&state.depot.pool, scope, &id).await?;
    Ok(Json(file))
}

async fn handle_get_file_bytes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<impl IntoResponse, AppError> {
    let (file, bytes) =
        with_deadline(&state.depot, media::read_media(&state.depot, &params.tenant, &id)).await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, file.mime)],
        bytes,
    ))
}

async fn handle_get_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<impl IntoResponse, AppError> {
    let (row, data) = with_deadline(
        &state.depot,
        json_router::fetch_json(&state.depot, &params.tenant, &id),
    )
    .await?;
    Ok(Json(serde_json::json!({ "catalog": row, "data": data })))
}

/// Deletes either artifact kind: files first, then documents.
async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<impl IntoResponse, AppError> {
    let depot = &state.depot;
    let result = with_deadline(depot, async {
        match media::delete_media(depot, &params.tenant, &id).await {
            Err(DepotError::NotFound(_)) => {
                json_router::delete_json(depot, &params.tenant, &id).await
            }
            other => other,
        }
    })
    .await;
    result?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_reindex(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = CancellationToken::new();
    let chunks = with_deadline(
        &state.depot,
        reindex::reindex_file(&state.depot, &params.tenant, &id, &cancel),
    )
    .await?;
    Ok(Json(serde_json::json!({ "chunks": chunks })))
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "embedding": state.depot.gateway.model_name(),
    }))
}
