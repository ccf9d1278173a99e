//! HTTP server for browser extensions and other local hosts.
//!
//! Exposes the [`App`] over JSON HTTP. `POST /message` carries the tagged
//! [`Command`] contract unchanged; the REST routes offer the same
//! operations with conventional status codes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/message` | Dispatch a [`Command`], always `200` with a [`Response`](crate::commands::Response) |
//! | `POST` | `/index` | Index a page: `{url, title, content}` |
//! | `POST` | `/search` | Search: `{query, top_k?}` |
//! | `DELETE` | `/delete` | Delete a page: `{url}` |
//! | `POST` | `/clear` | Remove every indexed page |
//! | `GET`  | `/documents` | Document map |
//! | `GET`  | `/document?url=` | One document |
//! | `GET`  | `/history?limit=` | Recent searches |
//!
//! # Error Contract
//!
//! REST errors carry a machine-readable code:
//!
//! ```json
//! { "error": { "code": "empty_content", "message": "No meaningful content found to index" } }
//! ```
//!
//! `empty_content` (400), `not_found` (404), `timeout` (408),
//! `embedding_error` (502), `store_unavailable` (503), anything else (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so extension pages can
//! call the server directly.

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::commands::{App, Command};
use crate::error::IndexError;
use crate::models::{Document, IndexOutcome, SearchHistoryEntry, SearchResult};

/// Build the router over a shared [`App`].
pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/message", post(handle_message))
        .route("/index", post(handle_index))
        .route("/search", post(handle_search))
        .route("/delete", delete(handle_delete))
        .route("/clear", post(handle_clear))
        .route("/documents", get(handle_documents))
        .route("/document", get(handle_document))
        .route("/history", get(handle_history))
        .layer(cors)
        .with_state(app)
}

/// Serve on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    axum::serve(listener, router(app)).await?;
    Ok(())
}

/// Bind `addr` (normally `[server].bind`) and serve `app` on it.
pub async fn run_server(app: Arc<App>, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %listener.local_addr()?, "page index server listening");
    serve(listener, app).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Converts an [`IndexError`] into an HTTP response.
struct AppError(IndexError);

impl From<IndexError> for AppError {
    fn from(e: IndexError) -> Self {
        AppError(e)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0 {
            IndexError::EmptyContent => StatusCode::BAD_REQUEST,
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
            IndexError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            IndexError::Embedding(_) => StatusCode::BAD_GATEWAY,
            IndexError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            IndexError::DimensionMismatch { .. } | IndexError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /message ============

async fn handle_message(
    State(app): State<Arc<App>>,
    Json(command): Json<Command>,
) -> Json<crate::commands::Response> {
    Json(app.handle(command).await)
}

// ============ POST /index ============

#[derive(Deserialize)]
struct IndexRequest {
    url: String,
    #[serde(default)]
    title: String,
    content: String,
}

async fn handle_index(
    State(app): State<Arc<App>>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexOutcome>, AppError> {
    let outcome = app.index_page(&req.url, &req.title, &req.content).await?;
    Ok(Json(outcome))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default, alias = "topK")]
    top_k: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(app): State<Arc<App>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = app.search(&req.query, req.top_k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ DELETE /delete ============

#[derive(Deserialize)]
struct DeleteRequest {
    url: String,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    url: String,
    deleted: bool,
}

async fn handle_delete(
    State(app): State<Arc<App>>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = app.delete_page(&req.url).await?;
    Ok(Json(DeleteResponse {
        success: true,
        url: req.url,
        deleted,
    }))
}

// ============ POST /clear ============

async fn handle_clear(State(app): State<Arc<App>>) -> Result<Json<serde_json::Value>, AppError> {
    app.clear_all_data().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ============ GET /documents, /document ============

async fn handle_documents(State(app): State<Arc<App>>) -> Json<BTreeMap<String, Document>> {
    Json(app.document_map().await)
}

#[derive(Deserialize)]
struct DocumentQuery {
    url: String,
}

async fn handle_document(
    State(app): State<Arc<App>>,
    Query(q): Query<DocumentQuery>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(app.get_document(&q.url).await?))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<SearchHistoryEntry>,
}

async fn handle_history(
    State(app): State<Arc<App>>,
    Query(q): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: app.search_history(q.limit).await,
    })
}
