//! HTTP request handlers for the document API

use crate::core::{Document, Error};
use crate::storage::{Collection, Database, Filter};
use crate::system::metrics;
use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
    Json as JsonExtractor,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Database handle
    pub db: Database,
    /// Collections exposed over HTTP
    pub collections: Arc<Vec<String>>,
    /// Serve `/metrics`
    pub metrics_enabled: bool,
    /// Per-request deadline
    pub request_timeout: Duration,
}

impl AppState {
    /// State exposing `collections`
    pub fn new(db: Database, collections: Vec<String>, metrics_enabled: bool) -> Self {
        Self {
            db,
            collections: Arc::new(collections),
            metrics_enabled,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the per-request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn collection(&self, name: &str) -> Result<Collection, ApiError> {
        if self.collections.iter().any(|c| c == name) {
            Ok(self.db.collection(name))
        } else {
            Err(ApiError::NotFound(format!("Collection '{}' not found", name)))
        }
    }
}

/// Response envelope
#[derive(Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded
    pub success: bool,
    /// Payload: one document or a list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Number of matching documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Human readable note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            count: None,
            message: None,
        }
    }
}

impl ApiResponse<()> {
    fn count(count: usize) -> Self {
        Self {
            success: true,
            data: None,
            count: Some(count),
            message: None,
        }
    }
}

/// Handler failure mapped to a status code
#[derive(Debug)]
pub enum ApiError {
    /// Unknown collection or document
    NotFound(String),
    /// Store failure
    Store(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "message": message })),
            )
                .into_response(),
            ApiError::Store(e) if e.is_client_error() => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": e.to_string(),
                    "kind": e.kind().as_str(),
                })),
            )
                .into_response(),
            ApiError::Store(e) => {
                error!(
                    kind = e.kind().as_str(),
                    collection = e.collection().unwrap_or("-"),
                    error = %e,
                    "request failed"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn equality_filter(params: HashMap<String, String>) -> ApiResult<Filter> {
    Ok(Filter::from_pairs(params)?)
}

fn found(document: Option<Document>, id: &str) -> ApiResult<Json<ApiResponse<Value>>> {
    document
        .map(|d| Json(ApiResponse::data(d.to_json())))
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", id)))
}

fn to_json_list(documents: Vec<Document>) -> Json<ApiResponse<Vec<Value>>> {
    let count = documents.len();
    let mut response: ApiResponse<Vec<Value>> =
        ApiResponse::data(documents.iter().map(Document::to_json).collect());
    response.count = Some(count);
    Json(response)
}

/// Liveness probe
pub async fn health_check() -> Json<Value> {
    Json(json!({ "message": "Server is running smoothly!" }))
}

/// Readiness probe: round trip to the backend
pub async fn backend_health(State(state): State<AppState>) -> Response {
    match state.db.ping().await {
        Ok(collections) => Json(json!({
            "status": "ok",
            "version": crate::VERSION,
            "collections": collections.len(),
        }))
        .into_response(),
        Err(e) => {
            error!(kind = e.kind().as_str(), error = %e, "backend health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "version": crate::VERSION })),
            )
                .into_response()
        }
    }
}

/// `GET /api/v1/collections/:collection/documents`, query params are equality terms
pub async fn list_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ApiResponse<Vec<Value>>>> {
    let collection = state.collection(&collection)?;
    let documents = collection.find(&equality_filter(params)?).await?;
    Ok(to_json_list(documents))
}

/// `POST /api/v1/collections/:collection/documents/query` with a JSON filter
pub async fn query_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    JsonExtractor(filter): JsonExtractor<Value>,
) -> ApiResult<Json<ApiResponse<Vec<Value>>>> {
    let collection = state.collection(&collection)?;
    let filter = Filter::from_json(&filter)?;
    let documents = collection.find(&filter).await?;
    Ok(to_json_list(documents))
}

/// `GET /api/v1/collections/:collection/documents/count`, query params are equality terms
pub async fn count_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let collection = state.collection(&collection)?;
    let count = collection.count_documents(&equality_filter(params)?).await?;
    Ok(Json(ApiResponse::count(count)))
}

/// `POST /api/v1/collections/:collection/documents`, responds 201 with the stored document
pub async fn create_document(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    JsonExtractor(payload): JsonExtractor<Value>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Value>>)> {
    let collection = state.collection(&collection)?;
    let created = collection.create(Document::from_json(payload)?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(created.to_json()))))
}

/// `GET /api/v1/collections/:collection/documents/:id`
pub async fn get_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let collection = state.collection(&collection)?;
    found(collection.find_by_id(&id).await?, &id)
}

/// `PATCH /api/v1/collections/:collection/documents/:id`, merges the body into the document
pub async fn patch_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    JsonExtractor(payload): JsonExtractor<Value>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let collection = state.collection(&collection)?;
    let update = Document::from_json(payload)?;
    found(collection.find_by_id_and_update(&id, update).await?, &id)
}

/// `DELETE /api/v1/collections/:collection/documents/:id`, returns the removed document
pub async fn delete_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let collection = state.collection(&collection)?;
    found(collection.find_by_id_and_delete(&id).await?, &id)
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
        .into_response()
}
