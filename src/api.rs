//! HTTP surface for docpipe.
//!
//! A compact Axum router over the pipeline's upward-facing operations:
//!
//! - `POST /documents` – Accept an upload (JSON, base64 content) and enqueue
//!   it for processing. Returns the generated document id.
//! - `GET /documents` – List recent documents with their processing state.
//! - `GET /documents/:id` – Fetch one document record.
//! - `GET /search?q=` – Cache-aside similarity search returning the top hits.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /status` – Per-collaborator health snapshot.
//!
//! Handlers hold no transport concerns beyond decoding and status mapping;
//! every operation is a pure function of the core components.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::metadata::{DocumentRecord, DocumentState, MetadataError, MetadataStore};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::{IntakeCoordinator, QueryService, SearchError, SearchHit, SubmitError};
use crate::queue::WorkQueue;
use crate::vector::VectorIndex;

/// Shared handles behind the HTTP surface.
pub struct AppState {
    /// Intake coordinator serving submissions.
    pub intake: Arc<IntakeCoordinator>,
    /// Query service serving searches.
    pub query: Arc<QueryService>,
    /// Metadata store serving listings and lookups.
    pub metadata: Arc<dyn MetadataStore>,
    /// Work queue, probed for the status report.
    pub queue: Arc<dyn WorkQueue>,
    /// Vector index, probed for the status report.
    pub index: Arc<dyn VectorIndex>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// Build the HTTP router exposing the pipeline API surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/documents", post(submit_document).get(list_documents))
        .route("/documents/:id", get(get_document))
        .route("/search", get(search))
        .route("/metrics", get(get_metrics))
        .route("/status", get(get_status))
        .with_state(state)
}

/// Request body for `POST /documents`.
#[derive(Deserialize)]
struct SubmitRequest {
    /// Original filename.
    filename: String,
    /// Raw document bytes, base64-encoded.
    content_base64: String,
}

/// Success response for `POST /documents`.
#[derive(Serialize)]
struct SubmitResponse {
    id: Uuid,
    status: &'static str,
}

async fn submit_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let content = BASE64
        .decode(request.content_base64.as_bytes())
        .map_err(|_| AppError::BadRequest("content_base64 is not valid base64"))?;

    let id = state.intake.submit(&request.filename, &content).await?;
    Ok(Json(SubmitResponse {
        id,
        status: "queued",
    }))
}

/// One row of the `GET /documents` listing.
#[derive(Serialize)]
struct DocumentSummary {
    id: Uuid,
    filename: String,
    upload_date: String,
    state: DocumentState,
    processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl From<DocumentRecord> for DocumentSummary {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            upload_date: record.created_at,
            state: record.state,
            processed: record.state == DocumentState::Processed,
            preview: record.preview,
            failure: record.failure,
        }
    }
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    10
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    let records = state.metadata.list_recent(params.limit).await?;
    Ok(Json(records.into_iter().map(DocumentSummary::from).collect()))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummary>, AppError> {
    let id =
        Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("document id must be a UUID"))?;
    let record = state.metadata.get(id).await?;
    Ok(Json(DocumentSummary::from(record)))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// Response body for `GET /search`.
#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchHit>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state.query.search(&params.q).await?;
    Ok(Json(SearchResponse {
        query: params.q,
        results,
    }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    services: ServiceHealth,
}

#[derive(Serialize)]
struct ServiceHealth {
    metadata: &'static str,
    vector_index: &'static str,
    queue: &'static str,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let metadata = match state.metadata.ping().await {
        Ok(()) => "healthy",
        Err(error) => {
            tracing::warn!(error = %error, "Metadata health probe failed");
            "unhealthy"
        }
    };
    let vector_index = if state.index.healthy().await {
        "healthy"
    } else {
        "unhealthy"
    };
    let queue = match state.queue.pending().await {
        Ok(_) => "healthy",
        Err(error) => {
            tracing::warn!(error = %error, "Queue health probe failed");
            "unhealthy"
        }
    };

    let status = if [metadata, vector_index, queue]
        .iter()
        .all(|health| *health == "healthy")
    {
        "operational"
    } else {
        "degraded"
    };

    Json(StatusResponse {
        status,
        services: ServiceHealth {
            metadata,
            vector_index,
            queue,
        },
    })
}

enum AppError {
    BadRequest(&'static str),
    Submit(SubmitError),
    Search(SearchError),
    Metadata(MetadataError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.to_string()),
            Self::Submit(SubmitError::InvalidInput(message)) => {
                (StatusCode::BAD_REQUEST, message.to_string())
            }
            Self::Submit(error) => (StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
            Self::Search(SearchError::InvalidInput(message)) => {
                (StatusCode::BAD_REQUEST, message.to_string())
            }
            Self::Search(error) => (StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
            Self::Metadata(MetadataError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("document not found: {id}"))
            }
            Self::Metadata(error) => (StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
        };
        (status, message).into_response()
    }
}

impl From<SubmitError> for AppError {
    fn from(inner: SubmitError) -> Self {
        Self::Submit(inner)
    }
}

impl From<SearchError> for AppError {
    fn from(inner: SearchError) -> Self {
        Self::Search(inner)
    }
}

impl From<MetadataError> for AppError {
    fn from(inner: MetadataError) -> Self {
        Self::Metadata(inner)
    }
}
