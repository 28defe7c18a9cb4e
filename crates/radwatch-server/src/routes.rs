//! HTTP routes and handlers

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, FromRequest, Multipart, Path, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use radwatch_classifiers::{DocumentScore, ModelStatus};
use radwatch_core::{ArtifactKind, Error};
use radwatch_ops::{BatchStatusView, TrainingMetadata, TrainingTask, UploadTask};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    let chunk_limit = DefaultBodyLimit::max(state.max_chunk_bytes);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/upload/init", post(upload_init))
        .route("/upload/chunk", post(upload_chunk).layer(chunk_limit))
        .route("/upload/finish", post(upload_finish))
        .route("/upload/cancel", post(upload_cancel))
        .route("/upload/status/:upload_id", get(upload_status))
        .route("/classification/start", post(classification_start))
        .route("/classification/status/:dataset_id", get(classification_status))
        .route("/classification/text", post(classify_text))
        .route("/training/train", post(training_start))
        .route("/training/status/:task_id", get(training_status))
        .route("/settings/threshold", get(get_threshold).put(put_threshold))
        .route("/models/status", get(models_status))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "models_loaded": state.registry.loaded_count(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

async fn fallback() -> ApiError {
    ApiError::Core(Error::not_found("no such route"))
}

// Uploads

#[derive(Debug, Deserialize)]
struct InitRequest {
    filename: String,
    model_type: String,
}

#[derive(Debug, Serialize)]
struct InitResponse {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadIdRequest {
    upload_id: String,
}

async fn upload_init(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<InitRequest>,
) -> Result<Json<InitResponse>, ApiError> {
    let kind: ArtifactKind = request.model_type.parse()?;
    let uploads = state.uploads.clone();
    let task = blocking(move || uploads.init(&request.filename, kind)).await?;
    Ok(Json(InitResponse { upload_id: task.id }))
}

async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut multipart =
        multipart.map_err(|rejection| ApiError::Rejected(rejection.status(), rejection.body_text()))?;
    let mut upload_id = None;
    let mut chunk_index = None;
    let mut chunk = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "upload_id" => upload_id = Some(field_text(field).await?),
            "chunk_index" => {
                let raw = field_text(field).await?;
                let index = raw.trim().parse::<u64>().map_err(|_| {
                    ApiError::BadRequest(format!("chunk_index must be a non-negative integer, got '{}'", raw))
                })?;
                chunk_index = Some(index);
            }
            "chunk" => {
                chunk = Some(field.bytes().await.map_err(multipart_error)?);
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let (Some(upload_id), Some(chunk_index), Some(chunk)) = (upload_id, chunk_index, chunk) else {
        return Err(ApiError::BadRequest(
            "upload_id, chunk_index and chunk are required".to_string(),
        ));
    };

    let uploads = state.uploads.clone();
    blocking(move || uploads.chunk(&upload_id, chunk_index, &chunk)).await?;
    Ok(Json(json!({ "success": true })))
}

/// Run filesystem or scoring work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> radwatch_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::Rejected(err.status(), err.body_text())
}

async fn upload_finish(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UploadIdRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The worker reports through the task record; the handle is detached
    let _ = state.uploads.finish(&request.upload_id)?;
    Ok(Json(json!({ "success": true })))
}

async fn upload_cancel(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UploadIdRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = state.uploads.cancel(&request.upload_id)?;
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn upload_status(
    State(state): State<AppState>,
    upload_id: Result<Path<String>, PathRejection>,
) -> Result<Json<UploadTask>, ApiError> {
    let Path(upload_id) = upload_id?;
    Ok(Json(state.uploads.status(&upload_id)?))
}

// Batch classification

#[derive(Debug, Deserialize)]
struct StartBatchRequest {
    dataset_id: i64,
}

#[derive(Debug, Deserialize)]
struct ClassifyTextRequest {
    text: String,
}

async fn classification_start(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StartBatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let spawned = state.batches.start(request.dataset_id)?;
    Ok(Json(json!({ "success": true, "batch_id": spawned.id })))
}

async fn classification_status(
    State(state): State<AppState>,
    dataset_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<BatchStatusView>, ApiError> {
    let Path(dataset_id) = dataset_id?;
    Ok(Json(state.batches.status(dataset_id)?))
}

async fn classify_text(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ClassifyTextRequest>,
) -> Result<Json<DocumentScore>, ApiError> {
    let batches = state.batches.clone();
    let score = blocking(move || batches.classify_text(&request.text)).await?;
    radwatch_telemetry::metrics::documents_classified(1);
    Ok(Json(score))
}

// Training

async fn training_start(
    State(state): State<AppState>,
    ApiJson(metadata): ApiJson<TrainingMetadata>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let spawned = state.training.start(metadata)?;
    Ok(Json(json!({ "task_id": spawned.id })))
}

async fn training_status(
    State(state): State<AppState>,
    task_id: Result<Path<String>, PathRejection>,
) -> Result<Json<TrainingTask>, ApiError> {
    let Path(task_id) = task_id?;
    Ok(Json(state.training.status(&task_id)?))
}

// Settings

#[derive(Debug, Serialize, Deserialize)]
struct ThresholdBody {
    threshold: f32,
}

async fn get_threshold(State(state): State<AppState>) -> Json<ThresholdBody> {
    Json(ThresholdBody {
        threshold: state.registry.threshold(),
    })
}

async fn put_threshold(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ThresholdBody>,
) -> Result<Json<ThresholdBody>, ApiError> {
    state.registry.set_threshold(request.threshold)?;
    Ok(Json(ThresholdBody {
        threshold: state.registry.threshold(),
    }))
}

#[derive(Debug, Serialize)]
struct ModelsStatusResponse {
    threshold: f32,
    models: Vec<ModelStatus>,
}

async fn models_status(State(state): State<AppState>) -> Json<ModelsStatusResponse> {
    Json(ModelsStatusResponse {
        threshold: state.registry.threshold(),
        models: state.registry.status(),
    })
}

/// JSON body extractor whose rejections use the API error body
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Error handling
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    BadRequest(String),
    /// Extractor rejection carrying its own status
    Rejected(StatusCode, String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            ApiError::Rejected(status, _) => (*status, "invalid_request_error"),
            ApiError::Core(err) => match err {
                Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                Error::InvalidState(_) => (StatusCode::BAD_REQUEST, "invalid_state_error"),
                Error::Config(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                Error::Cancelled => (StatusCode::BAD_REQUEST, "cancelled"),
                Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
                Error::Conflict(_) => (StatusCode::CONFLICT, "conflict_error"),
                Error::TransientIo(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient_io_error"),
                Error::ResourceUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "resource_unavailable_error")
                }
                Error::Classifier(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Rejected(_, msg) => msg,
            ApiError::Core(err) => err.to_string(),
        };

        if status.is_server_error() {
            warn!(status = status.as_u16(), %message, "Request failed");
        } else {
            info!(status = status.as_u16(), %message, "Request rejected");
        }

        let body = json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        });

        (status, Json(body)).into_response()
    }
}
