use crate::acquisition::{self, AcquireError};
use crate::models::{ClassificationResponse, HealthResponse, HistoryEntry};
use crate::state::DemoAppState;
use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use snapclass_classifiers::{LoadPhase, ModelStatus};

// ============================================================================
// Health endpoints
// ============================================================================

pub async fn health(State(state): State<DemoAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.classifier.status(),
    })
}

pub async fn render_metrics(State(state): State<DemoAppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// ============================================================================
// Model endpoints
// ============================================================================

pub async fn get_model(State(state): State<DemoAppState>) -> Json<ModelStatus> {
    Json(state.classifier.status())
}

/// Start (or retry) loading; returns immediately with the new status
pub async fn load_model(State(state): State<DemoAppState>) -> impl IntoResponse {
    state.classifier.load_in_background();
    let status = state.classifier.status();

    let code = if status.phase == LoadPhase::Ready {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (code, Json(status))
}

// ============================================================================
// Classification endpoints
// ============================================================================

pub async fn classify(
    State(state): State<DemoAppState>,
    request: Request,
) -> Result<Json<ClassificationResponse>, AppError> {
    let image = acquisition::image_from_request(request, state.config.max_upload_bytes).await?;
    tracing::debug!(
        "Received {} ({} bytes, {})",
        image.file_name().unwrap_or("upload"),
        image.len(),
        image.media_type()
    );

    Ok(Json(state.classify_and_record(image).await?))
}

// ============================================================================
// History endpoints
// ============================================================================

pub async fn list_history(State(state): State<DemoAppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.list())
}

pub async fn clear_history(State(state): State<DemoAppState>) -> impl IntoResponse {
    let removed = state.history.clear();
    state.publish_history();
    Json(json!({ "removed": removed }))
}

pub async fn history_image(
    State(state): State<DemoAppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let image = state
        .history
        .image(&id)
        .ok_or_else(|| AppError::NotFound(format!("No history entry '{}'", id)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image.media_type().to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        image.bytes().clone(),
    )
        .into_response())
}

/// Classify a stored image again; the result becomes a new history entry
pub async fn reclassify(
    State(state): State<DemoAppState>,
    Path(id): Path<String>,
) -> Result<Json<ClassificationResponse>, AppError> {
    let image = state
        .history
        .image(&id)
        .ok_or_else(|| AppError::NotFound(format!("No history entry '{}'", id)))?;

    Ok(Json(state.classify_and_record(image).await?))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Classifier(snapclass_core::Error),
    Upload(AcquireError),
    NotFound(String),
}

impl From<snapclass_core::Error> for AppError {
    fn from(err: snapclass_core::Error) -> Self {
        AppError::Classifier(err)
    }
}

impl From<AcquireError> for AppError {
    fn from(err: AcquireError) -> Self {
        AppError::Upload(err)
    }
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        use snapclass_core::Error;

        match self {
            AppError::Classifier(err) => {
                let status = match err {
                    Error::ModelLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    Error::InvalidImage(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
            AppError::Upload(AcquireError::UnsupportedMediaType(_)) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
            }
            AppError::Upload(AcquireError::Malformed(_)) => (StatusCode::BAD_REQUEST, "invalid_upload"),
            AppError::Upload(AcquireError::TooLarge(_)) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Classifier(err) => err.to_string(),
            AppError::Upload(err) => err.to_string(),
            AppError::NotFound(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, message);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, message);
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
