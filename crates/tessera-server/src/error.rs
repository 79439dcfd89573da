use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tessera_core::error::{AppError, ErrorKind};
use tessera_core::job::JobResult;

use crate::dto::ErrorResponse;

/// HTTP status for a failed job.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::AuthRejected | ErrorKind::Backend => StatusCode::BAD_GATEWAY,
        ErrorKind::AuthExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A job result paired with the status its outcome maps to.
pub struct JobResponse(pub JobResult);

impl IntoResponse for JobResponse {
    fn into_response(self) -> Response {
        let status = self.0.error_kind.map_or(StatusCode::OK, status_for);
        (status, axum::Json(self.0)).into_response()
    }
}

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AppError::SerializationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::WorkerUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
