use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tessera_core::error::AppError;

use crate::dto::ErrorResponse;
use crate::state::AppState;

/// Refuse a blank API key so an empty bearer token cannot authenticate.
pub fn validate_api_key(key: &str) -> Result<(), AppError> {
    if key.trim().is_empty() {
        return Err(AppError::ConfigError(
            "TESSERA_SERVER_API_KEY must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Middleware that validates `Authorization: Bearer <token>` against the configured API key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let authenticated = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(state.api_key.as_bytes())));

    if !authenticated {
        let body = ErrorResponse {
            error: "unauthorized".to_string(),
            message: "Missing or invalid Authorization header. Expected: Bearer <api_key>"
                .to_string(),
        };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_keys_are_rejected() {
        for key in ["", "   ", "\t"] {
            assert!(validate_api_key(key).is_err(), "{key:?}");
        }
        assert!(validate_api_key("s3cret").is_ok());
    }
}
