use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};

use tessera_core::error::DispatchError;
use tessera_core::job::JobResult;

use crate::auth::require_api_key;
use crate::dto::{HealthResponse, SubmitJobRequest};
use crate::error::{ApiError, JobResponse};
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/jobs", post(submit_job))
        .route("/v1/telemetry", get(telemetry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new().route("/health", get(health));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Execute one job synchronously. The body is a `JobResult` even when the
/// request itself is malformed.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    body: Result<axum::Json<SubmitJobRequest>, JsonRejection>,
) -> JobResponse {
    let request = match body {
        Ok(axum::Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed job request");
            let err = DispatchError::validation(format!(
                "invalid job request: {}",
                rejection.body_text()
            ));
            return JobResponse(JobResult::failure(&err));
        }
    };

    let job = request.into_job(state.job_timeout);
    JobResponse(state.dispatcher.execute_into_result(&job).await)
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

pub async fn telemetry(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.dispatcher.stats();
    stats.flush().await;
    Ok(axum::Json(stats.to_json()?))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        capabilities: state.dispatcher.registry().capabilities(),
    })
}
