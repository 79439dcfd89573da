use std::time::Duration;

use tessera_core::dispatcher::JobDispatcher;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub dispatcher: JobDispatcher,
    /// Bearer token required on every `/v1` route.
    pub api_key: String,
    /// Deadline for jobs that do not carry their own.
    pub job_timeout: Duration,
}
