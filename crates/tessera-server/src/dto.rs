use std::time::Duration;

use serde::{Deserialize, Serialize};

use tessera_core::cursor::Cursor;
use tessera_core::job::Job;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl SubmitJobRequest {
    pub fn into_job(self, default_timeout: Duration) -> Job {
        let timeout = self
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map_or(default_timeout, Duration::from_secs);

        let mut job = Job::new(self.job_type, self.arguments)
            .with_worker_id(self.worker_id)
            .with_timeout(timeout)
            .with_cursor(self.cursor.map(Cursor::from).unwrap_or_default());
        job.query_type = self.query_type;
        job
    }
}

// ---------------------------------------------------------------------------
// Health & errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
