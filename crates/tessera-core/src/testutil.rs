//! Test utilities: mock backends, reporters, and fixture builders.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::credential::{Credential, CredentialPool};
use crate::cursor::Cursor;
use crate::error::AppError;
use crate::job::QueryType;
use crate::traits::{Backend, BackendRequest, Page};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// What a [`MockBackend`] saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub credential: Option<String>,
    pub cursor: Cursor,
    pub limit: usize,
    pub query_type: QueryType,
}

/// Mock backend that returns queued responses and records every call.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns an empty last page.
    responses: Arc<Mutex<Vec<Result<Page, AppError>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(page: Page) -> Self {
        Self::with_responses(vec![Ok(page)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<Page, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Sleep before answering, to exercise deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Backend for MockBackend {
    async fn call(&self, request: BackendRequest<'_>) -> Result<Page, AppError> {
        self.calls.lock().unwrap().push(RecordedCall {
            credential: request.credential.map(|c| c.id().to_string()),
            cursor: request.cursor.clone(),
            limit: request.limit,
            query_type: request.arguments.query_type(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Page::default())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a compact log line per event.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let line = match event {
            WorkerEvent::Started { .. } => "started".to_string(),
            WorkerEvent::JobStarted { job_type, .. } => format!("job_started:{job_type}"),
            WorkerEvent::JobCompleted { .. } => "job_completed".to_string(),
            WorkerEvent::JobFailed { error, .. } => format!("job_failed:{error}"),
            WorkerEvent::ShuttingDown { in_flight, .. } => format!("shutting_down:{in_flight}"),
            WorkerEvent::Stopped { .. } => "stopped".to_string(),
        };
        self.events.lock().unwrap().push(line);
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A pool whose credentials are named after `ids`.
pub fn make_pool(ids: &[&str]) -> CredentialPool {
    CredentialPool::new(
        "test",
        ids.iter()
            .map(|id| Credential::new(*id, format!("secret-{id}")))
            .collect(),
    )
}

/// A page of `n` numbered items continuing at `cursor` (empty = last page).
pub fn page_of(n: usize, cursor: &str) -> Page {
    let items = (0..n).map(|i| json!({"id": i, "text": format!("item {i}")})).collect();
    Page::new(items, Cursor::from(cursor))
}
