use std::sync::Arc;

use crate::arguments::JobArguments;
use crate::credential::{Credential, CredentialPool};
use crate::error::{AppError, DispatchError, ErrorKind};
use crate::job::{Job, JobResult, JobType};
use crate::registry::ProviderRegistry;
use crate::stats::{StatKind, StatsCollector};
use crate::traits::BackendRequest;

/// Routes a [`Job`] to its backend: decode → credential → call → classify.
///
/// Stateless apart from two side effects: quarantining rate-limited
/// credentials and emitting stat events. Retries are the caller's business;
/// a rate-limited job comes back as a retryable error and the next attempt
/// will draw a different credential.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: Arc<ProviderRegistry>,
    stats: StatsCollector,
}

impl JobDispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, stats: StatsCollector) -> Self {
        Self { registry, stats }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Execute a job, folding any failure into the returned [`JobResult`].
    pub async fn execute_into_result(&self, job: &Job) -> JobResult {
        JobResult::from(self.execute(job).await)
    }

    pub async fn execute(&self, job: &Job) -> Result<JobResult, DispatchError> {
        let worker_id = job.worker_id.as_str();

        // 1 & 2. Resolve family/subtype and decode arguments.
        let arguments = match JobArguments::decode(job) {
            Ok(arguments) => arguments,
            Err(e) => {
                tracing::warn!(job_id = %job.id, %worker_id, job_type = %job.job_type, error = %e, "Job rejected");
                return Err(self.fail(worker_id, StatKind::Errors, e).await);
            }
        };
        let job_type = arguments.job_type();
        let query_type = arguments.query_type();

        if job_type == JobType::Telemetry {
            return self.telemetry();
        }

        let Some(registration) = self.registry.get(job_type) else {
            tracing::warn!(job_id = %job.id, %job_type, "No backend registered");
            let e = DispatchError::validation(format!(
                "job type not supported by this worker: {job_type}"
            ));
            return Err(self.fail(worker_id, StatKind::Errors, e).await);
        };

        // 3. Draw a credential when the family needs one.
        let credential = if job_type.requires_auth() {
            match self.acquire(job_type, registration.pool()) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, %job_type, error = %e, "No credential available");
                    return Err(self.fail(worker_id, StatKind::AuthErrors, e).await);
                }
            }
        } else {
            None
        };

        // 4. Call the backend under the job deadline.
        let request = BackendRequest {
            arguments: &arguments,
            credential: credential.as_ref(),
            cursor: &job.cursor,
            limit: arguments.max_results(),
        };

        tracing::info!(
            job_id = %job.id,
            %job_type,
            %query_type,
            credential = credential.as_ref().map(Credential::id).unwrap_or("-"),
            limit = request.limit,
            "Dispatching job"
        );
        self.stats.add(worker_id, StatKind::Scrapes, 1).await;

        let outcome = match tokio::time::timeout(
            job.timeout,
            registration.backend().call_boxed(request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Timeout(job.timeout.as_secs())),
        };

        // 5. Classify.
        match outcome {
            Ok(page) => {
                let returned = page.items.len() as u64;
                // 6. Encoding failures are ours, not the job's: no counter.
                let data = serde_json::to_vec(&page.items).map_err(|e| {
                    tracing::error!(job_id = %job.id, %job_type, error = %e, "Failed to encode results");
                    DispatchError::new(
                        ErrorKind::Serialization,
                        format!("error while encoding {job_type} results: {e}"),
                    )
                })?;

                self.stats
                    .add(worker_id, StatKind::ReturnedItems, returned)
                    .await;
                tracing::info!(job_id = %job.id, %job_type, %query_type, returned, "Job completed");

                Ok(JobResult::success(data, page.next_cursor))
            }
            Err(e) if e.is_rate_limit() => {
                if let (Some(pool), Some(credential)) = (registration.pool(), credential.as_ref()) {
                    pool.mark_unusable(credential);
                }
                tracing::warn!(job_id = %job.id, %job_type, error = %e, "Rate limited");
                let e = DispatchError::new(
                    ErrorKind::RateLimited,
                    format!("{job_type} rate-limited: {e}"),
                );
                Err(self.fail(worker_id, StatKind::RateLimitErrors, e).await)
            }
            Err(e) if e.is_auth_failure() => {
                tracing::warn!(job_id = %job.id, %job_type, error = %e, "Credential rejected");
                let e = DispatchError::new(
                    ErrorKind::AuthRejected,
                    format!("{job_type} authorization failed: {e}"),
                );
                Err(self.fail(worker_id, StatKind::AuthErrors, e).await)
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, %job_type, %query_type, error = %e, "Job failed");
                let e = DispatchError::new(
                    ErrorKind::Backend,
                    format!("error while executing {job_type} {query_type}: {e}"),
                );
                Err(self.fail(worker_id, StatKind::Errors, e).await)
            }
        }
    }

    fn acquire(
        &self,
        job_type: JobType,
        pool: Option<&Arc<CredentialPool>>,
    ) -> Result<Credential, DispatchError> {
        let pool = match pool {
            Some(pool) if !pool.is_empty() => pool,
            _ => {
                return Err(DispatchError::new(
                    ErrorKind::AuthExhausted,
                    format!("{job_type} credentials not configured"),
                ));
            }
        };

        pool.next().ok_or_else(|| {
            DispatchError::new(
                ErrorKind::AuthExhausted,
                format!("all {job_type} accounts are rate-limited"),
            )
        })
    }

    fn telemetry(&self) -> Result<JobResult, DispatchError> {
        let snapshot = self.stats.snapshot();
        let data = serde_json::to_vec(&snapshot).map_err(|e| {
            DispatchError::new(
                ErrorKind::Serialization,
                format!("error while encoding telemetry: {e}"),
            )
        })?;
        Ok(JobResult::success(data, Default::default()))
    }

    async fn fail(&self, worker_id: &str, kind: StatKind, err: DispatchError) -> DispatchError {
        self.stats.add(worker_id, kind, 1).await;
        err
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::credential::CredentialStatus;
    use crate::cursor::Cursor;
    use crate::stats::StatsConfig;
    use crate::testutil::{MockBackend, make_pool, page_of};

    struct Harness {
        dispatcher: JobDispatcher,
        backend: MockBackend,
        pool: Arc<CredentialPool>,
    }

    fn harness(backend: MockBackend, pool: CredentialPool) -> Harness {
        let pool = Arc::new(pool);
        let registry = ProviderRegistry::new()
            .with_authenticated_backend(JobType::Twitter, backend.clone(), Arc::clone(&pool))
            .with_backend(JobType::Web, backend.clone());
        let (stats, _task) = StatsCollector::start(StatsConfig::default());
        Harness {
            dispatcher: JobDispatcher::new(Arc::new(registry), stats),
            backend,
            pool,
        }
    }

    fn search(query: &str) -> Job {
        Job::new("twitter", json!({"query": query})).with_worker_id("w1")
    }

    async fn count(dispatcher: &JobDispatcher, kind: StatKind) -> u64 {
        dispatcher.stats().flush().await;
        dispatcher.stats().snapshot().stats.get("w1", kind)
    }

    #[tokio::test]
    async fn empty_query_fails_validation_without_touching_pool() {
        let h = harness(MockBackend::empty(), make_pool(&["a", "b"]));

        let result = h.dispatcher.execute_into_result(&search("")).await;

        assert!(result.error.contains("query is required"));
        assert!(result.data.is_empty());
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 1);
        assert_eq!(count(&h.dispatcher, StatKind::Scrapes).await, 0);
        assert!(h.pool.states().iter().all(|s| s.last_used.is_none()));
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_subtype_counts_one_error() {
        let h = harness(MockBackend::empty(), make_pool(&["a"]));

        let err = h
            .dispatcher
            .execute(&search("x").with_query_type("unsupported"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("unsupported query type"));
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 1);
        assert!(h.pool.states().iter().all(|s| s.last_used.is_none()));
    }

    #[tokio::test]
    async fn unknown_family_counts_one_error() {
        let h = harness(MockBackend::empty(), make_pool(&["a"]));
        let job = Job::new("search", json!({"query": "x"})).with_worker_id("w1");

        let result = h.dispatcher.execute_into_result(&job).await;

        assert!(result.error.contains("invalid type"));
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 1);
        assert_eq!(count(&h.dispatcher, StatKind::AuthErrors).await, 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_quarantines_the_credential_used() {
        let backend = MockBackend::with_error(AppError::RateLimitExceeded("429".into()));
        let h = harness(backend, make_pool(&["a", "b"]));

        let err = h.dispatcher.execute(&search("x")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
        assert_eq!(h.backend.calls()[0].credential.as_deref(), Some("a"));
        assert_eq!(h.pool.states()[0].status, CredentialStatus::RateLimited);
        assert_eq!(h.pool.states()[1].status, CredentialStatus::Available);
        assert_eq!(count(&h.dispatcher, StatKind::RateLimitErrors).await, 1);
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 0);
    }

    #[tokio::test]
    async fn caller_retry_moves_to_next_credential() {
        let backend = MockBackend::with_responses(vec![
            Err(AppError::RateLimitExceeded("429".into())),
            Ok(page_of(2, "")),
        ]);
        let h = harness(backend, make_pool(&["a", "b"]));
        let job = search("x");

        assert!(h.dispatcher.execute(&job).await.is_err());
        assert!(h.dispatcher.execute(&job).await.is_ok());

        let used: Vec<_> = h
            .backend
            .calls()
            .into_iter()
            .map(|c| c.credential.unwrap())
            .collect();
        assert_eq!(used, ["a", "b"]);
    }

    #[tokio::test]
    async fn success_counts_returned_items() {
        let h = harness(MockBackend::new(page_of(5, "cursor-2")), make_pool(&["a"]));

        let result = h.dispatcher.execute(&search("rust")).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.next_cursor, Cursor::from("cursor-2"));
        let items: Vec<serde_json::Value> = result.decode().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(count(&h.dispatcher, StatKind::ReturnedItems).await, 5);
        assert_eq!(count(&h.dispatcher, StatKind::Scrapes).await, 1);
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 0);
    }

    #[tokio::test]
    async fn cursor_and_limit_are_threaded_to_backend() {
        let h = harness(MockBackend::new(page_of(1, "")), make_pool(&["a"]));
        let job = Job::new("twitter", json!({"query": "x", "max_results": 0}))
            .with_worker_id("w1")
            .with_cursor("opaque-token");

        h.dispatcher.execute(&job).await.unwrap();

        let call = &h.backend.calls()[0];
        assert_eq!(call.cursor, Cursor::from("opaque-token"));
        assert_eq!(call.limit, 20);
    }

    #[tokio::test]
    async fn exhausted_pool_is_an_auth_error() {
        let h = harness(MockBackend::empty(), make_pool(&["a"]));
        let a = h.pool.next().unwrap();
        h.pool.mark_unusable(&a);

        let err = h.dispatcher.execute(&search("x")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthExhausted);
        assert!(err.message().contains("rate-limited"));
        assert_eq!(count(&h.dispatcher, StatKind::AuthErrors).await, 1);
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_pool_reports_not_configured() {
        let h = harness(MockBackend::empty(), make_pool(&[]));

        let err = h.dispatcher.execute(&search("x")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthExhausted);
        assert!(err.message().contains("credentials not configured"));
    }

    #[tokio::test]
    async fn rejected_credential_is_not_retryable() {
        let backend = MockBackend::with_error(AppError::Unauthorized("suspended".into()));
        let h = harness(backend, make_pool(&["a"]));

        let err = h.dispatcher.execute(&search("x")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthRejected);
        assert!(!err.is_retryable());
        assert_eq!(h.pool.states()[0].status, CredentialStatus::Available);
        assert_eq!(count(&h.dispatcher, StatKind::AuthErrors).await, 1);
    }

    #[tokio::test]
    async fn generic_failure_is_wrapped() {
        let backend = MockBackend::with_error(AppError::HttpError("HTTP 500".into()));
        let h = harness(backend, make_pool(&["a"]));

        let result = h.dispatcher.execute_into_result(&search("x")).await;

        assert_eq!(result.error_kind, Some(ErrorKind::Backend));
        assert!(result.error.contains("HTTP 500"));
        assert!(result.data.is_empty());
        assert_eq!(count(&h.dispatcher, StatKind::Errors).await, 1);
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_backend_failure() {
        let backend = MockBackend::new(page_of(1, "")).with_delay(Duration::from_secs(5));
        let h = harness(backend, make_pool(&["a"]));
        let job = search("x").with_timeout(Duration::from_millis(20));

        let err = h.dispatcher.execute(&job).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.message().contains("timed out"));
        assert_eq!(h.pool.states()[0].status, CredentialStatus::Available);
    }

    #[tokio::test]
    async fn unauthenticated_family_skips_pool() {
        let h = harness(MockBackend::new(page_of(1, "")), make_pool(&["a"]));
        let job = Job::new("web", json!({"url": "https://example.com"})).with_worker_id("w1");

        h.dispatcher.execute(&job).await.unwrap();

        assert_eq!(h.backend.calls()[0].credential, None);
        assert!(h.pool.states()[0].last_used.is_none());
    }

    #[tokio::test]
    async fn unregistered_family_is_rejected() {
        let h = harness(MockBackend::empty(), make_pool(&["a"]));
        let job = Job::new("reddit", json!({"query": "x"})).with_worker_id("w1");

        let err = h.dispatcher.execute(&job).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("not supported by this worker"));
    }

    #[tokio::test]
    async fn telemetry_job_returns_snapshot() {
        let h = harness(MockBackend::new(page_of(3, "")), make_pool(&["a"]));
        h.dispatcher.execute(&search("x")).await.unwrap();
        h.dispatcher.stats().flush().await;

        let result = h
            .dispatcher
            .execute(&Job::new("telemetry", serde_json::Value::Null))
            .await
            .unwrap();

        let snapshot: serde_json::Value = result.decode().unwrap();
        assert_eq!(snapshot["stats"]["w1"]["returned_items"], 3);
        assert!(snapshot["current_time"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_do_not_lose_counts() {
        let h = harness(MockBackend::empty(), make_pool(&["a", "b", "c"]));
        let dispatcher = Arc::new(h.dispatcher);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move { dispatcher.execute(&search("x")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(count(&dispatcher, StatKind::Scrapes).await, 50);
        assert_eq!(h.backend.calls().len(), 50);
    }
}
