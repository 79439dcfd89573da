use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;

use tessera_core::credential::CredentialPool;
use tessera_core::dispatcher::JobDispatcher;
use tessera_core::job::JobType;
use tessera_core::registry::ProviderRegistry;
use tessera_core::stats::{StatsCollector, StatsConfig};
use tessera_core::testutil::{MockBackend, make_pool};
use tessera_server::routes;
use tessera_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub backend: MockBackend,
    pub pool: Arc<CredentialPool>,
}

/// Router backed by one mock serving both `web` and `twitter`, with the
/// twitter family drawing from a pool of `credentials`.
pub fn setup_test_app(backend: MockBackend, credentials: &[&str]) -> TestApp {
    let pool = Arc::new(make_pool(credentials));
    let registry = ProviderRegistry::new()
        .with_backend(JobType::Web, backend.clone())
        .with_authenticated_backend(JobType::Twitter, backend.clone(), Arc::clone(&pool));

    let stats_config = StatsConfig::default().with_capabilities(registry.capabilities());
    let (stats, _consumer) = StatsCollector::start(stats_config);

    let state = Arc::new(AppState {
        dispatcher: JobDispatcher::new(Arc::new(registry), stats),
        api_key: TEST_API_KEY.to_string(),
        job_timeout: Duration::from_secs(5),
    });

    TestApp {
        router: routes::router(state),
        backend,
        pool,
    }
}

pub fn post_job(body: serde_json::Value) -> Request<Body> {
    Request::post("/v1/jobs")
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_authed(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .body(Body::empty())
        .unwrap()
}
