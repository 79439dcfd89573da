use std::collections::HashMap;
use std::sync::Arc;

use crate::credential::CredentialPool;
use crate::job::JobType;
use crate::traits::{Backend, DynBackend};

/// A backend plus the pool its credentials come from.
pub struct Registration {
    backend: Arc<dyn DynBackend>,
    pool: Option<Arc<CredentialPool>>,
}

impl Registration {
    pub(crate) fn backend(&self) -> &dyn DynBackend {
        self.backend.as_ref()
    }

    pub fn pool(&self) -> Option<&Arc<CredentialPool>> {
        self.pool.as_ref()
    }
}

/// Maps job families to the backends serving them on this worker.
///
/// Built once at startup and shared read-only by every dispatcher. Pools
/// are passed in by reference, so several families can draw from the same
/// pool.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<JobType, Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend that needs no credentials.
    pub fn with_backend<B: Backend>(self, job_type: JobType, backend: B) -> Self {
        self.insert(job_type, backend, None)
    }

    /// Register a backend that draws credentials from `pool`.
    pub fn with_authenticated_backend<B: Backend>(
        self,
        job_type: JobType,
        backend: B,
        pool: Arc<CredentialPool>,
    ) -> Self {
        self.insert(job_type, backend, Some(pool))
    }

    fn insert<B: Backend>(
        mut self,
        job_type: JobType,
        backend: B,
        pool: Option<Arc<CredentialPool>>,
    ) -> Self {
        if job_type == JobType::Telemetry {
            tracing::warn!("Telemetry is served by the dispatcher, ignoring backend");
            return self;
        }
        tracing::debug!(%job_type, pooled = pool.is_some(), "Registered backend");
        self.providers.insert(
            job_type,
            Registration {
                backend: Arc::new(backend),
                pool,
            },
        );
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&Registration> {
        self.providers.get(&job_type)
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        job_type == JobType::Telemetry || self.providers.contains_key(&job_type)
    }

    /// `family:subtype` strings for everything this worker can run.
    ///
    /// Authenticated families with an empty (or missing) pool are left out,
    /// since every job for them would fail.
    pub fn capabilities(&self) -> Vec<String> {
        JobType::ALL
            .iter()
            .filter(|job_type| match self.providers.get(*job_type) {
                Some(registration) if job_type.requires_auth() => registration
                    .pool
                    .as_ref()
                    .is_some_and(|pool| !pool.is_empty()),
                Some(_) => true,
                None => **job_type == JobType::Telemetry,
            })
            .flat_map(|job_type| {
                job_type
                    .query_types()
                    .iter()
                    .map(move |query_type| format!("{job_type}:{query_type}"))
            })
            .collect()
    }
}
