use std::sync::Arc;
use std::time::Duration;

use tessera_core::config::TesseraConfig;
use tessera_core::credential::{Credential, CredentialPool};
use tessera_core::dispatcher::JobDispatcher;
use tessera_core::error::AppError;
use tessera_core::job::JobType;
use tessera_core::registry::ProviderRegistry;
use tessera_core::stats::{StatsCollector, StatsConfig};
use tokio::task::JoinHandle;

use crate::actor::ActorBackend;
use crate::twitter::TwitterBackend;
use crate::web::WebBackend;

/// Everything a worker process needs to dispatch jobs against real providers.
pub struct Providers {
    pub registry: ProviderRegistry,
    pub social_pool: Arc<CredentialPool>,
    /// Shared by every actor-backed family.
    pub actor_pool: Arc<CredentialPool>,
}

impl Providers {
    /// Build pools and backends from configuration.
    ///
    /// Families whose pool ends up empty stay registered; their jobs fail
    /// with an auth error and they are left out of the capability list.
    pub fn from_config(
        config: &TesseraConfig,
        allow_private_urls: bool,
    ) -> Result<Self, AppError> {
        let cooldown = config.credential_cooldown;
        let social_pool = Arc::new(build_pool("social", &config.social_credentials, cooldown));
        let actor_pool = Arc::new(build_pool("actor", &config.actor_credentials, cooldown));

        let mut web = WebBackend::new(config.job_timeout)?;
        if allow_private_urls {
            web = web.allow_private_urls();
        }

        let registry = ProviderRegistry::new()
            .with_backend(JobType::Web, web)
            .with_authenticated_backend(
                JobType::Twitter,
                TwitterBackend::new(&config.social_base_url, config.job_timeout)?,
                Arc::clone(&social_pool),
            )
            .with_authenticated_backend(
                JobType::Reddit,
                ActorBackend::reddit(&config.actor_base_url, config.job_timeout)?,
                Arc::clone(&actor_pool),
            )
            .with_authenticated_backend(
                JobType::TikTok,
                ActorBackend::transcription(&config.actor_base_url, config.job_timeout)?,
                Arc::clone(&actor_pool),
            );

        tracing::info!(
            social_credentials = social_pool.len(),
            actor_credentials = actor_pool.len(),
            "Providers configured"
        );

        Ok(Self {
            registry,
            social_pool,
            actor_pool,
        })
    }

    /// Start the stats consumer, publish capabilities, and wrap the registry
    /// in a dispatcher.
    pub fn into_dispatcher(self, config: &TesseraConfig) -> (JobDispatcher, JoinHandle<()>) {
        let stats_config = StatsConfig::default()
            .with_buffer(config.stats_buffer)
            .with_worker_version(config.worker_version.clone())
            .with_capabilities(self.registry.capabilities());
        let (stats, consumer) = StatsCollector::start(stats_config);

        (JobDispatcher::new(Arc::new(self.registry), stats), consumer)
    }

    pub fn pools(&self) -> [&Arc<CredentialPool>; 2] {
        [&self.social_pool, &self.actor_pool]
    }
}

fn build_pool(
    name: &str,
    credentials: &[Credential],
    cooldown: Option<Duration>,
) -> CredentialPool {
    let pool = CredentialPool::new(name, credentials.to_vec());
    match cooldown {
        Some(cooldown) => pool.with_cooldown(cooldown),
        None => pool,
    }
}
