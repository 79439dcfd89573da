use std::str::FromStr;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::AppError;
use crate::job::DEFAULT_JOB_TIMEOUT;

pub const DEFAULT_SOCIAL_BASE_URL: &str = "https://api.twitter.com/2";
pub const DEFAULT_ACTOR_BASE_URL: &str = "https://api.apify.com/v2";

/// Worker configuration shared by the CLI and the server.
#[derive(Debug, Clone)]
pub struct TesseraConfig {
    pub social_credentials: Vec<Credential>,
    pub actor_credentials: Vec<Credential>,
    /// `None` keeps rate-limited credentials out until restart.
    pub credential_cooldown: Option<Duration>,
    pub stats_buffer: usize,
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    pub worker_version: String,
    pub social_base_url: String,
    pub actor_base_url: String,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            social_credentials: Vec::new(),
            actor_credentials: Vec::new(),
            credential_cooldown: None,
            stats_buffer: 1024,
            max_concurrent_jobs: 16,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            worker_version: "v1".to_string(),
            social_base_url: DEFAULT_SOCIAL_BASE_URL.to_string(),
            actor_base_url: DEFAULT_ACTOR_BASE_URL.to_string(),
        }
    }
}

impl TesseraConfig {
    /// Read configuration from environment variables.
    ///
    /// - `TESSERA_SOCIAL_API_KEYS`, `TESSERA_ACTOR_API_KEYS` (comma-separated,
    ///   `name:secret` or bare keys; missing means that pool is empty)
    /// - `TESSERA_CREDENTIAL_COOLDOWN_SECS` (optional, no recovery when unset)
    /// - `TESSERA_STATS_BUFFER` (defaults to 1024)
    /// - `TESSERA_MAX_CONCURRENT_JOBS` (defaults to 16)
    /// - `TESSERA_JOB_TIMEOUT_SECS` (defaults to 60)
    /// - `TESSERA_WORKER_VERSION`, `TESSERA_SOCIAL_BASE_URL`, `TESSERA_ACTOR_BASE_URL`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            social_credentials: get("TESSERA_SOCIAL_API_KEYS")
                .map(|raw| Credential::parse_list(&raw))
                .unwrap_or_default(),
            actor_credentials: get("TESSERA_ACTOR_API_KEYS")
                .map(|raw| Credential::parse_list(&raw))
                .unwrap_or_default(),
            credential_cooldown: get("TESSERA_CREDENTIAL_COOLDOWN_SECS")
                .map(|raw| positive::<u64>("TESSERA_CREDENTIAL_COOLDOWN_SECS", &raw))
                .transpose()?
                .map(Duration::from_secs),
            stats_buffer: get("TESSERA_STATS_BUFFER")
                .map(|raw| positive("TESSERA_STATS_BUFFER", &raw))
                .transpose()?
                .unwrap_or(defaults.stats_buffer),
            max_concurrent_jobs: get("TESSERA_MAX_CONCURRENT_JOBS")
                .map(|raw| positive("TESSERA_MAX_CONCURRENT_JOBS", &raw))
                .transpose()?
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: get("TESSERA_JOB_TIMEOUT_SECS")
                .map(|raw| positive::<u64>("TESSERA_JOB_TIMEOUT_SECS", &raw))
                .transpose()?
                .map_or(defaults.job_timeout, Duration::from_secs),
            worker_version: get("TESSERA_WORKER_VERSION").unwrap_or(defaults.worker_version),
            social_base_url: get("TESSERA_SOCIAL_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.social_base_url),
            actor_base_url: get("TESSERA_ACTOR_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.actor_base_url),
        })
    }
}

fn positive<T>(name: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': must be a positive integer"
        ))),
    }
}
