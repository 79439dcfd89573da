//! Typed job arguments, decoded from a [`Job`]'s untyped argument bag.
//!
//! Decoding resolves the family and subtype first and rejects unknown tags
//! before any family-specific parsing runs. Required-field checks happen
//! here too, so a job that fails them never reaches a credential pool.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::DispatchError;
use crate::job::{Job, JobType, QueryType};

/// Upper bound on any caller-requested result count.
pub const MAX_RESULTS_CEILING: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobArguments {
    Web(WebArguments),
    Twitter(TwitterArguments),
    Reddit(RedditArguments),
    TikTok(TranscriptionArguments),
    Telemetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebArguments {
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwitterArguments {
    SearchByQuery { query: String, max_results: usize },
    GetById { id: u64 },
    GetProfileByUsername { username: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditArguments {
    pub query: String,
    pub sort: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionArguments {
    pub video_url: String,
    pub language: Option<String>,
}

// ---- raw shapes, as they arrive in the argument bag ----

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawWeb {
    url: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTwitter {
    query: String,
    id: Option<serde_json::Value>,
    username: String,
    max_results: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawReddit {
    query: String,
    sort: Option<String>,
    max_results: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTranscription {
    video_url: String,
    language: Option<String>,
}

impl JobArguments {
    /// Resolve and validate a job's family, subtype, and arguments.
    pub fn decode(job: &Job) -> Result<Self, DispatchError> {
        let job_type: JobType = job
            .job_type
            .parse()
            .map_err(DispatchError::validation)?;
        let query_type = resolve_query_type(job, job_type)?;

        match job_type {
            JobType::Web => {
                let raw: RawWeb = parse_bag(job, job_type)?;
                let url = require(raw.url, "url")?;
                let url = Url::parse(&url)
                    .map_err(|e| DispatchError::validation(format!("invalid url {url}: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(DispatchError::validation(format!(
                        "url scheme '{}' is not allowed (only http/https)",
                        url.scheme()
                    )));
                }
                Ok(JobArguments::Web(WebArguments { url }))
            }
            JobType::Twitter => {
                let raw: RawTwitter = parse_bag(job, job_type)?;
                let args = match query_type {
                    QueryType::GetById => TwitterArguments::GetById {
                        id: parse_id(raw.id.as_ref())?,
                    },
                    QueryType::GetProfileByUsername => {
                        // Accept the handle in either field, with or without '@'.
                        let username = if raw.username.is_empty() {
                            raw.query
                        } else {
                            raw.username
                        };
                        let username = require(username, "username")?;
                        TwitterArguments::GetProfileByUsername {
                            username: username.trim_start_matches('@').to_string(),
                        }
                    }
                    _ => TwitterArguments::SearchByQuery {
                        query: require(raw.query, "query")?,
                        max_results: normalize_limit(raw.max_results, job_type),
                    },
                };
                Ok(JobArguments::Twitter(args))
            }
            JobType::Reddit => {
                let raw: RawReddit = parse_bag(job, job_type)?;
                Ok(JobArguments::Reddit(RedditArguments {
                    query: require(raw.query, "query")?,
                    sort: raw.sort.filter(|s| !s.is_empty()),
                    max_results: normalize_limit(raw.max_results, job_type),
                }))
            }
            JobType::TikTok => {
                let raw: RawTranscription = parse_bag(job, job_type)?;
                Ok(JobArguments::TikTok(TranscriptionArguments {
                    video_url: require(raw.video_url, "video_url")?,
                    language: raw.language.filter(|l| !l.is_empty()),
                }))
            }
            JobType::Telemetry => Ok(JobArguments::Telemetry),
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobArguments::Web(_) => JobType::Web,
            JobArguments::Twitter(_) => JobType::Twitter,
            JobArguments::Reddit(_) => JobType::Reddit,
            JobArguments::TikTok(_) => JobType::TikTok,
            JobArguments::Telemetry => JobType::Telemetry,
        }
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            JobArguments::Twitter(TwitterArguments::SearchByQuery { .. }) => {
                QueryType::SearchByQuery
            }
            JobArguments::Twitter(TwitterArguments::GetById { .. }) => QueryType::GetById,
            JobArguments::Twitter(TwitterArguments::GetProfileByUsername { .. }) => {
                QueryType::GetProfileByUsername
            }
            other => other.job_type().default_query_type(),
        }
    }

    /// Result ceiling handed to the backend.
    pub fn max_results(&self) -> usize {
        match self {
            JobArguments::Twitter(TwitterArguments::SearchByQuery { max_results, .. }) => {
                *max_results
            }
            JobArguments::Reddit(args) => args.max_results,
            other => other.job_type().default_max_results(),
        }
    }
}

fn resolve_query_type(job: &Job, job_type: JobType) -> Result<QueryType, DispatchError> {
    let tag = job
        .query_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            job.arguments
                .get("type")
                .and_then(|v| v.as_str())
                .filter(|t| !t.is_empty())
        });

    let Some(tag) = tag else {
        return Ok(job_type.default_query_type());
    };

    let query_type: QueryType = tag.parse().map_err(DispatchError::validation)?;
    if !job_type.query_types().contains(&query_type) {
        return Err(DispatchError::validation(format!(
            "unsupported query type: {query_type} for {job_type}"
        )));
    }
    Ok(query_type)
}

fn parse_bag<T: DeserializeOwned + Default>(
    job: &Job,
    job_type: JobType,
) -> Result<T, DispatchError> {
    match &job.arguments {
        serde_json::Value::Null => Ok(T::default()),
        serde_json::Value::Object(_) => serde_json::from_value(job.arguments.clone())
            .map_err(|e| DispatchError::validation(format!("invalid {job_type} arguments: {e}"))),
        _ => Err(DispatchError::validation(format!(
            "invalid {job_type} arguments: expected an object"
        ))),
    }
}

fn require(value: String, field: &str) -> Result<String, DispatchError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Ids arrive as JSON numbers or numeric strings; zero counts as missing.
fn parse_id(raw: Option<&serde_json::Value>) -> Result<u64, DispatchError> {
    let id = match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    match id {
        Some(id) if id != 0 => Ok(id),
        _ => Err(DispatchError::validation("id is required")),
    }
}

fn normalize_limit(requested: i64, job_type: JobType) -> usize {
    if requested <= 0 {
        return job_type.default_max_results();
    }
    usize::try_from(requested)
        .unwrap_or(MAX_RESULTS_CEILING)
        .min(MAX_RESULTS_CEILING)
}
