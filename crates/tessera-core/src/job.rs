use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::error::{AppError, DispatchError, ErrorKind};

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Job families this worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Web,
    Twitter,
    Reddit,
    #[serde(rename = "tiktok")]
    TikTok,
    Telemetry,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Web,
        JobType::Twitter,
        JobType::Reddit,
        JobType::TikTok,
        JobType::Telemetry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Web => "web",
            JobType::Twitter => "twitter",
            JobType::Reddit => "reddit",
            JobType::TikTok => "tiktok",
            JobType::Telemetry => "telemetry",
        }
    }

    /// Subtypes accepted for this family. The first one is the default.
    pub fn query_types(&self) -> &'static [QueryType] {
        match self {
            JobType::Web => &[QueryType::Scraper],
            JobType::Twitter => &[
                QueryType::SearchByQuery,
                QueryType::GetById,
                QueryType::GetProfileByUsername,
            ],
            JobType::Reddit => &[QueryType::SearchPosts],
            JobType::TikTok => &[QueryType::Transcription],
            JobType::Telemetry => &[QueryType::Snapshot],
        }
    }

    pub fn default_query_type(&self) -> QueryType {
        self.query_types()[0]
    }

    /// Whether a credential must be drawn from a pool before calling the backend.
    pub fn requires_auth(&self) -> bool {
        matches!(self, JobType::Twitter | JobType::Reddit | JobType::TikTok)
    }

    /// Result ceiling used when the caller asks for zero or fewer items.
    pub fn default_max_results(&self) -> usize {
        match self {
            JobType::Twitter => 20,
            JobType::Reddit => 25,
            JobType::Web | JobType::TikTok | JobType::Telemetry => 1,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(JobType::Web),
            "twitter" => Ok(JobType::Twitter),
            "reddit" => Ok(JobType::Reddit),
            "tiktok" => Ok(JobType::TikTok),
            "telemetry" => Ok(JobType::Telemetry),
            _ => Err(format!("invalid type: {s}")),
        }
    }
}

/// Query subtypes across all families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Scraper,
    SearchByQuery,
    GetById,
    GetProfileByUsername,
    SearchPosts,
    Transcription,
    Snapshot,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Scraper => "scraper",
            QueryType::SearchByQuery => "searchbyquery",
            QueryType::GetById => "getbyid",
            QueryType::GetProfileByUsername => "getprofilebyusername",
            QueryType::SearchPosts => "searchposts",
            QueryType::Transcription => "transcription",
            QueryType::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scraper" => Ok(QueryType::Scraper),
            "searchbyquery" => Ok(QueryType::SearchByQuery),
            "getbyid" => Ok(QueryType::GetById),
            "getprofilebyusername" => Ok(QueryType::GetProfileByUsername),
            "searchposts" => Ok(QueryType::SearchPosts),
            "transcription" => Ok(QueryType::Transcription),
            "snapshot" => Ok(QueryType::Snapshot),
            _ => Err(format!("unsupported query type: {s}")),
        }
    }
}

/// One unit of requested work. Immutable once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Family tag, validated at dispatch.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Subtype tag; falls back to `arguments["type"]`, then the family default.
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    #[serde(default)]
    pub cursor: Cursor,
}

fn default_timeout() -> Duration {
    DEFAULT_JOB_TIMEOUT
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    /// Zero means "no deadline given" and falls back to the default.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(|secs| match secs {
            0 => super::DEFAULT_JOB_TIMEOUT,
            secs => Duration::from_secs(secs),
        })
    }
}

impl Job {
    pub fn new(job_type: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            query_type: None,
            arguments,
            worker_id: String::new(),
            timeout: DEFAULT_JOB_TIMEOUT,
            cursor: Cursor::start(),
        }
    }

    pub fn with_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = Some(query_type.into());
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<Cursor>) -> Self {
        self.cursor = cursor.into();
        self
    }
}

/// Outcome of one job: payload, error text, outbound cursor.
///
/// `data` is empty whenever `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResult {
    pub data: Vec<u8>,
    pub error: String,
    pub error_kind: Option<ErrorKind>,
    pub next_cursor: Cursor,
}

impl JobResult {
    pub fn success(data: Vec<u8>, next_cursor: Cursor) -> Self {
        Self {
            data,
            error: String::new(),
            error_kind: None,
            next_cursor,
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        Self {
            data: Vec::new(),
            error: err.message().to_string(),
            error_kind: Some(err.kind()),
            next_cursor: Cursor::start(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Decode `data`, refusing to touch it when the job failed.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        if !self.is_success() {
            return Err(AppError::Generic(format!("job failed: {}", self.error)));
        }
        Ok(serde_json::from_slice(&self.data)?)
    }
}

impl From<Result<JobResult, DispatchError>> for JobResult {
    fn from(result: Result<JobResult, DispatchError>) -> Self {
        match result {
            Ok(result) => result,
            Err(err) => JobResult::failure(&err),
        }
    }
}

/// Wire form: `data` is inlined as JSON when it parses, otherwise as text.
impl Serialize for JobResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            data: serde_json::Value,
            error: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            error_kind: Option<ErrorKind>,
            next_cursor: &'a Cursor,
        }

        let data = if self.data.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&self.data).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&self.data).into_owned())
            })
        };

        Wire {
            data,
            error: &self.error,
            error_kind: self.error_kind,
            next_cursor: &self.next_cursor,
        }
        .serialize(serializer)
    }
}
