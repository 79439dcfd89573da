//! Hosted actor runner client.
//!
//! Each family maps to one actor. Runs are synchronous: the request blocks
//! until the actor finishes and the response body is its dataset. Actors
//! have no native paging, so the cursor is an item offset into the dataset.

use std::time::Duration;

use serde_json::{Value, json};
use tessera_core::arguments::JobArguments;
use tessera_core::cursor::Cursor;
use tessera_core::error::AppError;
use tessera_core::traits::{Backend, BackendRequest, Page};
use url::Url;

use crate::http::HttpClient;

pub const REDDIT_ACTOR: &str = "trudax~reddit-scraper-lite";
pub const TRANSCRIPTION_ACTOR: &str = "tictechid~anoxvanzi-transcriber";

#[derive(Clone)]
pub struct ActorBackend {
    http: HttpClient,
    base_url: String,
    actor_id: String,
}

impl ActorBackend {
    pub fn new(
        base_url: &str,
        actor_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            http: HttpClient::new(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            actor_id: actor_id.into(),
        })
    }

    pub fn reddit(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Self::new(base_url, REDDIT_ACTOR, timeout)
    }

    pub fn transcription(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Self::new(base_url, TRANSCRIPTION_ACTOR, timeout)
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    fn run_url(&self) -> Result<Url, AppError> {
        let url = format!(
            "{}/acts/{}/run-sync-get-dataset-items",
            self.base_url, self.actor_id
        );
        Url::parse(&url)
            .map_err(|e| AppError::ConfigError(format!("Invalid actor API base URL: {e}")))
    }
}

impl Backend for ActorBackend {
    async fn call(&self, request: BackendRequest<'_>) -> Result<Page, AppError> {
        let credential = request
            .credential
            .ok_or_else(|| AppError::Unauthorized("no credential supplied".into()))?;
        let offset = parse_offset(request.cursor)?;
        let input = build_input(request.arguments, offset, request.limit)?;

        tracing::debug!(actor = %self.actor_id, offset, limit = request.limit, "Starting actor run");
        let http_request = self
            .http
            .inner()
            .post(self.run_url()?)
            .bearer_auth(credential.secret())
            .json(&input);
        let response = self.http.send(http_request).await?;
        let dataset: Vec<Value> = self.http.json(response).await?;

        Ok(paginate(dataset, offset, request.limit))
    }
}

fn parse_offset(cursor: &Cursor) -> Result<usize, AppError> {
    if cursor.is_start() {
        return Ok(0);
    }
    cursor
        .as_str()
        .parse()
        .map_err(|_| {
            AppError::Generic(format!("invalid cursor '{cursor}': expected an item offset"))
        })
}

/// Actor input for one job. Asks for enough items to cover `offset + limit`.
fn build_input(arguments: &JobArguments, offset: usize, limit: usize) -> Result<Value, AppError> {
    let max_items = offset
        .checked_add(limit)
        .ok_or_else(|| AppError::Generic(format!("invalid cursor '{offset}': offset out of range")))?;

    match arguments {
        JobArguments::Reddit(args) => Ok(json!({
            "searches": [args.query],
            "sort": args.sort.as_deref().unwrap_or("new"),
            "maxItems": max_items,
            "skipComments": true,
        })),
        JobArguments::TikTok(args) => Ok(json!({
            "videoUrl": args.video_url,
            "language": args.language.as_deref().unwrap_or("eng-US"),
        })),
        other => Err(AppError::Generic(format!(
            "actor backend cannot run {} jobs",
            other.job_type()
        ))),
    }
}

/// Slice `[offset, offset + limit)` out of the dataset. A full page means
/// there may be more, so the next cursor points past it.
fn paginate(dataset: Vec<Value>, offset: usize, limit: usize) -> Page {
    let items: Vec<Value> = dataset.into_iter().skip(offset).take(limit).collect();
    let next_cursor = match offset.checked_add(limit) {
        Some(end) if items.len() == limit && limit > 0 => Cursor::new(end.to_string()),
        _ => Cursor::start(),
    };
    Page::new(items, next_cursor)
}

#[cfg(test)]
mod tests {
    use tessera_core::job::Job;

    use super::*;

    fn decode(job_type: &str, arguments: Value) -> JobArguments {
        JobArguments::decode(&Job::new(job_type, arguments)).unwrap()
    }

    #[test]
    fn reddit_input_covers_offset() {
        let args = decode("reddit", json!({"query": "rust", "sort": "top"}));
        let input = build_input(&args, 25, 25).unwrap();
        assert_eq!(input["searches"][0], "rust");
        assert_eq!(input["sort"], "top");
        assert_eq!(input["maxItems"], 50);
    }

    #[test]
    fn transcription_input_defaults_language() {
        let args = decode("tiktok", json!({"video_url": "https://www.tiktok.com/@a/video/1"}));
        let input = build_input(&args, 0, 1).unwrap();
        assert_eq!(input["videoUrl"], "https://www.tiktok.com/@a/video/1");
        assert_eq!(input["language"], "eng-US");
    }

    #[test]
    fn other_families_are_refused() {
        let args = decode("web", json!({"url": "https://example.com"}));
        assert!(build_input(&args, 0, 1).is_err());
    }

    #[test]
    fn offsets_come_from_cursor() {
        assert_eq!(parse_offset(&Cursor::start()).unwrap(), 0);
        assert_eq!(parse_offset(&Cursor::from("50")).unwrap(), 50);
        assert!(parse_offset(&Cursor::from("abc")).is_err());
    }

    #[test]
    fn out_of_range_offset_is_an_error() {
        let args = decode("reddit", json!({"query": "rust"}));
        let offset = parse_offset(&Cursor::from(usize::MAX.to_string())).unwrap();

        let err = build_input(&args, offset, 25).unwrap_err();
        assert!(err.to_string().contains("invalid cursor"));

        let page = paginate(Vec::new(), offset, 25);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_start());
    }

    #[test]
    fn full_page_points_to_next_offset() {
        let dataset: Vec<Value> = (0..30).map(|i| json!({"n": i})).collect();

        let page = paginate(dataset.clone(), 0, 25);
        assert_eq!(page.items.len(), 25);
        assert_eq!(page.next_cursor.as_str(), "25");

        let page = paginate(dataset, 25, 25);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0]["n"], 25);
        assert!(page.next_cursor.is_start());
    }
}
