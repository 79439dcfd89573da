use std::time::Duration;

use serde::Deserialize;
use tessera_core::arguments::{JobArguments, TwitterArguments};
use tessera_core::credential::Credential;
use tessera_core::cursor::Cursor;
use tessera_core::error::AppError;
use tessera_core::traits::{Backend, BackendRequest, Page};
use url::Url;

use crate::http::HttpClient;

/// The search endpoint refuses page sizes outside this range.
const SEARCH_PAGE_MIN: usize = 10;
const SEARCH_PAGE_MAX: usize = 100;

/// Separates an in-page offset from the upstream token in search cursors.
const IN_PAGE_SEP: char = '~';

const TWEET_FIELDS: &str = "created_at,author_id,conversation_id,lang,public_metrics";
const USER_FIELDS: &str = "created_at,description,location,public_metrics,verified";

/// Social search provider client (v2-style REST API, bearer-token auth).
#[derive(Clone)]
pub struct TwitterBackend {
    http: HttpClient,
    base_url: String,
}

impl TwitterBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http: HttpClient::new(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| AppError::ConfigError(format!("Invalid social API base URL: {e}")))
    }

    async fn get(&self, url: Url, credential: &Credential) -> Result<ApiResponse, AppError> {
        let request = self.http.inner().get(url).bearer_auth(credential.secret());
        let response = self.http.send(request).await?;
        self.http.json(response).await
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        cursor: &Cursor,
        credential: &Credential,
    ) -> Result<Page, AppError> {
        let position = SearchPosition::parse(cursor);
        let mut url = self.endpoint("tweets/search/recent")?;
        {
            let mut params = url.query_pairs_mut();
            params
                .append_pair("query", query)
                .append_pair("max_results", &search_page_size(limit).to_string())
                .append_pair("tweet.fields", TWEET_FIELDS);
            if let Some(token) = &position.token {
                params.append_pair("next_token", token);
            }
        }

        let response = self.get(url, credential).await?;
        Ok(response.into_search_page(&position, limit))
    }

    async fn lookup(
        &self,
        path: String,
        fields: (&str, &str),
        credential: &Credential,
    ) -> Result<Page, AppError> {
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().append_pair(fields.0, fields.1);

        let (mut items, _) = self.get(url, credential).await?.into_parts();
        items.truncate(1);
        Ok(Page::last(items))
    }
}

impl Backend for TwitterBackend {
    async fn call(&self, request: BackendRequest<'_>) -> Result<Page, AppError> {
        let JobArguments::Twitter(args) = request.arguments else {
            return Err(AppError::Generic("twitter backend received non-twitter arguments".into()));
        };
        let credential = request
            .credential
            .ok_or_else(|| AppError::Unauthorized("no credential supplied".into()))?;

        match args {
            TwitterArguments::SearchByQuery { query, .. } => {
                self.search(query, request.limit, request.cursor, credential)
                    .await
            }
            TwitterArguments::GetById { id } => {
                self.lookup(format!("tweets/{id}"), ("tweet.fields", TWEET_FIELDS), credential)
                    .await
            }
            TwitterArguments::GetProfileByUsername { username } => {
                self.lookup(
                    format!("users/by/username/{username}"),
                    ("user.fields", USER_FIELDS),
                    credential,
                )
                .await
            }
        }
    }
}

/// `data` is an array for searches and an object for lookups.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    next_token: Option<String>,
}

impl ApiResponse {
    fn into_parts(self) -> (Vec<serde_json::Value>, Option<String>) {
        let items = match self.data {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(item) => vec![item],
        };
        (items, self.meta.and_then(|m| m.next_token))
    }

    /// Items `[skip, skip + limit)` of the fetched page. While part of the
    /// page is still unreturned the cursor stays on it; past its end the
    /// cursor is the upstream token.
    fn into_search_page(self, position: &SearchPosition, limit: usize) -> Page {
        let (items, next_token) = self.into_parts();
        let total = items.len();
        let end = position.skip.saturating_add(limit);

        let items: Vec<_> = items.into_iter().skip(position.skip).take(limit).collect();
        let next_cursor = if end < total {
            SearchPosition {
                token: position.token.clone(),
                skip: end,
            }
            .to_cursor()
        } else {
            next_token.map(Cursor::from).unwrap_or_default()
        };
        Page::new(items, next_cursor)
    }
}

/// Where a search resumes: the upstream token that fetches the page, and
/// how many of that page's items were already returned.
#[derive(Debug, Default, PartialEq)]
struct SearchPosition {
    token: Option<String>,
    skip: usize,
}

impl SearchPosition {
    /// Plain upstream tokens resume at the top of their page.
    fn parse(cursor: &Cursor) -> Self {
        if cursor.is_start() {
            return Self::default();
        }
        let raw = cursor.as_str();
        let in_page = raw
            .split_once(IN_PAGE_SEP)
            .and_then(|(skip, token)| Some((skip.parse().ok()?, token)));

        match in_page {
            Some((skip, token)) => Self {
                token: (!token.is_empty()).then(|| token.to_string()),
                skip,
            },
            None => Self {
                token: Some(raw.to_string()),
                skip: 0,
            },
        }
    }

    fn to_cursor(&self) -> Cursor {
        Cursor::new(format!(
            "{}{IN_PAGE_SEP}{}",
            self.skip,
            self.token.as_deref().unwrap_or_default()
        ))
    }
}

fn search_page_size(limit: usize) -> usize {
    limit.clamp(SEARCH_PAGE_MIN, SEARCH_PAGE_MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(body: serde_json::Value) -> ApiResponse {
        serde_json::from_value(body).unwrap()
    }

    fn search(body: serde_json::Value, cursor: &str, limit: usize) -> Page {
        parse(body).into_search_page(&SearchPosition::parse(&Cursor::from(cursor)), limit)
    }

    #[test]
    fn search_page_carries_next_token() {
        let page = search(
            json!({
                "data": [{"id": "1", "text": "a"}, {"id": "2", "text": "b"}],
                "meta": {"result_count": 2, "next_token": "b26v89c19zqg8o3f"}
            }),
            "",
            20,
        );

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_str(), "b26v89c19zqg8o3f");
    }

    #[test]
    fn last_page_has_empty_cursor() {
        let page = search(json!({"data": [{"id": "1"}], "meta": {"result_count": 1}}), "", 20);
        assert!(page.next_cursor.is_start());
    }

    #[test]
    fn no_matches_is_an_empty_page() {
        let page = search(json!({"meta": {"result_count": 0}}), "", 20);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_start());
    }

    #[test]
    fn lookup_object_becomes_single_item() {
        let (items, next_token) = parse(json!({"data": {"id": "42", "username": "rustlang"}})).into_parts();
        assert_eq!(items, [json!({"id": "42", "username": "rustlang"})]);
        assert_eq!(next_token, None);
    }

    #[test]
    fn small_limit_pages_through_the_whole_upstream_page() {
        let data: Vec<_> = (0..10).map(|i| json!({"id": i.to_string()})).collect();
        let body = json!({"data": data, "meta": {"next_token": "after-10"}});

        let mut seen = Vec::new();
        let mut cursor = String::new();
        loop {
            let page = search(body.clone(), &cursor, 3);
            seen.extend(page.items.iter().map(|item| item["id"].clone()));
            cursor = page.next_cursor.into_inner();
            if !cursor.contains(IN_PAGE_SEP) {
                break;
            }
        }

        let expected: Vec<_> = (0..10).map(|i| json!(i.to_string())).collect();
        assert_eq!(seen, expected);
        assert_eq!(cursor, "after-10");
    }

    #[test]
    fn in_page_cursor_keeps_upstream_token() {
        assert_eq!(
            SearchPosition::parse(&Cursor::from("6~tok")),
            SearchPosition {
                token: Some("tok".into()),
                skip: 6
            }
        );
        assert_eq!(
            SearchPosition::parse(&Cursor::from("tok")),
            SearchPosition {
                token: Some("tok".into()),
                skip: 0
            }
        );
        assert_eq!(SearchPosition::parse(&Cursor::from("3~")), SearchPosition { token: None, skip: 3 });
    }

    #[test]
    fn page_size_respects_endpoint_bounds() {
        assert_eq!(search_page_size(1), 10);
        assert_eq!(search_page_size(20), 20);
        assert_eq!(search_page_size(500), 100);
    }

    #[tokio::test]
    async fn missing_credential_is_rejected() {
        let backend = TwitterBackend::new("https://api.example.test/2", Duration::from_secs(1)).unwrap();
        let job = tessera_core::job::Job::new("twitter", json!({"query": "rust"}));
        let arguments = JobArguments::decode(&job).unwrap();
        let cursor = Cursor::start();

        let err = backend
            .call(BackendRequest {
                arguments: &arguments,
                credential: None,
                cursor: &cursor,
                limit: 20,
            })
            .await
            .unwrap_err();

        assert!(err.is_auth_failure());
    }
}
