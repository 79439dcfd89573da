use std::future::Future;

use futures::future::BoxFuture;

use crate::arguments::JobArguments;
use crate::credential::Credential;
use crate::cursor::Cursor;
use crate::error::AppError;

/// Everything a backend needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub arguments: &'a JobArguments,
    /// Present when the family requires authentication.
    pub credential: Option<&'a Credential>,
    /// Inbound cursor, exactly as the caller sent it.
    pub cursor: &'a Cursor,
    /// Result ceiling, already defaulted and clamped.
    pub limit: usize,
}

/// One page of backend results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    /// Empty when there are no further pages.
    pub next_cursor: Cursor,
}

impl Page {
    pub fn new(items: Vec<serde_json::Value>, next_cursor: Cursor) -> Self {
        Self { items, next_cursor }
    }

    /// A page with no continuation.
    pub fn last(items: Vec<serde_json::Value>) -> Self {
        Self::new(items, Cursor::start())
    }
}

/// Provider client performing the actual content retrieval.
///
/// Implementations must return [`AppError::RateLimitExceeded`] when the
/// provider throttles the credential and [`AppError::Unauthorized`] when it
/// rejects it; anything else is treated as a generic backend failure.
pub trait Backend: Send + Sync + 'static {
    fn call(
        &self,
        request: BackendRequest<'_>,
    ) -> impl Future<Output = Result<Page, AppError>> + Send;
}

/// Object-safe form of [`Backend`], so one registry can hold different clients.
pub(crate) trait DynBackend: Send + Sync {
    fn call_boxed<'a>(&'a self, request: BackendRequest<'a>)
    -> BoxFuture<'a, Result<Page, AppError>>;
}

impl<B: Backend> DynBackend for B {
    fn call_boxed<'a>(
        &'a self,
        request: BackendRequest<'a>,
    ) -> BoxFuture<'a, Result<Page, AppError>> {
        Box::pin(self.call(request))
    }
}
