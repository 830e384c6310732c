use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Response, Uri};
use tokio::time::Instant;
use tracing::Span;

use crate::error::BoxError;

/// HTTP client used for every outbound request.
///
/// Only GET is ever issued. Implementations should not follow redirects
/// into other hosts with the `Authorization` header attached.
pub trait Transport: Send + Sync {
    type Body: Send;

    fn get(
        &self,
        uri: &Uri,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<Response<Self::Body>, BoxError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    type Body = T::Body;

    fn get(
        &self,
        uri: &Uri,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<Response<Self::Body>, BoxError>> + Send {
        T::get(self, uri, headers)
    }
}

/// Per-call context: an optional deadline and the span warnings are logged in.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    span: Span,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            deadline: None,
            span: Span::none(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
