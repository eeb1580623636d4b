//! Request logging middleware.
//!
//! Emits one `info` event per request once the response is known:
//!
//! ```text
//! INFO request{context_id=3f0c…}: HTTP GET /posts?page=2 method=GET url=/posts?page=2 response_code=200 response_time_ms=3 …
//! ```
//!
//! Everything further down the chain runs inside the `request` span, so log
//! lines from handlers carry the same context id.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

type ExtractFn = dyn Fn(&Request) -> Map<String, Value> + Send + Sync;
type ExtractResponseFn = dyn Fn(&Response) -> Map<String, Value> + Send + Sync;

/// The request logger. See the [module docs](self).
#[derive(Clone, Default)]
pub struct RequestLogger {
    extract: Option<Arc<ExtractFn>>,
    extract_response: Option<Arc<ExtractResponseFn>>,
    skip: Vec<String>,
}

impl RequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds fields of your own to every log line, under `extra`.
    ///
    /// Called before the rest of the chain runs, since the chain takes
    /// ownership of the request: it sees the request as it arrived, not as
    /// validation left it. Use [`extract_response_info`](Self::extract_response_info)
    /// for fields that depend on the outcome.
    pub fn extract_info<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.extract = Some(Arc::new(f));
        self
    }

    /// Adds fields taken from the response to `extra`, after the chain
    /// finished. On a key clash they win over [`extract_info`](Self::extract_info).
    pub fn extract_response_info<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.extract_response = Some(Arc::new(f));
        self
    }

    /// Requests to exactly this path pass through without being logged.
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip.push(path.into());
        self
    }

    fn skips(&self, path: &str) -> bool {
        self.skip.iter().any(|p| p == path)
    }
}

impl Middleware for RequestLogger {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if self.skips(req.path()) {
            return next.run(req);
        }

        let started = Instant::now();
        let state = req.state_mut();
        state.request_time = Some(started);
        let context_id = state
            .context_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let mut extra = match &self.extract {
            Some(extract) => extract(&req),
            None => Map::new(),
        };
        let extract_response = self.extract_response.clone();
        let method = req.method().clone();
        let url = req.uri().to_string();
        let query = req.query().to_string();

        let span = info_span!("request", context_id = %context_id);

        Box::pin(async move {
            let res = next.run(req).instrument(span.clone()).await;

            let elapsed = started.elapsed();
            if let Some(extract) = extract_response {
                extra.extend(extract(&res));
            }
            let extra = Value::Object(extra);
            span.in_scope(|| {
                info!(
                    method = %method,
                    url = %url,
                    query = %query,
                    response_code = res.status_code().as_u16(),
                    response_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    extra = %extra,
                    "HTTP {method} {url}"
                );
            });
            res
        })
    }
}

/// A request logger with no extra fields and no skipped paths.
pub fn logger() -> RequestLogger {
    RequestLogger::new()
}
