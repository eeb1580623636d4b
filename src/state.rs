//! Per-request state shared between middleware stages.

use std::time::Instant;

use crate::middleware::paginate::PaginationState;
use crate::middleware::sort::SortDirective;

/// Values derived by middleware for the handlers after it.
///
/// Lives exactly as long as its [`Request`](crate::Request) and is created the
/// first time something calls [`Request::state_mut`](crate::Request::state_mut).
#[derive(Debug, Default)]
pub struct State {
    /// Set by the pagination middleware.
    pub pagination: Option<PaginationState>,
    /// Set by the sort middleware, in query-string order.
    pub sort: Option<Vec<SortDirective>>,
    /// When the request logger first saw the request.
    pub request_time: Option<Instant>,
    /// Correlation id used in log lines.
    pub context_id: Option<String>,
    /// Anything else, keyed by type.
    pub extensions: http::Extensions,
}
