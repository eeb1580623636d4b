//! Middleware layer.
//!
//! A [`Middleware`] sees the request before the handler does. It may change
//! the request (replace a validated part, fill in [`State`](crate::State)) and
//! pass it on with [`Next::run`], or answer on its own and stop the chain by
//! never calling `next`.
//!
//! Middleware attaches in two places:
//!
//! - per route, with [`Chain`]: `Chain::new().with(a).with(b).to(handler)`
//!   runs `a`, then `b`, then `handler`;
//! - for every route, with [`Router::layer`](crate::Router::layer).
//!
//! Built-in middleware:
//! - [`validation`]: schema validation of body, path, query or headers
//! - [`paginate`](mod@paginate): `page` / `perPage` query parameters into pagination state
//! - [`sort`](mod@sort): `sort=-createdAt,title` into sort directives
//! - [`logger`](mod@logger): one structured log line per request, with a context id

pub mod logger;
pub mod paginate;
pub mod sort;
pub mod validation;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::Request;
use crate::response::Response;

pub use logger::{RequestLogger, logger};
pub use paginate::{Paginate, PaginationOptions, PaginationState, paginate};
pub use sort::{Direction, Sort, SortDirective, SortOptions, sort};
pub use validation::{
    RequestValidation, Resolve, SchemaSource, validate_body, validate_headers, validate_path,
    validate_query, with_validation,
};

/// A request-handling step that can continue or halt the chain.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of the chain after the current middleware.
pub struct Next {
    stack: Arc<[BoxedMiddleware]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(stack: Arc<[BoxedMiddleware]>, endpoint: BoxedHandler) -> Self {
        Self { stack, index: 0, endpoint }
    }

    /// Passes the request to the next middleware, or to the handler once the
    /// chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture {
        match self.stack.get(self.index).cloned() {
            Some(middleware) => {
                let next = Self { index: self.index + 1, ..self };
                middleware.call(req, next)
            }
            None => self.endpoint.call(req),
        }
    }
}

/// Continues with `req` when a synchronous check passed, answers with its
/// response otherwise.
pub(crate) fn proceed(outcome: Result<(), Response>, req: Request, next: Next) -> BoxFuture {
    match outcome {
        Ok(()) => next.run(req),
        Err(response) => Box::pin(async move { response }),
    }
}

/// Builder for a per-route middleware chain.
#[derive(Default)]
pub struct Chain {
    stack: Vec<BoxedMiddleware>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; it runs after the ones added before it.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.stack.push(Arc::new(middleware));
        self
    }

    /// Terminates the chain with the route handler.
    pub fn to(self, handler: impl Handler) -> Pipeline {
        Pipeline {
            stack: self.stack.into(),
            endpoint: handler.into_boxed_handler(),
        }
    }
}

/// Middleware in front of a handler. Usable wherever a handler is.
#[derive(Clone)]
pub struct Pipeline {
    stack: Arc<[BoxedMiddleware]>,
    endpoint: BoxedHandler,
}

impl Pipeline {
    /// Runs the request through the chain.
    pub async fn run(&self, req: Request) -> Response {
        ErasedHandler::call(self, req).await
    }
}

impl ErasedHandler for Pipeline {
    fn call(&self, req: Request) -> BoxFuture {
        Next::new(Arc::clone(&self.stack), Arc::clone(&self.endpoint)).run(req)
    }
}

impl private::Sealed for Pipeline {}

impl Handler for Pipeline {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}
