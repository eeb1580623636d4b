//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Global middleware added
//! with [`Router::layer`] runs for every request, matched or not, before the
//! route's own handler or [`Pipeline`](crate::middleware::Pipeline).

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use serde_json::{Map, Value};

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Arc<[BoxedMiddleware]>,
    fallback: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        let fallback = (|_req: Request| async { Response::status(StatusCode::NOT_FOUND) }).into_boxed_handler();
        Self { routes: HashMap::new(), layers: Arc::new([]), fallback }
    }

    /// Registers a handler for a method and path.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use turnstile::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// # async fn delete_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user)
    ///     .on(Method::POST,   "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds middleware that runs for every request, in the order added.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(Arc::new(middleware));
        self.layers = layers.into();
        self
    }

    /// Routes one request through the global middleware and its handler.
    /// Unmatched requests get an empty 404.
    pub async fn handle(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler
            }
            None => Arc::clone(&self.fallback),
        };

        Next::new(Arc::clone(&self.layers), endpoint).run(req).await
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, Map<String, Value>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        Some((Arc::clone(matched.value), params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
