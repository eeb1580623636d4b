//! Request validation middleware.
//!
//! Checks one request part against a schema. On success the part is
//! **replaced** with the validated value, so handlers downstream see cast
//! types and must not re-parse. On failure the chain stops with an error
//! response.
//!
//! ```rust
//! use turnstile::{Method, Request, Router};
//! use turnstile::middleware::{Chain, validate_path};
//! use turnstile::validation::Shape;
//!
//! async fn get_user(req: Request) -> String {
//!     // `id` is a JSON number here, not the raw path segment.
//!     format!("user {}", req.param("id").unwrap())
//! }
//!
//! let app = Router::new().on(
//!     Method::GET,
//!     "/users/{id}",
//!     Chain::new()
//!         .with(validate_path(Shape::object().keys([("id", Shape::number().integer().required())])))
//!         .to(get_user),
//! );
//! ```
//!
//! The headers source defaults to `{stripUnknown: false, allowUnknown: true}`.
//! With the engine defaults every header the schema does not name would be
//! dropped from the request.

use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::{debug, error};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next, proceed};
use crate::request::{Request, Source};
use crate::response::Response;
use crate::validation::{self, Schema, ValidationError, ValidationOptions};

type SchemaFn = dyn Fn(&Request) -> Box<dyn Schema> + Send + Sync;
type ResolveFn<T> = dyn Fn(&Request, &ValidationError) -> T + Send + Sync;
type ErrorHandler = dyn Fn(&Request, &ValidationError) -> Response + Send + Sync;

/// Where the schema comes from.
#[derive(Clone)]
pub enum SchemaSource {
    /// One schema for every request.
    Static(Arc<dyn Schema>),
    /// A schema computed from each request, e.g. for conditionally required
    /// fields.
    Dynamic(Arc<SchemaFn>),
}

impl SchemaSource {
    pub fn dynamic<F, S>(resolve: F) -> Self
    where
        F: Fn(&Request) -> S + Send + Sync + 'static,
        S: Schema + 'static,
    {
        Self::Dynamic(Arc::new(move |req: &Request| Box::new(resolve(req)) as Box<dyn Schema>))
    }

    fn validate(
        &self,
        req: &Request,
        data: &Value,
        options: &ValidationOptions,
    ) -> Result<Value, ValidationError> {
        match self {
            Self::Static(schema) => validation::validate(data, schema.as_ref(), options),
            Self::Dynamic(resolve) => validation::validate(data, resolve(req).as_ref(), options),
        }
    }
}

impl<S: Schema + 'static> From<S> for SchemaSource {
    fn from(schema: S) -> Self {
        Self::Static(Arc::new(schema))
    }
}

/// A value fixed at construction or computed at the failure site.
pub enum Resolve<T> {
    Constant(T),
    Resolver(Arc<ResolveFn<T>>),
}

impl<T: Clone> Resolve<T> {
    pub fn resolver<F>(resolve: F) -> Self
    where
        F: Fn(&Request, &ValidationError) -> T + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(resolve))
    }

    pub fn resolve(&self, req: &Request, err: &ValidationError) -> T {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Resolver(resolve) => resolve(req, err),
        }
    }
}

impl<T> From<T> for Resolve<T> {
    fn from(value: T) -> Self {
        Self::Constant(value)
    }
}

impl<T: Clone> Clone for Resolve<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Constant(value) => Self::Constant(value.clone()),
            Self::Resolver(resolve) => Self::Resolver(Arc::clone(resolve)),
        }
    }
}

/// Validates one request part. Build it with [`with_validation`] or one of
/// the per-source shortcuts.
pub struct RequestValidation {
    source: Source,
    schema: SchemaSource,
    options: ValidationOptions,
    error_status: Resolve<StatusCode>,
    error_body: Option<Resolve<Value>>,
    error_handler: Option<Arc<ErrorHandler>>,
}

impl RequestValidation {
    pub fn new(source: Source, schema: impl Into<SchemaSource>) -> Self {
        let options = match source {
            Source::Headers => ValidationOptions::headers(),
            _ => ValidationOptions::new(),
        };

        Self {
            source,
            schema: schema.into(),
            options,
            error_status: Resolve::Constant(StatusCode::BAD_REQUEST),
            error_body: None,
            error_handler: None,
        }
    }

    /// Replaces the source's default options. They are still laid over the
    /// engine defaults.
    pub fn options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Status for input failures. Defaults to `400 Bad Request`.
    pub fn error_status(mut self, status: impl Into<Resolve<StatusCode>>) -> Self {
        self.error_status = status.into();
        self
    }

    pub fn error_status_with<F>(self, resolve: F) -> Self
    where
        F: Fn(&Request, &ValidationError) -> StatusCode + Send + Sync + 'static,
    {
        self.error_status(Resolve::resolver(resolve))
    }

    /// Body for input failures. Defaults to a `validation_error` object
    /// listing every field error.
    pub fn error_body(mut self, body: impl Into<Resolve<Value>>) -> Self {
        self.error_body = Some(body.into());
        self
    }

    pub fn error_body_with<F>(self, resolve: F) -> Self
    where
        F: Fn(&Request, &ValidationError) -> Value + Send + Sync + 'static,
    {
        self.error_body(Resolve::resolver(resolve))
    }

    /// Takes over failure handling entirely, for input and engine failures
    /// alike. Status and body settings are ignored.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request, &ValidationError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Validates and replaces the source, or returns the error response.
    pub fn apply(&self, req: &mut Request) -> Result<(), Response> {
        let outcome = self.schema.validate(req, req.source(self.source), &self.options);

        match outcome {
            Ok(data) => {
                req.replace(self.source, data);
                Ok(())
            }
            Err(err) => Err(self.reject(req, &err)),
        }
    }

    fn reject(&self, req: &Request, err: &ValidationError) -> Response {
        if let Some(handler) = &self.error_handler {
            return handler(req, err);
        }

        match err {
            ValidationError::Invalid(details) => {
                debug!(source = %self.source, errors = details.len(), "request validation failed");
                let status = self.error_status.resolve(req, err);
                let body = match &self.error_body {
                    Some(body) => body.resolve(req, err),
                    None => validation::error_body(&format!("{} validation failed", self.source), details),
                };
                Response::builder().status(status).json(&body)
            }
            ValidationError::Engine(source) => {
                error!(source = %self.source, error = %source, "validation engine failed");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&validation::internal_error_body())
            }
        }
    }
}

impl Middleware for RequestValidation {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        let outcome = self.apply(&mut req);
        proceed(outcome, req, next)
    }
}

/// Validates `source` against `schema`.
pub fn with_validation(source: Source, schema: impl Into<SchemaSource>) -> RequestValidation {
    RequestValidation::new(source, schema)
}

/// Validates the request body.
pub fn validate_body(schema: impl Into<SchemaSource>) -> RequestValidation {
    RequestValidation::new(Source::Body, schema)
}

/// Validates the path parameters.
pub fn validate_path(schema: impl Into<SchemaSource>) -> RequestValidation {
    RequestValidation::new(Source::Path, schema)
}

/// Validates the query string.
pub fn validate_query(schema: impl Into<SchemaSource>) -> RequestValidation {
    RequestValidation::new(Source::Query, schema)
}

/// Validates the headers, keeping the ones the schema does not name.
pub fn validate_headers(schema: impl Into<SchemaSource>) -> RequestValidation {
    RequestValidation::new(Source::Headers, schema)
}
