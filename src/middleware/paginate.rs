//! Pagination middleware.
//!
//! Computes limit and offset from two query parameters:
//!
//! ```text
//! /api/posts?page=3&perPage=20   →   state.pagination = { page: 3, perPage: 20, offset: 40 }
//! ```
//!
//! Both parameters are optional. Only values that are present and not
//! positive integers (or `perPage` above the configured maximum) are
//! rejected.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next, proceed};
use crate::request::Request;
use crate::response::Response;
use crate::validation::{self, Shape, ValidationError, ValidationOptions};

/// Where a paginated listing starts and how long it is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page: u64,
    pub per_page: u64,
    pub offset: u64,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self { page: 1, per_page: 10, offset: 0 }
    }
}

/// Construction-time settings, loadable from config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationOptions {
    pub page_key: String,
    pub per_page_key: String,
    pub per_page_max: u64,
    pub error_status_code: u16,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_key: "page".to_owned(),
            per_page_key: "perPage".to_owned(),
            per_page_max: 10_000,
            error_status_code: 400,
        }
    }
}

/// The pagination middleware. See the [module docs](self).
pub struct Paginate {
    page_key: String,
    per_page_key: String,
    error_status: StatusCode,
    schema: Shape,
}

impl Paginate {
    pub fn new(options: PaginationOptions) -> Result<Self, ConfigError> {
        let error_status = StatusCode::from_u16(options.error_status_code)
            .map_err(|_| ConfigError::InvalidStatus(options.error_status_code))?;

        Ok(Self::build(options, error_status))
    }

    fn build(options: PaginationOptions, error_status: StatusCode) -> Self {
        let schema = Shape::object().keys([
            ("page", Shape::number().integer().min(1.0)),
            ("perPage", Shape::number().integer().min(1.0).max(options.per_page_max as f64)),
        ]);

        Self {
            page_key: options.page_key,
            per_page_key: options.per_page_key,
            error_status,
            schema,
        }
    }

    /// Validates the query parameters and merges them into the request's
    /// pagination state.
    pub fn apply(&self, req: &mut Request) -> Result<(), Response> {
        let mut input = Map::new();
        if let Some(page) = req.query_param(&self.page_key) {
            input.insert("page".to_owned(), page.clone());
        }
        if let Some(per_page) = req.query_param(&self.per_page_key) {
            input.insert("perPage".to_owned(), per_page.clone());
        }

        let data = validation::validate(&Value::Object(input), &self.schema, &ValidationOptions::new())
            .map_err(|err| self.reject(&err))?;

        let state = req.state_mut().pagination.get_or_insert_with(PaginationState::default);

        if let Some(per_page) = data.get("perPage").and_then(Value::as_u64) {
            state.per_page = per_page;
        }
        // Offset uses the per-page value set just above.
        if let Some(page) = data.get("page").and_then(Value::as_u64) {
            state.page = page;
            if page > 1 {
                state.offset = (page - 1).saturating_mul(state.per_page);
            }
        }

        Ok(())
    }

    fn reject(&self, err: &ValidationError) -> Response {
        match err {
            ValidationError::Invalid(details) => {
                debug!(errors = details.len(), "pagination validation failed");
                Response::builder()
                    .status(self.error_status)
                    .json(&validation::error_body("Pagination validation failed", details))
            }
            ValidationError::Engine(source) => {
                error!(error = %source, "pagination validation engine failed");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&validation::internal_error_body())
            }
        }
    }
}

impl Default for Paginate {
    fn default() -> Self {
        Self::build(PaginationOptions::default(), StatusCode::BAD_REQUEST)
    }
}

impl Middleware for Paginate {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        let outcome = self.apply(&mut req);
        proceed(outcome, req, next)
    }
}

/// Pagination with the default keys (`page`, `perPage`) and limits.
pub fn paginate() -> Paginate {
    Paginate::default()
}
