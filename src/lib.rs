//! # turnstile
//!
//! Request-gating middleware for HTTP services, on a small hyper server.
//!
//! Every middleware sits between the router and your handler. It either lets
//! the request through (possibly normalized or annotated) or answers on its
//! own:
//!
//! - [`middleware::validation`]: check body, path, query or headers against
//!   a schema and replace them with the validated values, or answer 400;
//! - [`middleware::paginate`](mod@middleware::paginate): `page` / `perPage`
//!   into [`State::pagination`];
//! - [`middleware::sort`](mod@middleware::sort): `sort=-createdAt,title`
//!   into [`State::sort`];
//! - [`middleware::logger`](mod@middleware::logger): one structured
//!   `tracing` event per request, with a context id.
//!
//! Schemas come from the [`validation`] module: the [`Shape`](validation::Shape)
//! builder, or any `serde` + `validator` type through
//! [`Typed`](validation::Typed).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use turnstile::middleware::{Chain, logger, paginate, sort, validate_body};
//! use turnstile::validation::Shape;
//! use turnstile::{Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::Error> {
//!     let new_post = Shape::object().keys([
//!         ("title", Shape::string().required()),
//!         ("draft", Shape::boolean().default(false)),
//!     ]);
//!
//!     let app = Router::new()
//!         .layer(logger().skip_path("/health"))
//!         .get("/posts", Chain::new().with(paginate()).with(sort(["createdAt", "title"])?).to(list_posts))
//!         .post("/posts", Chain::new().with(validate_body(new_post)).to(create_post));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn list_posts(req: Request) -> Response {
//!     let state = req.state();
//!     Response::json(&serde_json::json!({
//!         "pagination": state.and_then(|s| s.pagination),
//!         "sort": state.and_then(|s| s.sort.clone()),
//!     }))
//! }
//!
//! async fn create_post(req: Request) -> (StatusCode, serde_json::Value) {
//!     (StatusCode::CREATED, req.body().clone())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod state;

pub mod middleware;
pub mod validation;

pub use error::{ConfigError, Error};
pub use handler::Handler;
pub use http::{Method, StatusCode};
pub use request::{Request, Source};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use state::State;
