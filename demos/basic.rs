//! Every middleware on one small posts API.
//!
//! ```text
//! cargo run --example basic
//! curl 'localhost:3000/posts?page=2&perPage=5&sort=-createdAt'
//! curl -X POST localhost:3000/posts -H 'content-type: application/json' -d '{"title":"Hi"}'
//! curl localhost:3000/posts/abc        # 400, path validation failed
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;
use turnstile::middleware::{
    Chain, PaginationOptions, Paginate, Sort, SortDirective, SortOptions, logger, validate_body,
    validate_path, validate_query,
};
use turnstile::validation::{Shape, Typed, ValidationOptions};
use turnstile::{Request, Response, Router, Server, StatusCode};
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, Validate)]
struct NewPost {
    #[validate(length(min = 1, max = 120))]
    title: String,
    #[validate(length(max = 10_000))]
    #[serde(default)]
    content: String,
}

#[tokio::main]
async fn main() -> Result<(), turnstile::Error> {
    tracing_subscriber::fmt().with_target(false).init();

    let pagination = Paginate::new(PaginationOptions { per_page_max: 100, ..PaginationOptions::default() })?;
    let ordering = Sort::new(
        ["createdAt", "title"],
        SortOptions { defaults: Some(vec![SortDirective::desc("createdAt")]), ..SortOptions::default() },
    )?;
    let search = Shape::object().keys([("q", Shape::string().optional())]);
    let post_id = Shape::object().keys([("id", Shape::number().integer().min(1.0).required())]);

    let app = Router::new()
        .layer(logger().skip_path("/health").extract_info(|req: &Request| {
            let mut extra = Map::new();
            if let Some(agent) = req.header("user-agent") {
                extra.insert("userAgent".to_owned(), agent.clone());
            }
            extra
        }))
        .get("/health", |_req: Request| async { "ok" })
        .get(
            "/posts",
            Chain::new()
                .with(validate_query(search).options(ValidationOptions::new().allow_unknown(true).strip_unknown(false)))
                .with(pagination)
                .with(ordering)
                .to(list_posts),
        )
        .post(
            "/posts",
            Chain::new()
                .with(validate_body(Typed::<NewPost>::new()).error_status(StatusCode::UNPROCESSABLE_ENTITY))
                .to(create_post),
        )
        .get("/posts/{id}", Chain::new().with(validate_path(post_id)).to(get_post));

    let server = Server::bind("127.0.0.1:3000")?;
    info!(addr = %server.addr(), "try GET /posts?page=2&perPage=5&sort=-createdAt");
    server.serve(app).await
}

async fn list_posts(req: Request) -> Response {
    let state = req.state();
    Response::json(&json!({
        "query": req.query(),
        "pagination": state.and_then(|s| s.pagination),
        "sort": state.and_then(|s| s.sort.clone()),
    }))
}

async fn create_post(req: Request) -> (StatusCode, Value) {
    (StatusCode::CREATED, req.body().clone())
}

async fn get_post(req: Request) -> Response {
    match req.param("id").and_then(Value::as_u64) {
        Some(id) => Response::json(&json!({"id": id, "title": format!("Post {id}")})),
        None => Response::status(StatusCode::NOT_FOUND),
    }
}
