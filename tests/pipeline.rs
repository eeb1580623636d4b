//! End-to-end requests through `Router::handle`, without a socket.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use turnstile::middleware::{Chain, logger, paginate, sort, validate_body, validate_headers, validate_path};
use turnstile::validation::{Shape, Typed};
use turnstile::{Method, Request, Response, Router, StatusCode};
use validator::Validate;

#[derive(Deserialize, Serialize, Validate)]
struct NewPost {
    #[validate(length(min = 1, max = 120))]
    title: String,
    #[serde(default)]
    tags: Vec<String>,
}

async fn listing(req: Request) -> Response {
    let state = req.state();
    Response::json(&json!({
        "pagination": state.and_then(|s| s.pagination),
        "sort": state.and_then(|s| s.sort.clone()),
        "contextId": state.and_then(|s| s.context_id.clone()),
    }))
}

async fn echo(req: Request) -> Response {
    Response::json(&json!({
        "params": req.params(),
        "body": req.body(),
        "id": req.header("id"),
    }))
}

fn app() -> Router {
    let post_id = Shape::object().keys([("id", Shape::number().integer().min(1.0).required())]);
    let header_id = Shape::object().keys([("id", Shape::number().required())]);

    Router::new()
        .layer(logger().skip_path("/health"))
        .get("/health", |_req: Request| async { "ok" })
        .get(
            "/posts",
            Chain::new()
                .with(paginate())
                .with(sort(["createdAt", "title"]).unwrap())
                .to(listing),
        )
        .post("/posts", Chain::new().with(validate_body(Typed::<NewPost>::new())).to(echo))
        .get("/posts/{id}", Chain::new().with(validate_path(post_id)).to(echo))
        .get("/whoami", Chain::new().with(validate_headers(header_id)).to(echo))
}

async fn send(router: &Router, method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> Response {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let bytes = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Bytes::from(serde_json::to_vec(&body).unwrap())
        }
        None => Bytes::new(),
    };
    router.handle(Request::from_http(builder.body(bytes).unwrap())).await
}

#[tokio::test]
async fn listing_gets_pagination_sort_and_context() {
    let router = app();

    let res = send(&router, Method::GET, "/posts?page=2&perPage=5&sort=-createdAt,title", &[], None).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json_body().unwrap();
    assert_eq!(body["pagination"], json!({"page": 2, "perPage": 5, "offset": 5}));
    assert_eq!(
        body["sort"],
        json!([
            {"field": "createdAt", "direction": "desc"},
            {"field": "title", "direction": "asc"},
        ])
    );
    assert!(body["contextId"].is_string());
}

#[tokio::test]
async fn listing_defaults() {
    let res = send(&app(), Method::GET, "/posts", &[], None).await;
    let body = res.json_body().unwrap();

    assert_eq!(body["pagination"], json!({"page": 1, "perPage": 10, "offset": 0}));
    assert_eq!(body["sort"], json!([{"field": "createdAt", "direction": "asc"}]));
}

#[tokio::test]
async fn bad_listing_parameters_stop_before_the_handler() {
    let router = app();

    let res = send(&router, Method::GET, "/posts?perPage=11000", &[], None).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json_body().unwrap()["type"], "validation_error");

    let res = send(&router, Method::GET, "/posts?sort=author", &[], None).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json_body().unwrap()["message"],
        "Invalid sort field: 'author', must be one of: 'createdAt', 'title'"
    );
}

#[tokio::test]
async fn path_parameters_are_cast() {
    let res = send(&app(), Method::GET, "/posts/42", &[], None).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json_body().unwrap()["params"], json!({"id": 42}));

    let res = send(&app(), Method::GET, "/posts/0", &[], None).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json_body().unwrap()["message"], "path validation failed");
}

#[tokio::test]
async fn headers_are_cast_and_kept() {
    let res = send(&app(), Method::GET, "/whoami", &[("id", "12"), ("x-trace", "abc")], None).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json_body().unwrap()["id"], 12);
}

#[tokio::test]
async fn typed_body_validation() {
    let router = app();

    let res = send(&router, Method::POST, "/posts", &[], Some(json!({"title": "Hello", "draft": true}))).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json_body().unwrap()["body"], json!({"title": "Hello", "tags": []}));

    let res = send(&router, Method::POST, "/posts", &[], Some(json!({"title": ""}))).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = res.json_body().unwrap();
    assert_eq!(body["message"], "body validation failed");
    assert_eq!(body["errors"][0]["path"], "title");
}

#[tokio::test]
async fn unmatched_routes_are_404() {
    let res = send(&app(), Method::DELETE, "/posts/1", &[], None).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn skipped_paths_still_route() {
    let res = send(&app(), Method::GET, "/health", &[], None).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), "ok");
}
