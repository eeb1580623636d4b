//! Incoming HTTP request type.
//!
//! The four parts a middleware validates (query string, path parameters,
//! headers and body) are held as [`serde_json::Value`]s. Validation replaces
//! them in place, so anything further down the chain reads the normalized
//! values: a `{id}` path segment validated as a number is a JSON number from
//! then on, not the raw string.

use std::fmt;

use bytes::Bytes;
use http::{Method, Uri};
use serde_json::{Map, Value};
use tracing::debug;

use crate::state::State;

/// One of the request parts a validation middleware can read and replace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Source {
    Body,
    Path,
    Query,
    Headers,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Body    => "body",
            Self::Path    => "path",
            Self::Query   => "query",
            Self::Headers => "headers",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    query: Value,
    params: Value,
    headers: Value,
    body: Value,
    bytes: Bytes,
    state: Option<State>,
}

impl Request {
    /// Builds a request from an `http` request whose body has been collected.
    ///
    /// The query string is decoded into an object (repeated keys become
    /// arrays), headers are keyed by their lower-case name, and the body is
    /// decoded when its content type is JSON or a URL-encoded form.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, bytes) = req.into_parts();

        let query = Value::Object(parse_form(parts.uri.query().unwrap_or_default().as_bytes()));

        let mut headers = Map::new();
        for (name, value) in &parts.headers {
            match value.to_str() {
                Ok(value) => insert_multi(&mut headers, name.as_str(), value),
                Err(_) => debug!(header = %name, "skipping non-UTF-8 header value"),
            }
        }

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let body = parse_body(content_type, &bytes);

        Self {
            method: parts.method,
            uri: parts.uri,
            query,
            params: Value::Object(Map::new()),
            headers: Value::Object(headers),
            body,
            bytes,
            state: None,
        }
    }

    pub(crate) fn set_params(&mut self, params: Map<String, Value>) {
        self.params = Value::Object(params);
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }

    /// Raw body bytes, untouched by validation.
    pub fn bytes(&self) -> &Bytes { &self.bytes }

    pub fn query(&self) -> &Value { &self.query }
    pub fn params(&self) -> &Value { &self.params }
    pub fn headers(&self) -> &Value { &self.headers }
    pub fn body(&self) -> &Value { &self.body }

    /// A query-string value, as last validated.
    pub fn query_param(&self, key: &str) -> Option<&Value> {
        self.query.get(key)
    }

    /// A path parameter, as last validated.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `"42"`, or `42` once a path validation cast it.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers
            .as_object()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn source(&self, source: Source) -> &Value {
        match source {
            Source::Body    => &self.body,
            Source::Path    => &self.params,
            Source::Query   => &self.query,
            Source::Headers => &self.headers,
        }
    }

    /// Overwrites one request part, returning the previous value.
    pub fn replace(&mut self, source: Source, value: Value) -> Value {
        let slot = match source {
            Source::Body    => &mut self.body,
            Source::Path    => &mut self.params,
            Source::Query   => &mut self.query,
            Source::Headers => &mut self.headers,
        };
        std::mem::replace(slot, value)
    }

    /// The per-request state, if any middleware created it.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// The per-request state, created on first access.
    pub fn state_mut(&mut self) -> &mut State {
        self.state.get_or_insert_with(State::default)
    }
}

fn parse_form(input: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        insert_multi(&mut map, &key, &value);
    }
    map
}

/// An empty body, or one of a type that is not decoded, reads as an empty
/// object. Only JSON that fails to parse is `Null`.
fn parse_body(content_type: &str, bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Object(Map::new());
    }

    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_slice(bytes).unwrap_or_else(|e| {
            debug!(error = %e, "request body is not valid JSON");
            Value::Null
        });
    }
    if mime == "application/x-www-form-urlencoded" {
        return Value::Object(parse_form(bytes));
    }
    Value::Object(Map::new())
}

/// Inserts `value` under `key`, turning repeated keys into arrays.
fn insert_multi(map: &mut Map<String, Value>, key: &str, value: &str) {
    let value = Value::String(value.to_owned());
    match map.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key.to_owned(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(builder: http::request::Builder, body: &'static str) -> Request {
        Request::from_http(builder.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn decodes_query_string() {
        let req = request(http::Request::builder().uri("/users?page=2&tag=a&tag=b&q=a%20b"), "");
        assert_eq!(req.query(), &json!({"page": "2", "tag": ["a", "b"], "q": "a b"}));
        assert_eq!(req.query_param("page"), Some(&json!("2")));
        assert_eq!(req.path(), "/users");
    }

    #[test]
    fn keys_headers_by_lower_case_name() {
        let req = request(
            http::Request::builder().uri("/").header("X-Request-Id", "abc").header("accept", "a").header("accept", "b"),
            "",
        );
        assert_eq!(req.header("x-request-id"), Some(&json!("abc")));
        assert_eq!(req.header("X-REQUEST-ID"), Some(&json!("abc")));
        assert_eq!(req.header("accept"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn decodes_json_and_form_bodies() {
        let json_req = request(
            http::Request::builder().uri("/").header("content-type", "application/json; charset=utf-8"),
            r#"{"name":"ada"}"#,
        );
        assert_eq!(json_req.body(), &json!({"name": "ada"}));

        let form_req = request(
            http::Request::builder().uri("/").header("content-type", "application/x-www-form-urlencoded"),
            "name=ada&age=36",
        );
        assert_eq!(form_req.body(), &json!({"name": "ada", "age": "36"}));
    }

    #[test]
    fn undecodable_bodies_are_null_but_bytes_remain() {
        let req = request(http::Request::builder().uri("/").header("content-type", "application/json"), "{oops");
        assert_eq!(req.body(), &Value::Null);
        assert_eq!(req.bytes().as_ref(), b"{oops");
    }

    #[test]
    fn empty_or_untyped_bodies_are_empty_objects() {
        let empty = request(http::Request::builder().uri("/").header("content-type", "application/json"), "");
        assert_eq!(empty.body(), &json!({}));

        let untyped = request(http::Request::builder().uri("/").header("content-type", "text/plain"), "hello");
        assert_eq!(untyped.body(), &json!({}));
        assert_eq!(untyped.bytes().as_ref(), b"hello");
    }

    #[test]
    fn replace_overwrites_one_source() {
        let mut req = request(http::Request::builder().uri("/?a=1"), "");
        let previous = req.replace(Source::Query, json!({"a": 1}));
        assert_eq!(previous, json!({"a": "1"}));
        assert_eq!(req.source(Source::Query), &json!({"a": 1}));
        assert_eq!(req.source(Source::Body), &json!({}));
    }

    #[test]
    fn state_is_created_lazily() {
        let mut req = request(http::Request::builder().uri("/"), "");
        assert!(req.state().is_none());
        req.state_mut().context_id = Some("ctx".into());
        assert_eq!(req.state().and_then(|s| s.context_id.as_deref()), Some("ctx"));
    }
}
