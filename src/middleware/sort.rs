//! Sort middleware.
//!
//! Extracts sort directives from the query string:
//!
//! ```text
//! /api/posts?sort=-createdAt,title   →   state.sort = [(createdAt, desc), (title, asc)]
//! ```
//!
//! Every field must be in the allow-list given at construction. Without a
//! sort parameter the configured defaults apply, and without defaults the
//! first allowed field in ascending order.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next, proceed};
use crate::request::Request;
use crate::response::Response;
use crate::validation::{self, FieldError};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// One `(field, direction)` sorting instruction.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct SortDirective {
    pub field: String,
    pub direction: Direction,
}

impl SortDirective {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Desc }
    }
}

/// Construction-time settings, loadable from config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOptions {
    /// Query parameter holding the directives.
    pub key: String,
    /// Separator between directives.
    pub separator: String,
    /// Directives used when the parameter is absent or empty.
    pub defaults: Option<Vec<SortDirective>>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self { key: "sort".to_owned(), separator: ",".to_owned(), defaults: None }
    }
}

/// The sort middleware. See the [module docs](self).
#[derive(Clone, Debug)]
pub struct Sort {
    fields: Vec<String>,
    key: String,
    separator: String,
    defaults: Vec<SortDirective>,
}

impl Sort {
    /// Fails when `fields` is empty, a field name is empty, or the separator
    /// is empty.
    pub fn new<I, S>(fields: I, options: SortOptions) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();

        let Some(first) = fields.first() else {
            return Err(ConfigError::NoSortFields);
        };
        if fields.iter().any(String::is_empty) {
            return Err(ConfigError::EmptySortField);
        }
        if options.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }

        let defaults = options.defaults.unwrap_or_else(|| vec![SortDirective::asc(first.clone())]);

        Ok(Self { fields, key: options.key, separator: options.separator, defaults })
    }

    /// Parses a raw parameter value. An empty value yields the defaults; the
    /// first field outside the allow-list is returned as the error.
    pub fn parse(&self, raw: &str) -> Result<Vec<SortDirective>, String> {
        self.parse_all([raw])
    }

    fn parse_all<'a>(&self, raws: impl IntoIterator<Item = &'a str>) -> Result<Vec<SortDirective>, String> {
        let mut directives = Vec::new();

        for raw in raws.into_iter().filter(|raw| !raw.is_empty()) {
            for token in raw.split(self.separator.as_str()) {
                let directive = match token.strip_prefix('-') {
                    Some(field) => SortDirective::desc(field),
                    None => SortDirective::asc(token),
                };
                if !self.fields.contains(&directive.field) {
                    return Err(directive.field);
                }
                directives.push(directive);
            }
        }

        if directives.is_empty() {
            return Ok(self.defaults.clone());
        }
        Ok(directives)
    }

    /// Parses the sort parameter into the request's sort state, replacing
    /// any previous directives.
    pub fn apply(&self, req: &mut Request) -> Result<(), Response> {
        let parsed = match req.query_param(&self.key) {
            Some(Value::String(raw)) => self.parse(raw),
            Some(Value::Array(raws)) => self.parse_all(raws.iter().filter_map(Value::as_str)),
            _ => Ok(self.defaults.clone()),
        };

        match parsed {
            Ok(directives) => {
                req.state_mut().sort = Some(directives);
                Ok(())
            }
            Err(field) => Err(self.reject(&field)),
        }
    }

    fn reject(&self, field: &str) -> Response {
        let message = format!(
            "Invalid sort field: '{field}', must be one of: '{}'",
            self.fields.join("', '")
        );
        debug!(field, "{message}");

        let detail = FieldError::new(message.clone(), self.key.clone(), "any.only");
        Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .json(&validation::error_body(&message, &[detail]))
    }
}

impl Middleware for Sort {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        let outcome = self.apply(&mut req);
        proceed(outcome, req, next)
    }
}

/// Sorting over `fields` with the default key (`sort`) and separator (`,`).
pub fn sort<I, S>(fields: I) -> Result<Sort, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Sort::new(fields, SortOptions::default())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;

    fn request(uri: &str) -> Request {
        Request::from_http(http::Request::builder().uri(uri).body(Bytes::new()).unwrap())
    }

    fn directives(req: &Request) -> Option<Vec<SortDirective>> {
        req.state().and_then(|s| s.sort.clone())
    }

    #[test]
    fn parses_directives_in_order() {
        let sort = sort(["firstName", "lastName"]).unwrap();
        let mut req = request("/users?sort=firstName,-lastName");

        sort.apply(&mut req).unwrap();

        assert_eq!(
            directives(&req),
            Some(vec![SortDirective::asc("firstName"), SortDirective::desc("lastName")])
        );
    }

    #[test]
    fn rejects_unknown_field() {
        let sort = sort(["createdAt"]).unwrap();
        let mut req = request("/users?sort=firstName");

        let res = sort.apply(&mut req).unwrap_err();

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.json_body().unwrap()["message"],
            "Invalid sort field: 'firstName', must be one of: 'createdAt'"
        );
        assert!(req.state().is_none());
    }

    #[test]
    fn first_invalid_field_aborts_without_partial_state() {
        let sort = sort(["a", "b"]).unwrap();
        let mut req = request("/items?sort=a,-zzz,b");
        req.state_mut().sort = Some(vec![SortDirective::desc("b")]);

        assert!(sort.apply(&mut req).is_err());
        assert_eq!(directives(&req), Some(vec![SortDirective::desc("b")]));
    }

    #[test]
    fn falls_back_to_first_field_ascending() {
        let sort = sort(["createdAt", "title"]).unwrap();

        let mut absent = request("/posts");
        sort.apply(&mut absent).unwrap();
        assert_eq!(directives(&absent), Some(vec![SortDirective::asc("createdAt")]));

        let mut empty = request("/posts?sort=");
        sort.apply(&mut empty).unwrap();
        assert_eq!(directives(&empty), Some(vec![SortDirective::asc("createdAt")]));
    }

    #[test]
    fn configured_defaults_key_and_separator() {
        let options = SortOptions {
            key: "order".into(),
            separator: "|".into(),
            defaults: Some(vec![SortDirective::desc("createdAt")]),
        };
        let sort = Sort::new(["createdAt", "title"], options).unwrap();

        let mut req = request("/posts");
        sort.apply(&mut req).unwrap();
        assert_eq!(directives(&req), Some(vec![SortDirective::desc("createdAt")]));

        let mut req = request("/posts?order=title|-createdAt");
        sort.apply(&mut req).unwrap();
        assert_eq!(
            directives(&req),
            Some(vec![SortDirective::asc("title"), SortDirective::desc("createdAt")])
        );
    }

    #[test]
    fn repeated_parameters_are_read_in_order() {
        let sort = sort(["a", "b", "c"]).unwrap();
        let mut req = request("/items?sort=-c&sort=a,b");

        sort.apply(&mut req).unwrap();

        assert_eq!(
            directives(&req),
            Some(vec![SortDirective::desc("c"), SortDirective::asc("a"), SortDirective::asc("b")])
        );
    }

    #[test]
    fn replaces_previous_directives() {
        let sort = sort(["a", "b"]).unwrap();
        let mut req = request("/items?sort=b");
        req.state_mut().sort = Some(vec![SortDirective::desc("a")]);

        sort.apply(&mut req).unwrap();

        assert_eq!(directives(&req), Some(vec![SortDirective::asc("b")]));
    }

    #[test]
    fn empty_token_is_an_invalid_field() {
        let sort = sort(["a"]).unwrap();
        assert_eq!(sort.parse("a,"), Err(String::new()));
        assert_eq!(sort.parse("-"), Err(String::new()));
    }

    #[test]
    fn construction_errors() {
        assert!(matches!(sort(Vec::<String>::new()), Err(ConfigError::NoSortFields)));
        assert!(matches!(sort(["a", ""]), Err(ConfigError::EmptySortField)));

        let options = SortOptions { separator: String::new(), ..SortOptions::default() };
        assert!(matches!(Sort::new(["a"], options), Err(ConfigError::EmptySeparator)));
    }

    #[test]
    fn directives_serialize_lowercase() {
        let json = serde_json::to_value(SortDirective::desc("createdAt")).unwrap();
        assert_eq!(json, serde_json::json!({"field": "createdAt", "direction": "desc"}));
    }

    proptest! {
        #[test]
        fn one_directive_per_token_in_order(picks in proptest::collection::vec((0usize..4, any::<bool>()), 1..8)) {
            let fields = ["id", "name", "createdAt", "score"];
            let sort = sort(fields).unwrap();

            let raw: Vec<String> = picks
                .iter()
                .map(|&(i, desc)| if desc { format!("-{}", fields[i]) } else { fields[i].to_owned() })
                .collect();
            let expected: Vec<SortDirective> = picks
                .iter()
                .map(|&(i, desc)| if desc { SortDirective::desc(fields[i]) } else { SortDirective::asc(fields[i]) })
                .collect();

            prop_assert_eq!(sort.parse(&raw.join(",")), Ok(expected));
        }

        #[test]
        fn fields_outside_the_allow_list_are_rejected(field in "[a-z]{1,8}") {
            prop_assume!(field != "id");
            let sort = sort(["id"]).unwrap();
            let mut req = request(&format!("/items?sort=id,{field}"));

            prop_assert!(sort.apply(&mut req).is_err());
            prop_assert!(req.state().is_none());
        }
    }
}
