//! Declarative schema engine.
//!
//! A [`Shape`] describes a JSON value: its kind, whether it must be present,
//! and the rules it has to satisfy. Checking a value walks the shape, casts
//! scalars when conversion is on, and records every failure with a rule code
//! (`number.base`, `any.required`, ...) and a message labelled with the
//! failing path.
//!
//! ```rust
//! use serde_json::json;
//! use turnstile::validation::{Schema, Settings, Shape};
//!
//! let schema = Shape::object().keys([
//!     ("page", Shape::number().integer().min(1.0)),
//!     ("order", Shape::string().valid(["asc", "desc"]).default("asc")),
//! ]);
//!
//! let value = schema.check(&json!({"page": "3"}), &Settings::default()).unwrap();
//! assert_eq!(value, json!({"page": 3, "order": "asc"}));
//! ```

use std::sync::Arc;

use serde_json::{Map, Number, Value};

use super::{FieldError, Schema, Settings, ValidationError};

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Failure returned by a [`Shape::custom`] rule.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RuleError {
    /// The value is unacceptable. Reported as an `any.custom` field error.
    #[error("{0}")]
    Invalid(String),
    /// The rule could not run. Aborts validation as an engine failure.
    #[error("{0}")]
    Internal(String),
}

type CustomRule = dyn Fn(&Value) -> Result<Value, RuleError> + Send + Sync;

#[derive(Clone)]
enum Kind {
    Any,
    String,
    Number { integer: bool },
    Boolean,
    Object(Option<Vec<(String, Shape)>>),
    Array(Option<Box<Shape>>),
}

#[derive(Clone)]
enum Rule {
    Min(f64),
    Max(f64),
    Valid(Vec<Value>),
    Custom(Arc<CustomRule>),
}

/// A schema built from composable parts.
#[derive(Clone)]
pub struct Shape {
    kind: Kind,
    required: bool,
    default: Option<Value>,
    allow_empty: bool,
    rules: Vec<Rule>,
}

impl Shape {
    fn of(kind: Kind) -> Self {
        Self { kind, required: false, default: None, allow_empty: false, rules: Vec::new() }
    }

    /// Accepts any value.
    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    /// A non-empty string, unless [`allow_empty`](Shape::allow_empty) is set.
    pub fn string() -> Self {
        Self::of(Kind::String)
    }

    pub fn number() -> Self {
        Self::of(Kind::Number { integer: false })
    }

    pub fn boolean() -> Self {
        Self::of(Kind::Boolean)
    }

    /// An object with any keys. Use [`keys`](Shape::keys) to declare them.
    pub fn object() -> Self {
        Self::of(Kind::Object(None))
    }

    /// An array of anything. Use [`items`](Shape::items) to constrain items.
    pub fn array() -> Self {
        Self::of(Kind::Array(None))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the key is absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restricts a number shape to integers.
    pub fn integer(mut self) -> Self {
        if let Kind::Number { integer } = &mut self.kind {
            *integer = true;
        }
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Lower bound: the value for numbers, the length for strings and
    /// arrays, the key count for objects.
    pub fn min(mut self, limit: f64) -> Self {
        self.rules.push(Rule::Min(limit));
        self
    }

    /// Upper bound, measured like [`min`](Shape::min).
    pub fn max(mut self, limit: f64) -> Self {
        self.rules.push(Rule::Max(limit));
        self
    }

    /// Restricts the value to a fixed set.
    pub fn valid<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rules.push(Rule::Valid(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Declares the object's keys, turning this into an object shape.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        let keys = keys.into_iter().map(|(k, s)| (k.into(), s)).collect();
        self.kind = Kind::Object(Some(keys));
        self
    }

    /// Declares the item shape, turning this into an array shape.
    pub fn items(mut self, item: Shape) -> Self {
        self.kind = Kind::Array(Some(Box::new(item)));
        self
    }

    /// Runs `rule` once the built-in checks pass. Its `Ok` value replaces
    /// the checked value.
    pub fn custom<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, RuleError> + Send + Sync + 'static,
    {
        self.rules.push(Rule::Custom(Arc::new(rule)));
        self
    }

    fn walk(&self, value: Option<&Value>, path: &mut Vec<String>, walk: &mut Walk<'_>) -> Option<Value> {
        let Some(value) = value else {
            if self.required {
                walk.report(path, "any.required", "is required");
                return None;
            }
            return self.default.clone();
        };

        let before = walk.errors.len();
        let value = self.base(value, path, walk)?;
        if walk.halted() {
            return None;
        }

        self.apply_rules(value, before, path, walk)
    }

    /// Type check, scalar conversion and recursion into containers.
    fn base(&self, value: &Value, path: &mut Vec<String>, walk: &mut Walk<'_>) -> Option<Value> {
        match &self.kind {
            Kind::Any => Some(value.clone()),
            Kind::String => match value {
                Value::String(s) if s.is_empty() && !self.allow_empty => {
                    walk.report(path, "string.empty", "is not allowed to be empty");
                    None
                }
                Value::String(_) => Some(value.clone()),
                _ => {
                    walk.report(path, "string.base", "must be a string");
                    None
                }
            },
            Kind::Number { integer } => self.cast_number(value, *integer, path, walk),
            Kind::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::String(s) if walk.settings.convert && s.eq_ignore_ascii_case("true") => {
                    Some(Value::Bool(true))
                }
                Value::String(s) if walk.settings.convert && s.eq_ignore_ascii_case("false") => {
                    Some(Value::Bool(false))
                }
                _ => {
                    walk.report(path, "boolean.base", "must be a boolean");
                    None
                }
            },
            Kind::Object(keys) => match value {
                Value::Object(map) => match keys {
                    None => Some(value.clone()),
                    Some(keys) => Some(Value::Object(Self::check_object(map, keys, path, walk))),
                },
                _ => {
                    walk.report(path, "object.base", "must be of type object");
                    None
                }
            },
            Kind::Array(item) => match value {
                Value::Array(items) => match item {
                    None => Some(value.clone()),
                    Some(item) => Some(Value::Array(Self::check_array(items, item, path, walk))),
                },
                _ => {
                    walk.report(path, "array.base", "must be an array");
                    None
                }
            },
        }
    }

    fn cast_number(&self, value: &Value, integer: bool, path: &mut Vec<String>, walk: &mut Walk<'_>) -> Option<Value> {
        let (float, cast) = match value {
            Value::Number(n) => (n.as_f64(), false),
            Value::String(s) if walk.settings.convert => (s.parse::<f64>().ok(), true),
            _ => (None, false),
        };

        let Some(float) = float.filter(|f| !f.is_nan()) else {
            walk.report(path, "number.base", "must be a number");
            return None;
        };
        if float.is_infinite() {
            walk.report(path, "number.infinity", "cannot be infinity");
            return None;
        }
        if integer && float.fract() != 0.0 {
            walk.report(path, "number.integer", "must be an integer");
            return None;
        }
        if integer && float.abs() > MAX_SAFE_INTEGER {
            walk.report(path, "number.unsafe", "must be a safe number");
            return None;
        }

        // Integer rules hand back integer JSON, even for `3.0`.
        let integral_float = integer && matches!(value, Value::Number(n) if n.is_f64());
        if !cast && !integral_float {
            return Some(value.clone());
        }
        if float.fract() == 0.0 && float.abs() <= MAX_SAFE_INTEGER {
            return Some(Value::from(float as i64));
        }
        Number::from_f64(float).map(Value::Number)
    }

    fn check_object(
        map: &Map<String, Value>,
        keys: &[(String, Shape)],
        path: &mut Vec<String>,
        walk: &mut Walk<'_>,
    ) -> Map<String, Value> {
        let mut out = Map::new();

        for (key, shape) in keys {
            path.push(key.clone());
            let checked = shape.walk(map.get(key), path, walk);
            path.pop();

            if let Some(value) = checked {
                out.insert(key.clone(), value);
            }
            if walk.halted() {
                return out;
            }
        }

        for (key, value) in map {
            if keys.iter().any(|(k, _)| k == key) || walk.settings.strip_objects {
                continue;
            }
            if walk.settings.allow_unknown {
                out.insert(key.clone(), value.clone());
                continue;
            }
            path.push(key.clone());
            walk.report(path, "object.unknown", "is not allowed");
            path.pop();
            if walk.halted() {
                break;
            }
        }

        out
    }

    fn check_array(items: &[Value], item: &Shape, path: &mut Vec<String>, walk: &mut Walk<'_>) -> Vec<Value> {
        let mut out = Vec::with_capacity(items.len());

        for (index, value) in items.iter().enumerate() {
            let before = walk.errors.len();
            path.push(index.to_string());
            let checked = item.walk(Some(value), path, walk);
            path.pop();

            if walk.failure.is_some() {
                break;
            }
            if walk.errors.len() > before {
                if walk.settings.strip_arrays {
                    walk.errors.truncate(before);
                    continue;
                }
                if walk.halted() {
                    break;
                }
            }
            out.extend(checked);
        }

        out
    }

    fn apply_rules(
        &self,
        mut value: Value,
        before: usize,
        path: &mut Vec<String>,
        walk: &mut Walk<'_>,
    ) -> Option<Value> {
        for rule in &self.rules {
            match rule {
                Rule::Min(limit) => self.bound(&value, *limit, true, path, walk),
                Rule::Max(limit) => self.bound(&value, *limit, false, path, walk),
                Rule::Valid(allowed) => {
                    if !allowed.contains(&value) {
                        let list: Vec<String> = allowed.iter().map(display).collect();
                        walk.report(path, "any.only", format!("must be one of [{}]", list.join(", ")));
                    }
                }
                Rule::Custom(check) => {
                    if walk.errors.len() > before {
                        continue;
                    }
                    match check(&value) {
                        Ok(replaced) => value = replaced,
                        Err(RuleError::Invalid(reason)) => walk.report(
                            path,
                            "any.custom",
                            format!("failed custom validation because {reason}"),
                        ),
                        Err(RuleError::Internal(reason)) => {
                            walk.failure = Some(reason);
                        }
                    }
                }
            }
            if walk.halted() {
                return None;
            }
        }

        Some(value)
    }

    fn bound(&self, value: &Value, limit: f64, lower: bool, path: &[String], walk: &mut Walk<'_>) {
        let (measured, kind) = match (&self.kind, value) {
            (Kind::Number { .. }, Value::Number(n)) => (n.as_f64().unwrap_or_default(), "number"),
            (Kind::String, Value::String(s)) => (s.chars().count() as f64, "string"),
            (Kind::Array(_), Value::Array(items)) => (items.len() as f64, "array"),
            (Kind::Object(_), Value::Object(map)) => (map.len() as f64, "object"),
            _ => return,
        };

        let ok = if lower { measured >= limit } else { measured <= limit };
        if ok {
            return;
        }

        let message = match (kind, lower) {
            ("number", true) => format!("must be greater than or equal to {limit}"),
            ("number", false) => format!("must be less than or equal to {limit}"),
            ("string", true) => format!("length must be at least {limit} characters long"),
            ("string", false) => format!("length must be less than or equal to {limit} characters long"),
            ("array", true) => format!("must contain at least {limit} items"),
            ("array", false) => format!("must contain less than or equal to {limit} items"),
            (_, true) => format!("must have at least {limit} keys"),
            (_, false) => format!("must have less than or equal to {limit} keys"),
        };
        let rule = format!("{kind}.{}", if lower { "min" } else { "max" });
        walk.report(path, &rule, message);
    }
}

impl Schema for Shape {
    fn check(&self, value: &Value, settings: &Settings) -> Result<Value, ValidationError> {
        let mut walk = Walk { settings, errors: Vec::new(), failure: None };
        let checked = self.walk(Some(value), &mut Vec::new(), &mut walk);

        if let Some(reason) = walk.failure {
            return Err(ValidationError::Engine(reason.into()));
        }
        if !walk.errors.is_empty() {
            return Err(ValidationError::Invalid(walk.errors));
        }
        Ok(checked.unwrap_or(Value::Null))
    }
}

/// Traversal state for one check.
struct Walk<'a> {
    settings: &'a Settings,
    errors: Vec<FieldError>,
    failure: Option<String>,
}

impl Walk<'_> {
    fn halted(&self) -> bool {
        self.failure.is_some() || (self.settings.abort_early && !self.errors.is_empty())
    }

    fn report(&mut self, path: &[String], rule: &str, message: impl std::fmt::Display) {
        let joined = path.join(".");
        let label = if joined.is_empty() { "value" } else { joined.as_str() };
        self.errors.push(FieldError::new(format!("\"{label}\" {message}"), joined.clone(), rule));
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn check(shape: &Shape, value: Value) -> Result<Value, ValidationError> {
        shape.check(&value, &Settings::default())
    }

    fn rules(err: &ValidationError) -> Vec<&str> {
        err.details().iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn casts_numeric_strings() {
        let shape = Shape::object().keys([("id", Shape::number().required())]);
        assert_eq!(check(&shape, json!({"id": "12"})).unwrap(), json!({"id": 12}));
        assert_eq!(check(&shape, json!({"id": "1.5"})).unwrap(), json!({"id": 1.5}));
    }

    #[test]
    fn keeps_strings_when_conversion_is_off() {
        let settings = Settings { convert: false, ..Settings::default() };
        let err = Shape::number().check(&json!("12"), &settings).unwrap_err();
        assert_eq!(rules(&err), ["number.base"]);
    }

    #[test]
    fn casts_boolean_strings() {
        assert_eq!(check(&Shape::boolean(), json!("TRUE")).unwrap(), json!(true));
        assert_eq!(check(&Shape::boolean(), json!("false")).unwrap(), json!(false));
        assert!(check(&Shape::boolean(), json!("yes")).is_err());
    }

    #[test]
    fn reports_missing_required_keys() {
        let shape = Shape::object().keys([("X-Header-Custom", Shape::string().required())]);
        let err = check(&shape, json!({})).unwrap_err();
        assert_eq!(
            err.details(),
            [FieldError::new("\"X-Header-Custom\" is required", "X-Header-Custom", "any.required")]
        );
    }

    #[test]
    fn fills_defaults_for_absent_keys() {
        let shape = Shape::object().keys([("limit", Shape::number().default(20))]);
        assert_eq!(check(&shape, json!({})).unwrap(), json!({"limit": 20}));
    }

    #[test]
    fn integer_and_bounds() {
        let shape = Shape::object().keys([("perPage", Shape::number().integer().min(1.0).max(10000.0))]);

        let err = check(&shape, json!({"perPage": 11000})).unwrap_err();
        assert_eq!(err.details()[0].message, "\"perPage\" must be less than or equal to 10000");
        assert_eq!(rules(&err), ["number.max"]);

        let err = check(&shape, json!({"perPage": "0"})).unwrap_err();
        assert_eq!(err.details()[0].message, "\"perPage\" must be greater than or equal to 1");

        let err = check(&shape, json!({"perPage": "2.5"})).unwrap_err();
        assert_eq!(rules(&err), ["number.integer"]);
    }

    #[test]
    fn integer_rule_normalizes_integral_floats() {
        let out = check(&Shape::number().integer(), json!(3.0)).unwrap();
        assert_eq!(out.as_u64(), Some(3));

        let untouched = check(&Shape::number(), json!(3.0)).unwrap();
        assert!(untouched.is_f64());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        assert_eq!(rules(&check(&Shape::number(), json!("NaN")).unwrap_err()), ["number.base"]);
        assert_eq!(rules(&check(&Shape::number(), json!("1e400")).unwrap_err()), ["number.infinity"]);
    }

    #[test]
    fn empty_strings_need_opt_in() {
        assert_eq!(rules(&check(&Shape::string(), json!("")).unwrap_err()), ["string.empty"]);
        assert_eq!(check(&Shape::string().allow_empty(), json!("")).unwrap(), json!(""));
    }

    #[test]
    fn string_length_bounds() {
        let err = check(&Shape::string().min(3.0), json!("ab")).unwrap_err();
        assert_eq!(err.details()[0].message, "\"value\" length must be at least 3 characters long");
    }

    #[test]
    fn unknown_keys_rejected_when_neither_stripped_nor_allowed() {
        let shape = Shape::object().keys([("a", Shape::any())]);
        let settings = Settings { strip_objects: false, ..Settings::default() };
        let err = shape.check(&json!({"a": 1, "b": 2}), &settings).unwrap_err();
        assert_eq!(err.details(), [FieldError::new("\"b\" is not allowed", "b", "object.unknown")]);
    }

    #[test]
    fn unknown_keys_kept_when_allowed() {
        let shape = Shape::object().keys([("a", Shape::any())]);
        let settings = Settings { strip_objects: false, allow_unknown: true, ..Settings::default() };
        assert_eq!(shape.check(&json!({"a": 1, "b": 2}), &settings).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn stripping_beats_allowing() {
        let shape = Shape::object().keys([("a", Shape::any())]);
        let settings = Settings { allow_unknown: true, ..Settings::default() };
        assert_eq!(shape.check(&json!({"a": 1, "b": 2}), &settings).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn nested_paths_are_dot_joined() {
        let shape = Shape::object().keys([(
            "owner",
            Shape::object().keys([("tags", Shape::array().items(Shape::string()))]),
        )]);
        let err = check(&shape, json!({"owner": {"tags": ["a", 3]}})).unwrap_err();
        assert_eq!(
            err.details(),
            [FieldError::new("\"owner.tags.1\" must be a string", "owner.tags.1", "string.base")]
        );
    }

    #[test]
    fn abort_early_stops_at_first_failure() {
        let shape = Shape::object().keys([
            ("a", Shape::number().required()),
            ("b", Shape::number().required()),
        ]);
        let settings = Settings { abort_early: true, ..Settings::default() };
        let err = shape.check(&json!({}), &settings).unwrap_err();
        assert_eq!(rules(&err), ["any.required"]);
        assert_eq!(err.details()[0].path, "a");
    }

    #[test]
    fn strip_arrays_drops_failing_items() {
        let shape = Shape::array().items(Shape::number());
        let settings = Settings { strip_arrays: true, ..Settings::default() };
        assert_eq!(shape.check(&json!(["1", "x", 3]), &settings).unwrap(), json!([1, 3]));
    }

    #[test]
    fn valid_lists_allowed_values() {
        let err = check(&Shape::string().valid(["asc", "desc"]), json!("up")).unwrap_err();
        assert_eq!(err.details()[0].message, "\"value\" must be one of [asc, desc]");
        assert_eq!(rules(&err), ["any.only"]);
    }

    #[test]
    fn custom_rules_transform_or_reject() {
        let upper = Shape::string().custom(|v| Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase())));
        assert_eq!(check(&upper, json!("eur")).unwrap(), json!("EUR"));

        let even = Shape::number().custom(|v| match v.as_i64() {
            Some(n) if n % 2 == 0 => Ok(v.clone()),
            _ => Err(RuleError::Invalid("it is odd".into())),
        });
        let err = check(&even, json!(3)).unwrap_err();
        assert_eq!(err.details()[0].message, "\"value\" failed custom validation because it is odd");
        assert_eq!(rules(&err), ["any.custom"]);
    }

    #[test]
    fn custom_internal_error_is_an_engine_failure() {
        let shape = Shape::object().keys([(
            "x",
            Shape::any().custom(|_| Err(RuleError::Internal("backend down".into()))),
        )]);
        let err = check(&shape, json!({"x": 1})).unwrap_err();
        assert!(matches!(err, ValidationError::Engine(_)));
    }
}
