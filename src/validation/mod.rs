//! Schema validation adapter.
//!
//! Every validating middleware goes through [`validate`]: it lays the caller's
//! [`ValidationOptions`] over the engine defaults, runs a [`Schema`], and hands
//! back either the normalized value or a [`ValidationError`].
//!
//! The value that comes back is the engine's output, not the input: numeric
//! strings become numbers, defaults are filled in, stripped keys are gone.
//!
//! ```rust
//! use serde_json::json;
//! use turnstile::validation::{self, Shape, ValidationOptions};
//!
//! let schema = Shape::object().keys([("id", Shape::number().required())]);
//! let data = validation::validate(&json!({"id": "12", "extra": 1}), &schema, &ValidationOptions::new());
//!
//! assert_eq!(data.unwrap(), json!({"id": 12}));
//! ```

mod options;
mod shape;
mod typed;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use options::{Settings, StripUnknown, ValidationOptions};
pub use shape::{RuleError, Shape};
pub use typed::Typed;

/// A validation engine.
///
/// Implementations must report input problems as
/// [`ValidationError::Invalid`] and keep [`ValidationError::Engine`] for
/// failures that have nothing to do with the shape of the input.
pub trait Schema: Send + Sync {
    fn check(&self, value: &Value, settings: &Settings) -> Result<Value, ValidationError>;
}

/// One field-level failure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    /// Dot-joined key path, empty for the top-level value.
    pub path: String,
    /// The rule that failed, e.g. `number.max`.
    #[serde(rename = "type")]
    pub rule: String,
}

impl FieldError {
    pub fn new(
        message: impl Into<String>,
        path: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self { message: message.into(), path: path.into(), rule: rule.into() }
    }
}

/// The two ways a validation can fail.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The input does not satisfy the schema.
    #[error("validation failed: {} field error(s)", .0.len())]
    Invalid(Vec<FieldError>),

    /// The engine itself failed.
    #[error("unexpected validation engine failure: {0}")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ValidationError {
    /// Field-level details; empty for engine failures.
    pub fn details(&self) -> &[FieldError] {
        match self {
            Self::Invalid(details) => details,
            Self::Engine(_) => &[],
        }
    }

    pub fn is_engine_failure(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

/// Validates `data` against `schema` with `options` laid over
/// [`ValidationOptions::defaults`].
pub fn validate(
    data: &Value,
    schema: &dyn Schema,
    options: &ValidationOptions,
) -> Result<Value, ValidationError> {
    let settings = options.merge(&ValidationOptions::defaults()).settings();
    schema.check(data, &settings)
}

/// The JSON body sent back for input failures.
pub fn error_body(message: &str, details: &[FieldError]) -> Value {
    json!({
        "type": "validation_error",
        "message": message,
        "errors": details,
    })
}

/// The JSON body sent back when the engine itself failed.
pub fn internal_error_body() -> Value {
    json!({
        "type": "internal_error",
        "message": "An unexpected error occurred during validation",
    })
}
