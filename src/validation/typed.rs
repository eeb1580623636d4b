//! [`Schema`] backed by a Rust type and the `validator` crate.
//!
//! The value is deserialized into `T`, checked with `T`'s derived rules, and
//! serialized back. Unknown keys disappear on the way through serde unless `T`
//! denies them. Scalars are not cast: a query-string `"12"` only reaches a
//! numeric field through a lenient `Deserialize` impl.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{FieldError, Schema, Settings, ValidationError};

/// Validates against the type `T`.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use turnstile::validation::{self, Typed, ValidationOptions};
/// use validator::Validate;
///
/// #[derive(Deserialize, Serialize, Validate)]
/// struct NewUser {
///     #[validate(length(min = 3))]
///     name: String,
/// }
///
/// let err = validation::validate(&json!({"name": "al"}), &Typed::<NewUser>::new(), &ValidationOptions::new())
///     .unwrap_err();
/// assert_eq!(err.details()[0].path, "name");
/// ```
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize + validator::Validate,
{
    fn check(&self, value: &Value, settings: &Settings) -> Result<Value, ValidationError> {
        let parsed: T = serde_json::from_value(value.clone()).map_err(|e| {
            ValidationError::Invalid(vec![FieldError::new(
                format!("\"value\" {e}"),
                "",
                "object.base",
            )])
        })?;

        if let Err(errors) = parsed.validate() {
            let mut details = field_errors(&errors);
            if settings.abort_early {
                details.truncate(1);
            }
            return Err(ValidationError::Invalid(details));
        }

        serde_json::to_value(&parsed).map_err(|e| ValidationError::Engine(Box::new(e)))
    }
}

fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut details = Vec::new();

    for (field, kinds) in errors.field_errors() {
        for error in kinds {
            let message = match &error.message {
                Some(message) => format!("\"{field}\" {message}"),
                None => format!("\"{field}\" failed {} validation", error.code),
            };
            details.push(FieldError::new(message, field.to_string(), error.code.to_string()));
        }
    }

    // field_errors() is backed by a HashMap.
    details.sort_by(|a, b| a.path.cmp(&b.path));
    details
}
