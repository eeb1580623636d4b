//! Validation options and their explicit deep merge.
//!
//! Options are partial: every field is optional so a caller can override a
//! single nested key without restating the rest. [`ValidationOptions::merge`]
//! lays the caller's options over a set of defaults, key by key, and
//! [`ValidationOptions::settings`] resolves the result into the concrete
//! flags an engine reads.

use serde::{Deserialize, Serialize};

/// Unknown-key stripping, either as one flag or per container kind.
///
/// Deserializes from `true` / `false` or from `{"objects": .., "arrays": ..}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StripUnknown {
    All(bool),
    Only {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objects: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arrays: Option<bool>,
    },
}

impl StripUnknown {
    /// A flag replaces whatever it is merged onto; two per-kind forms merge
    /// key by key.
    fn merge(self, defaults: Self) -> Self {
        match (self, defaults) {
            (
                Self::Only { objects, arrays },
                Self::Only { objects: default_objects, arrays: default_arrays },
            ) => Self::Only {
                objects: objects.or(default_objects),
                arrays: arrays.or(default_arrays),
            },
            (own, _) => own,
        }
    }

    fn objects(self) -> bool {
        match self {
            Self::All(flag) => flag,
            Self::Only { objects, .. } => objects.unwrap_or(false),
        }
    }

    fn arrays(self) -> bool {
        match self {
            Self::All(flag) => flag,
            Self::Only { arrays, .. } => arrays.unwrap_or(false),
        }
    }
}

impl From<bool> for StripUnknown {
    fn from(flag: bool) -> Self {
        Self::All(flag)
    }
}

/// Partial validation options, as supplied by a caller or a config file.
///
/// ```rust
/// use turnstile::validation::ValidationOptions;
///
/// let options: ValidationOptions =
///     serde_json::from_str(r#"{"stripUnknown": {"arrays": true}, "abortEarly": true}"#).unwrap();
/// let settings = options.merge(&ValidationOptions::defaults()).settings();
///
/// assert!(settings.strip_objects);
/// assert!(settings.strip_arrays);
/// assert!(settings.abort_early);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_unknown: Option<StripUnknown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_early: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unknown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<bool>,
}

impl ValidationOptions {
    /// Empty options: everything falls through to the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine defaults: strip unknown object keys, report every failure.
    pub fn defaults() -> Self {
        Self {
            strip_unknown: Some(StripUnknown::Only { objects: Some(true), arrays: None }),
            abort_early: Some(false),
            allow_unknown: None,
            convert: None,
        }
    }

    /// Defaults for the headers source. Without these every header the
    /// schema does not name would be dropped from the request.
    pub fn headers() -> Self {
        Self {
            strip_unknown: Some(StripUnknown::All(false)),
            allow_unknown: Some(true),
            ..Self::default()
        }
    }

    pub fn strip_unknown(mut self, strip: impl Into<StripUnknown>) -> Self {
        self.strip_unknown = Some(strip.into());
        self
    }

    pub fn abort_early(mut self, abort: bool) -> Self {
        self.abort_early = Some(abort);
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = Some(allow);
        self
    }

    pub fn convert(mut self, convert: bool) -> Self {
        self.convert = Some(convert);
        self
    }

    /// Lays `self` over `defaults`. Keys set on `self` win at every level.
    pub fn merge(&self, defaults: &Self) -> Self {
        let strip_unknown = match (self.strip_unknown, defaults.strip_unknown) {
            (Some(own), Some(fallback)) => Some(own.merge(fallback)),
            (own, fallback) => own.or(fallback),
        };

        Self {
            strip_unknown,
            abort_early: self.abort_early.or(defaults.abort_early),
            allow_unknown: self.allow_unknown.or(defaults.allow_unknown),
            convert: self.convert.or(defaults.convert),
        }
    }

    /// Resolves the options into concrete flags. Unset keys are off, except
    /// `convert` which is on.
    pub fn settings(&self) -> Settings {
        let strip = self.strip_unknown.unwrap_or(StripUnknown::All(false));
        Settings {
            strip_objects: strip.objects(),
            strip_arrays: strip.arrays(),
            abort_early: self.abort_early.unwrap_or(false),
            allow_unknown: self.allow_unknown.unwrap_or(false),
            convert: self.convert.unwrap_or(true),
        }
    }
}

/// Fully resolved options, handed to a [`Schema`](super::Schema).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Drop object keys the schema does not declare.
    pub strip_objects: bool,
    /// Drop array items that fail their item schema instead of reporting them.
    pub strip_arrays: bool,
    /// Stop at the first failure.
    pub abort_early: bool,
    /// Keep undeclared object keys without reporting them.
    pub allow_unknown: bool,
    /// Cast strings to the declared scalar type.
    pub convert: bool,
}

impl Default for Settings {
    fn default() -> Self {
        ValidationOptions::defaults().settings()
    }
}
