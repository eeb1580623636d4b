//! Error types.

use std::net::AddrParseError;

use thiserror::Error;

/// The error type returned by turnstile's fallible operations.
///
/// Rejected requests are HTTP [`Response`](crate::Response) values, not
/// `Error`s. This type surfaces infrastructure failures: a bad bind address,
/// a socket that cannot be opened, a middleware built from bad settings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Address(#[from] AddrParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A middleware was constructed with settings it cannot work with.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("You should define at least one field in order to use the sort middleware")]
    NoSortFields,

    #[error("sort field names must not be empty")]
    EmptySortField,

    #[error("sort separator must not be empty")]
    EmptySeparator,

    #[error("{0} is not a valid HTTP status code")]
    InvalidStatus(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert() {
        let err: Error = ConfigError::NoSortFields.into();
        assert_eq!(
            err.to_string(),
            "You should define at least one field in order to use the sort middleware"
        );
    }

    #[test]
    fn address_errors_convert() {
        let err: Error = "not an address".parse::<std::net::SocketAddr>().unwrap_err().into();
        assert!(matches!(err, Error::Address(_)));
    }
}
