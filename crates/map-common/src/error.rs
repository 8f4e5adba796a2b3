//! Error types for mapfile resolution and request decoding.

use thiserror::Error;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Primary error type for map registry and request handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    // === Request Errors ===
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    // === Registry Errors ===
    #[error("Invalid map name '{name}': {message}")]
    InvalidMapName { name: String, message: String },

    #[error("URL path {path} is served by both '{first}' and '{second}'")]
    DuplicateUrlPath {
        path: String,
        first: String,
        second: String,
    },

    #[error("URL path {path} of '{name}' contains router syntax '{found}'")]
    InvalidUrlPath {
        path: String,
        name: String,
        found: char,
    },

    #[error("URL path {inner} is nested under {outer}")]
    NestedUrlPath { outer: String, inner: String },
}

impl MapError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            MapError::MalformedQuery(_) | MapError::MalformedBody(_) => 400,
            _ => 500,
        }
    }

    /// Whether the error was caused by the client rather than configuration.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MapError::MalformedQuery("%zz".into()).http_status_code(), 400);
        assert_eq!(MapError::MalformedBody("eof".into()).http_status_code(), 400);
        assert_eq!(
            MapError::InvalidMapName {
                name: "".into(),
                message: "empty".into()
            }
            .http_status_code(),
            500
        );
    }

    #[test]
    fn test_client_error() {
        assert!(MapError::MalformedQuery("a;b".into()).is_client_error());
        assert!(!MapError::DuplicateUrlPath {
            path: "/world/".into(),
            first: "world".into(),
            second: "globe".into(),
        }
        .is_client_error());
    }
}
