//! Error types for the dav client core.
//!
//! # Design
//! `ApiError` is what builders, parsers and transports produce. Controller
//! entry points flatten it into `ErrorResponse`, the uniform
//! `{status, errors: [{code, message}]}` value callers inspect instead of
//! handling transport-specific failures. Local data errors (`StoreError`,
//! `SyncError`) are wrapped by `DataError` for `TableObject` mutators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code the backend returns when the access token must be renewed.
pub const ACCESS_TOKEN_MUST_BE_RENEWED: i32 = 3100;

/// A single structured error as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

/// Errors returned by `DavClient` builders/parsers and by `Transport`s.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No HTTP response was obtained.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {errors:?}")]
    Api {
        status: u16,
        errors: Vec<ErrorDetail>,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The call needs an access token but the session has none.
    #[error("no active session")]
    NotLoggedIn,
}

/// Uniform error value returned by every controller operation.
///
/// `status` is the HTTP status, or `-1` when no response was obtained or the
/// failure happened locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: i32,
    pub errors: Vec<ErrorDetail>,
}

impl ErrorResponse {
    /// Code of the first structured error, if the server sent any.
    pub fn first_code(&self) -> Option<i32> {
        self.errors.first().map(|e| e.code)
    }

    pub fn is_access_token_expired(&self) -> bool {
        self.first_code() == Some(ACCESS_TOKEN_MUST_BE_RENEWED)
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Api { status, errors } => ErrorResponse {
                status: i32::from(status),
                errors,
            },
            _ => ErrorResponse {
                status: -1,
                errors: Vec::new(),
            },
        }
    }
}

/// Failures of a `TableObjectStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failed: {0}")]
    Backend(String),

    #[error("stored table object could not be encoded: {0}")]
    Encoding(String),
}

/// Failures reported by a `SyncPush` implementation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync push failed: {0}")]
    Push(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Error type of every `TableObject` mutator.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_keeps_status_and_errors() {
        let err = ApiError::Api {
            status: 403,
            errors: vec![ErrorDetail {
                code: 1103,
                message: "Action not allowed".to_string(),
            }],
        };
        let resp = ErrorResponse::from(err);
        assert_eq!(resp.status, 403);
        assert_eq!(resp.errors[0].code, 1103);
    }

    #[test]
    fn transport_error_maps_to_minus_one() {
        let resp = ErrorResponse::from(ApiError::Transport("connection refused".to_string()));
        assert_eq!(resp.status, -1);
        assert!(resp.errors.is_empty());
    }

    #[test]
    fn detects_expired_access_token() {
        let err = ApiError::Api {
            status: 403,
            errors: vec![ErrorDetail {
                code: ACCESS_TOKEN_MUST_BE_RENEWED,
                message: "Access token must be renewed".to_string(),
            }],
        };
        assert!(ErrorResponse::from(err).is_access_token_expired());
        assert!(!ErrorResponse::from(ApiError::NotLoggedIn).is_access_token_expired());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(ApiError::NotLoggedIn.to_string(), "no active session");
        let err = DataError::from(StoreError::Backend("disk full".to_string()));
        assert_eq!(err.to_string(), "store backend failed: disk full");
    }
}
