//! Error types for the query codec and the driver.
//!
//! # Design
//! `CodecError` covers everything the query codec can reject: unknown column
//! paths, malformed serialized paths and operator/operand mismatches. It is
//! raised both while encoding and while decoding.
//!
//! `ApiError` is what every driver operation returns. It wraps codec failures
//! and adds the response-side classifications: an unexpected HTTP status
//! (`Protocol`) and a payload or header with the wrong shape (`Shape`).
//! By-id mutations never produce `Protocol`; they fold a non-success status
//! into `Ok(false)` instead.

use thiserror::Error;

use crate::http::HttpMethod;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for driver operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while encoding or decoding a query path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The column path does not resolve against the model.
    #[error("unknown column `{path}` on model `{model}`")]
    Schema { model: String, path: String },

    /// The serialized query is truncated, carries an unknown block tag, or
    /// holds a token that does not parse.
    #[error("malformed query path: {0}")]
    Format(String),

    /// The operator is unknown or its value has the wrong shape.
    #[error("invalid operator `{operator}` on `{path}`: {reason}")]
    Operator {
        operator: String,
        path: String,
        reason: String,
    },
}

/// Errors returned by `Driver` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The filter, sort, limit or field list could not be (de)serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The server answered with a status outside the accepted set.
    #[error("{method} {path} returned HTTP {status} {message}")]
    Protocol {
        method: HttpMethod,
        path: String,
        status: u16,
        message: String,
    },

    /// The payload or a header is present but structurally wrong.
    #[error("unexpected response shape: {0}")]
    Shape(String),

    /// The outbound entity could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The transport failed before a response was received.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The model has no storage path to address.
    #[error("model `{0}` has no storage path")]
    MissingStoragePath(String),

    /// An extra path uses `:id` on an operation that has no identifier.
    #[error("extra path `{0}` needs an identifier")]
    UnboundPlaceholder(String),
}

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Format,
    Operator,
    Protocol,
    Shape,
    Serialization,
    Transport,
    Config,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Codec(CodecError::Schema { .. }) => ErrorKind::Schema,
            ApiError::Codec(CodecError::Format(_)) => ErrorKind::Format,
            ApiError::Codec(CodecError::Operator { .. }) => ErrorKind::Operator,
            ApiError::Protocol { .. } => ErrorKind::Protocol,
            ApiError::Shape(_) => ErrorKind::Shape,
            ApiError::Serialization(_) => ErrorKind::Serialization,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::MissingStoragePath(_) | ApiError::UnboundPlaceholder(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_classify_through_api_error() {
        let err: ApiError = CodecError::Schema {
            model: "user".to_string(),
            path: "nope".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.to_string(), "unknown column `nope` on model `user`");
    }

    #[test]
    fn protocol_error_names_request() {
        let err = ApiError::Protocol {
            method: HttpMethod::Post,
            path: "users".to_string(),
            status: 500,
            message: "Internal Server Error".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(
            err.to_string(),
            "POST users returned HTTP 500 Internal Server Error"
        );
    }
}
