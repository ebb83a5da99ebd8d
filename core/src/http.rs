//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. The driver builds `HttpRequest`
//! values and interprets `HttpResponse` values; moving bytes over the network
//! is the job of a `Transport` implementation supplied by the caller. This
//! keeps the driver deterministic and lets tests swap in a canned transport.
//!
//! `HttpResponse` is the response envelope: it remembers the request line it
//! answers so errors can name the failing call.

use std::fmt;

use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `path` is relative to the configured base URL; `url` is the absolute
/// form a transport should dial.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The request line echoed into the matching response.
    pub fn line(&self) -> RequestLine {
        RequestLine {
            method: self.method,
            path: self.path.clone(),
        }
    }
}

/// Method and relative path of the request a response answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: HttpMethod,
    pub path: String,
}

/// The response envelope handed back by a `Transport`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub input: RequestLine,
    pub status: u16,
    pub message: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Decode the body as JSON. An empty body is no payload at all.
    pub fn payload(&self) -> ApiResult<Option<Value>> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.body)
            .map(Some)
            .map_err(|e| ApiError::Shape(format!("payload is not JSON: {e}")))
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// A failure below the HTTP layer: connection refused, timeout, broken body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Transport(err.0)
    }
}

/// Executes requests built by the driver.
///
/// Implementations must return non-2xx responses as `Ok`; status
/// interpretation belongs to the driver.
pub trait Transport {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            input: RequestLine {
                method: HttpMethod::Get,
                path: "users".to_string(),
            },
            status: 200,
            message: "OK".to_string(),
            headers: vec![("X-Api-Count".to_string(), "3".to_string())],
            body: body.to_string(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        assert_eq!(response("").header("x-api-count"), Some("3"));
        assert_eq!(response("").header("x-missing"), None);
    }

    #[test]
    fn empty_body_has_no_payload() {
        assert_eq!(response("  ").payload().unwrap(), None);
    }

    #[test]
    fn invalid_json_body_is_a_shape_error() {
        let err = response("not json").payload().unwrap_err();
        assert!(matches!(err, ApiError::Shape(_)));
    }

    #[test]
    fn method_display_is_uppercase() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }
}
