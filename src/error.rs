//! Error types for the proxy.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Bad request ({code}): {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Upstream returned status {status}: {message}")]
    UpstreamFailure { status: u16, message: String },

    #[error("Upstream stream ended without producing any content")]
    EmptyResponse,

    #[error(
        "Upstream stream idle for {idle_for:?} (total {total:?}, {chunks} chunks, {bytes} bytes)"
    )]
    StreamIdleTimeout {
        idle_for: Duration,
        total: Duration,
        chunks: u64,
        bytes: u64,
    },

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: msg.into(),
        }
    }

    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Self::UpstreamFailure {
            status,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status this error maps to when surfaced as a response body.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::Json(_) => 400,
            Self::Unauthorized => 401,
            Self::StreamIdleTimeout { .. } => 408,
            Self::UpstreamFailure { .. } | Self::EmptyResponse => 502,
            _ => 500,
        }
    }

    /// Wire-level error type string for the JSON error body.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } | Self::Json(_) => "invalid_request_error",
            Self::Unauthorized => "authentication_error",
            Self::StreamIdleTimeout { .. } => "timeout_error",
            _ => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::bad_request("unknown_model", "x").http_status(),
            400
        );
        assert_eq!(ProxyError::Unauthorized.http_status(), 401);
        assert_eq!(ProxyError::upstream(503, "x").http_status(), 502);
        assert_eq!(ProxyError::EmptyResponse.http_status(), 502);
        assert_eq!(
            ProxyError::StreamIdleTimeout {
                idle_for: Duration::from_secs(180),
                total: Duration::from_secs(200),
                chunks: 1,
                bytes: 10,
            }
            .http_status(),
            408
        );
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(ProxyError::Unauthorized.wire_type(), "authentication_error");
        assert_eq!(
            ProxyError::bad_request("dangling_tool_result", "x").wire_type(),
            "invalid_request_error"
        );
        assert_eq!(ProxyError::upstream(500, "x").wire_type(), "api_error");
    }
}
