//! Error types for the OAuth bridge

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias for the OAuth bridge
pub type Result<T> = std::result::Result<T, Error>;

/// OAuth bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request parameter
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Dynamic client registration metadata rejected
    #[error("Invalid client metadata: {0}")]
    InvalidClientMetadata(String),

    /// Expired, invalid or already consumed code or refresh token
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// `grant_type` other than `authorization_code` / `refresh_token`
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Upstream provider failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Bridge token signing/verification failure
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidGrant`].
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// OAuth error code reported to clients.
    #[must_use]
    pub fn oauth_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::InvalidClientMetadata(_) => codes::INVALID_CLIENT_METADATA,
            Self::InvalidGrant(_) => codes::INVALID_GRANT,
            Self::UnsupportedGrantType(_) => codes::UNSUPPORTED_GRANT_TYPE,
            Self::Provider(e) if !e.is_retryable() => codes::INVALID_GRANT,
            _ => codes::SERVER_ERROR,
        }
    }

    /// HTTP status used when this error reaches a programmatic endpoint.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidClientMetadata(_)
            | Self::InvalidGrant(_)
            | Self::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            Self::Provider(e) if e.is_retryable() => StatusCode::BAD_GATEWAY,
            Self::Provider(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description safe to show to the caller.
    ///
    /// Server-side failures are reduced to a generic message; the detail only
    /// goes to the log.
    #[must_use]
    pub fn public_description(&self) -> String {
        match self {
            Self::InvalidRequest(msg)
            | Self::InvalidClientMetadata(msg)
            | Self::InvalidGrant(msg)
            | Self::UnsupportedGrantType(msg) => msg.clone(),
            Self::Provider(e) if !e.is_retryable() => {
                "Upstream provider rejected the grant; restart its authorization".to_string()
            }
            Self::Provider(_) => "Upstream provider unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// OAuth error codes
pub mod codes {
    /// Malformed or missing parameter
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// Registration metadata rejected
    pub const INVALID_CLIENT_METADATA: &str = "invalid_client_metadata";
    /// Code or refresh token not usable
    pub const INVALID_GRANT: &str = "invalid_grant";
    /// Grant type not supported
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    /// Unclassified internal or transport failure
    pub const SERVER_ERROR: &str = "server_error";
}

/// JSON body of an OAuth error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// OAuth error code
    pub error: &'static str,
    /// Human-readable description
    pub error_description: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.oauth_code(),
            error_description: self.public_description(),
        };
        (status, [("cache-control", "no-store")], Json(body)).into_response()
    }
}
