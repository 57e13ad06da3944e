//! Error taxonomy shared by every OAuth2 endpoint.
//!
//! Errors render as `{"error": ..., "error_description": ...}` using the RFC 6749
//! error codes. Descriptions never distinguish an unknown client from a wrong
//! secret, nor an expired token from a revoked or never-issued one.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("Invalid client credentials")]
    InvalidClient,
    #[error("Invalid redirect_uri")]
    InvalidRedirectUri,
    #[error("Scope \"{0}\" not allowed for this client")]
    InvalidScope(String),
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("{0}")]
    InvalidGrant(&'static str),
    #[error("Missing or invalid credentials")]
    Unauthenticated,
    #[error("Unknown authorization request")]
    NotFound,
    #[error("Only response_type=code is supported")]
    UnsupportedResponseType,
    #[error("Only authorization_code and refresh_token grants are supported")]
    UnsupportedGrantType,
    #[error("Token does not have '{0}' scope")]
    InsufficientScope(&'static str),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body returned for every OAuth2 error.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// RFC 6749 error code (e.g. "invalid_grant")
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuth2Error::InvalidClient => "invalid_client",
            OAuth2Error::InvalidRedirectUri | OAuth2Error::InvalidRequest(_) => "invalid_request",
            OAuth2Error::InvalidScope(_) => "invalid_scope",
            OAuth2Error::InvalidGrant(_) => "invalid_grant",
            OAuth2Error::Unauthenticated => "unauthenticated",
            OAuth2Error::NotFound => "not_found",
            OAuth2Error::UnsupportedResponseType => "unsupported_response_type",
            OAuth2Error::UnsupportedGrantType => "unsupported_grant_type",
            OAuth2Error::InsufficientScope(_) => "insufficient_scope",
            OAuth2Error::Database(_) | OAuth2Error::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuth2Error::InvalidClient | OAuth2Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            OAuth2Error::NotFound => StatusCode::NOT_FOUND,
            OAuth2Error::InsufficientScope(_) => StatusCode::FORBIDDEN,
            OAuth2Error::Database(_) | OAuth2Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Description exposed to the caller. Internal failures expose nothing.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuth2Error::Database(_) | OAuth2Error::Internal(_) => None,
            other => Some(other.to_string()),
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.description(),
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        match &self {
            OAuth2Error::Database(e) => tracing::error!(error = %e, "Database error"),
            OAuth2Error::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
            _ => tracing::debug!(error = self.error_code(), "OAuth2 request rejected"),
        }

        let mut response = (self.status(), Json(self.to_response_body())).into_response();
        if matches!(self, OAuth2Error::Unauthenticated) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(OAuth2Error::InvalidClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuth2Error::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuth2Error::InvalidRedirectUri.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OAuth2Error::InvalidGrant("Invalid refresh token").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(OAuth2Error::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            OAuth2Error::InsufficientScope("openid").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            OAuth2Error::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn redirect_uri_errors_use_invalid_request_code() {
        let body = OAuth2Error::InvalidRedirectUri.to_response_body();
        assert_eq!(body.error, "invalid_request");
        assert_eq!(body.error_description.as_deref(), Some("Invalid redirect_uri"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = OAuth2Error::Database(sea_orm::DbErr::Custom("secret detail".into()));
        let body = err.to_response_body();
        assert_eq!(body.error, "server_error");
        assert!(body.error_description.is_none());
    }

    #[test]
    fn unauthenticated_sets_www_authenticate() {
        let response = OAuth2Error::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
