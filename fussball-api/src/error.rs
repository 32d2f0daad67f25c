//! API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use fussball_core::error::{FetchError, FussballError};

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: String,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
        }
    }

    /// Bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Missing or wrong API key.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// Not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    /// Upstream failed and nothing was cached.
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "UPSTREAM_UNAVAILABLE")
    }

    /// Internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }

    /// HTTP status of the error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match &err {
            FetchError::NotFound(_) => ApiError::not_found(err.to_string()),
            FetchError::Unsupported(_) => {
                tracing::error!(error = %err, "No fetcher for resource");
                ApiError::internal("An internal error occurred")
            }
            _ => {
                tracing::warn!(error = %err, "Upstream unavailable and nothing cached");
                ApiError::upstream_unavailable(err.to_string())
            }
        }
    }
}

impl From<FussballError> for ApiError {
    fn from(err: FussballError) -> Self {
        match err {
            FussballError::Fetch(fetch) => fetch.into(),
            FussballError::InvalidKey(_) => ApiError::bad_request(err.to_string()),
            _ => {
                tracing::error!(error = %err, "Internal error");
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fussball_core::ResourceKey;

    #[test]
    fn test_fetch_error_mapping() {
        let key = ResourceKey::team_table("T1");

        let err = ApiError::from(FetchError::NotFound(key.clone()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(FetchError::Timeout { key: key.clone(), seconds: 20 });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");

        let err = ApiError::from(FetchError::Unsupported(key));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_key_is_bad_request() {
        let err = ApiError::from(FussballError::InvalidKey("bad id".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
