//! HTTP error translation.
//!
//! The single place core errors become status codes. Handlers bubble
//! `matou_core::Error` up with `?`; the `IntoResponse` impl translates
//! the error kind exactly once at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matou_core::ErrorKind;
use serde_json::json;

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// A core error crossing the HTTP boundary
#[derive(Debug)]
pub struct ApiError(pub matou_core::Error);

impl From<matou_core::Error> for ApiError {
    fn from(err: matou_core::Error) -> Self {
        Self(err)
    }
}

/// Status code for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotConfigured => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::RuntimeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matou_core::Error;

    #[test]
    fn test_status_mapping_total() {
        assert_eq!(
            status_for(Error::InvalidMnemonic("x".into()).kind()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(Error::IdentityNotConfigured.kind()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(Error::SpaceNotFound("E".into()).kind()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(Error::RuntimeUnavailable.kind()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(Error::SwapInProgress.kind()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(Error::TreeAppendFailed("x".into()).kind()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(Error::Internal("x".into()).kind()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
