//! HTTP error responses.
//!
//! Every failure leaves the server as `{"detail": "..."}` with a status
//! chosen from the [`MojarungError`] variant.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use mojarung_shared::MojarungError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    /// Add `WWW-Authenticate: Bearer`.
    pub challenge: bool,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            challenge: false,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            challenge: true,
            ..Self::new(StatusCode::UNAUTHORIZED, detail)
        }
    }
}

impl From<MojarungError> for ApiError {
    fn from(err: MojarungError) -> Self {
        match err {
            MojarungError::NotFound(what) => Self::not_found(format!("{what} not found")),
            MojarungError::Validation { message } => Self::bad_request(message),
            MojarungError::Conflict(message) => {
                Self::bad_request(format!("Database integrity error: {message}"))
            }
            MojarungError::Auth(message) => Self::unauthorized(message),
            MojarungError::Brokerage(message) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred with the brokerage API: {message}"),
            ),
            MojarungError::Llm(message) => Self::new(
                StatusCode::BAD_GATEWAY,
                format!("Language model request failed: {message}"),
            ),
            other => {
                error!(error = %other, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if self.challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
