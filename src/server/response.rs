use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Conflict(_)
            | Error::InvalidState(_)
            | Error::InsufficientStock { .. }
            | Error::AlreadyExists => StatusCode::CONFLICT,
            Error::AssignmentExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::BadRequest(_) | Error::MissingFields(_) | Error::InvalidTokenFormat => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized | Error::SignatureInvalid | Error::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Error::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Database(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::TokenLookupCollision => {
                tracing::error!("Request failed: {e}");
                return ApiError::internal("Internal server error");
            }
        };
        ApiError::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
