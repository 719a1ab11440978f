use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::ExamError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(String),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<ExamError> for ApiError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::NotFound(message) => ApiError::NotFound(message),
            ExamError::Unauthorized(message) => ApiError::Unauthorized(message),
            ExamError::InvalidState(message) => ApiError::Conflict(message),
            ExamError::Validation(message) => ApiError::BadRequest(message),
            ExamError::Timeout => ApiError::ServiceUnavailable(ExamError::Timeout.to_string()),
            ExamError::Database(source) => ApiError::internal(source, "Database operation failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_errors_map_to_http_statuses() {
        let cases = [
            (ExamError::not_found("final exam", 4), StatusCode::NOT_FOUND),
            (ExamError::Unauthorized("invalid exam code".to_string()), StatusCode::UNAUTHORIZED),
            (ExamError::invalid_state("wrong partial type"), StatusCode::CONFLICT),
            (ExamError::validation("weights must sum to 100"), StatusCode::BAD_REQUEST),
            (ExamError::Timeout, StatusCode::SERVICE_UNAVAILABLE),
            (ExamError::Database(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
