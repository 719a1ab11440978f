use thiserror::Error;

/// Failure taxonomy of the final exam operations.
#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("quiz content lookup timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ExamError {
    pub(crate) fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub(crate) type ExamResult<T> = Result<T, ExamError>;
