use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session is closed: the attempt has already been submitted")]
    SessionClosed,

    #[error("Question index {index} is out of range (question count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown question: {0}")]
    UnknownQuestion(String),

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("Invalid test definition: {0}")]
    InvalidTest(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::SessionClosed => StatusCode::CONFLICT,
            Error::IndexOutOfRange { .. } => StatusCode::BAD_REQUEST,
            Error::UnknownQuestion(_) => StatusCode::NOT_FOUND,
            Error::InvalidAnswer(_) | Error::InvalidTest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Error::SessionClosed => "session_closed",
            Error::IndexOutOfRange { .. } => "index_out_of_range",
            Error::UnknownQuestion(_) => "unknown_question",
            Error::InvalidAnswer(_) => "invalid_answer",
            Error::InvalidTest(_) => "invalid_test",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "request failed");
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": self.code(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_client_statuses() {
        assert_eq!(Error::SessionClosed.status(), StatusCode::CONFLICT);
        assert_eq!(
            Error::IndexOutOfRange { index: 4, len: 3 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidAnswer("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
