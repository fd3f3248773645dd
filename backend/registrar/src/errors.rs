//! Application-wide error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use enrollment_engine::EngineError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegistrarError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Error returned from handlers; wraps an engine error for rendering.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::CourseNotFound(_)
            | EngineError::StudentNotFound(_)
            | EngineError::TeacherNotFound(_)
            | EngineError::RegistrationNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyRegistered { .. }
            | EngineError::AlreadyRequested { .. }
            | EngineError::CourseNotOpen { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::TransactionConflict { .. } => StatusCode::CONFLICT,
            EngineError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            EngineError::CourseNotDraft { .. }
            | EngineError::NotConfirmed(_)
            | EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Database(_) | EngineError::Migrate(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind: self.0.kind(),
            }),
        )
            .into_response()
    }
}
