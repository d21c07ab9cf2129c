use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::models::{CourseId, StudentId};

/// Rule violations and storage failures raised by the records services.
///
/// Every variant is a distinct, non-retryable failure; nothing is partially applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordsError {
    /// A referenced entity (course by name, or an entity by id) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Course '{0}' already has 20 students. Consider creating another course.")]
    CapacityExceeded(String),

    #[error("Student {student} is already enrolled in course {course}")]
    AlreadyEnrolled { course: CourseId, student: StudentId },

    #[error("Student {student} is not enrolled in course {course}")]
    NotEnrolled { course: CourseId, student: StudentId },

    #[error("Student {student} already has a grade in course {course}. Adjust it instead.")]
    DuplicateGrade { course: CourseId, student: StudentId },

    /// No grade for the pair, or the replacement value was out of range on adjust.
    #[error("Grade not found for student {student} in course {course}")]
    GradeNotFound { course: CourseId, student: StudentId },

    #[error("Grade must be between 0 and 100, got {0}")]
    InvalidRange(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No grades recorded for course {course}")]
    NoGradesFound { course: CourseId },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RecordsError {
    fn from(err: sqlx::Error) -> Self {
        RecordsError::Storage(err.to_string())
    }
}

/// HTTP-facing error type.
#[derive(Debug, Clone)]
pub enum AppError {
    /// A domain rule rejected the request.
    Records(RecordsError),
    /// Error with context chain for better debugging.
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Records(e) => write!(f, "{}", e),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl AppError {
    /// Status code the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Records(e) => match e {
                RecordsError::NotFound(_) | RecordsError::GradeNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                RecordsError::CapacityExceeded(_)
                | RecordsError::AlreadyEnrolled { .. }
                | RecordsError::DuplicateGrade { .. } => StatusCode::CONFLICT,
                RecordsError::NotEnrolled { .. }
                | RecordsError::InvalidRange(_)
                | RecordsError::NoGradesFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RecordsError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                RecordsError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::WithContext { source, .. } => source.status(),
        }
    }

    /// True when the failure is on our side rather than the caller's.
    pub fn is_server_fault(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for AppError {
    /// Maps each error to a status code and a JSON body.
    ///
    /// Storage failures are logged and hidden behind a generic message.
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Records(RecordsError::Storage(msg)) => {
                tracing::error!("Storage error: {}", msg);
                "Storage error".to_string()
            }
            AppError::Records(e) => {
                tracing::warn!("Request rejected: {}", e);
                e.to_string()
            }
            AppError::WithContext { source, context } => {
                if source.is_server_fault() {
                    tracing::error!("Error with context: {} -> {}", context, source);
                } else {
                    tracing::warn!("Request rejected with context: {} -> {}", context, source);
                }
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<RecordsError> for AppError {
    fn from(err: RecordsError) -> Self {
        AppError::Records(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let pair = (CourseId(1), StudentId(2));
        assert_eq!(
            AppError::from(RecordsError::NotFound("course 'x'".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(RecordsError::AlreadyEnrolled {
                course: pair.0,
                student: pair.1
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(RecordsError::InvalidRange(101)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(RecordsError::InvalidArgument("course".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(RecordsError::Storage("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_context_keeps_source_status() {
        let result: Result<(), RecordsError> = Err(RecordsError::GradeNotFound {
            course: CourseId(3),
            student: StudentId(4),
        });
        let err = result.context("loading grade").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.to_string().starts_with("loading grade: "));
    }

    #[test]
    fn test_only_storage_failures_are_server_faults() {
        let rejected: Result<(), RecordsError> = Err(RecordsError::DuplicateGrade {
            course: CourseId(1),
            student: StudentId(2),
        });
        let err = rejected.context("assigning grade").unwrap_err();
        assert!(!err.is_server_fault());

        let failed: Result<(), RecordsError> = Err(RecordsError::Storage("down".into()));
        let err = failed.with_context(|| "enrolling student 2".to_string()).unwrap_err();
        assert!(err.is_server_fault());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
