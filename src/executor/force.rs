use crate::core::{FieldErrors, Operation, PersistError};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Boundary-ready form of a persistence error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct Failure {
    pub status: StatusCode,
    pub message: String,
    /// Per-field reasons for 422 responses.
    pub errors: FieldErrors,
}

impl Failure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: FieldErrors::new(),
        }
    }

    /// `{"errors": {...}}` for field failures, `{"error": "..."}` otherwise.
    pub fn body(&self) -> serde_json::Value {
        if self.errors.is_empty() {
            json!({ "error": self.message })
        } else {
            json!({ "errors": self.errors })
        }
    }
}

impl From<PersistError> for Failure {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, format!("not found: {}", what)),
            PersistError::ConstraintViolation(errors) | PersistError::Validation(errors) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "unprocessable entity".to_string(),
                errors,
            },
            PersistError::Sql(sql)
                if matches!(sql.operation, Some(Operation::Insert | Operation::Update)) =>
            {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, sql.message)
            }
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

/// Converts persistence results into [`Failure`]s at the handler boundary.
pub trait Force<T> {
    fn force(self) -> std::result::Result<T, Failure>;
}

impl<T> Force<T> for crate::core::Result<T> {
    fn force(self) -> std::result::Result<T, Failure> {
        self.map_err(Failure::from)
    }
}
