use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use streamstore::{StoreError, record::InvalidRecordId};
use tracing::warn;

pub type AppResult<T> = Result<T, AppError>;

/// An error response.
///
/// Serialized as `{ "code": ..., "message": ... }`, with the HTTP status
/// derived from the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    #[serde(skip)]
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    /// Create a new [`AppError`].
    pub fn new(status: StatusCode, code: &str, message: impl ToString) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let json = Json(self.clone());
        (self.status, json).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        let status = match &value {
            StoreError::InvalidVersion { .. } | StoreError::RecordExists { .. } => {
                StatusCode::CONFLICT
            }
            StoreError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
            _ => {
                warn!(err = ?value, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, value.code(), &value)
    }
}

impl From<InvalidRecordId> for AppError {
    fn from(value: InvalidRecordId) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_RECORD_ID", value)
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}
