use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::discounts::DiscountRejection;

/// JSON error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict").
    pub error: String,
    /// Human-readable error description.
    pub message: String,
    /// Machine-readable code for clients that branch on the failure kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred.
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Carries the state machine's exact rejection sentence.
    #[error("{0}")]
    InvalidStatusTransition(String),

    /// Stock race lost; distinct from validation so clients can offer
    /// "reduce quantity" flows.
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("{0}")]
    DiscountRejected(#[from] DiscountRejection),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_)
            | ServiceError::DiscountRejected(_)
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidStatusTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InsufficientStock(_) => StatusCode::CONFLICT,
            ServiceError::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable code for clients; mirrors the error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "DATABASE_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::ValidationError(_) => "VALIDATION_ERROR",
            ServiceError::InvalidStatusTransition(_) => "INVALID_STATUS_TRANSITION",
            ServiceError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            ServiceError::DiscountRejected(rejection) => rejection.code(),
            ServiceError::InvalidOperation(_) => "INVALID_OPERATION",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
            ServiceError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to the caller. Database failures are not
    /// echoed verbatim.
    fn response_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: Some(self.code().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}
