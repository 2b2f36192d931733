//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Request conflicts with work already in progress.
    Conflict(String),
    /// Print saga error.
    Saga(SagaError),
    /// System of record error outside a batch.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg, None)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg, None)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, error_body(msg, None)),
            ApiError::Saga(err) => {
                let status = saga_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "print batch failed");
                }
                (status, error_body(err.user_message(), Some(err.reason())))
            }
            ApiError::Store(err) => {
                tracing::error!(error = %err, "store error");
                let status = if err.is_transient() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, error_body(err.to_string(), None))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String, reason: Option<&str>) -> serde_json::Value {
    match reason {
        Some(reason) => serde_json::json!({ "error": message, "reason": reason }),
        None => serde_json::json!({ "error": message }),
    }
}

/// Status code for a failed batch.
pub fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        SagaError::DuplicateIdentifier { .. } | SagaError::CancelledByUser => StatusCode::CONFLICT,
        SagaError::AllocationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ValidationError;

    #[test]
    fn test_saga_status_mapping() {
        assert_eq!(
            saga_status(&SagaError::Validation(ValidationError::InvalidCount)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            saga_status(&SagaError::CooldownActive { remaining_ms: 10 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            saga_status(&SagaError::DuplicateIdentifier {
                pallet_number: "20240521/001".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(saga_status(&SagaError::CancelledByUser), StatusCode::CONFLICT);
        assert_eq!(
            saga_status(&SagaError::AllocationExhausted {
                attempts: 5,
                last_cause: "timeout".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            saga_status(&SagaError::NoItemsSucceeded { failed: 2 }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
