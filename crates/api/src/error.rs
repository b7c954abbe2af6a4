//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CoverageError, DomainError, ErrorKind, OrderError};
use settlement::SettlementError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Workflow error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Settlement error.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl ApiError {
    /// Returns the stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidInput,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Domain(err) => err.kind(),
            ApiError::Settlement(err) => err.kind(),
        }
    }

    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<CoverageError> for ApiError {
    fn from(err: CoverageError) -> Self {
        OrderError::from(err).into()
    }
}

/// Maps an error kind to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidCoverageTerms => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition
        | ErrorKind::AlreadyTerminal
        | ErrorKind::ConcurrentModification
        | ErrorKind::AlreadySettled => StatusCode::CONFLICT,
        ErrorKind::InsufficientPayment => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(%kind, error = %message, "request failed");
        } else {
            tracing::debug!(%kind, error = %message, "request rejected");
        }

        let body = serde_json::json!({ "kind": kind, "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Money, OrderStatus};
    use order_store::{StoreError, Version};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                OrderError::InvalidTransition {
                    current: OrderStatus::Created,
                    requested: OrderStatus::Settled,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::ConcurrentModification {
                    order_id: OrderId::new(),
                    expected: Version::new(1),
                    actual: Version::new(2),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                SettlementError::InsufficientPayment {
                    amount_due: Money::from_cents(2510),
                    amount_tendered: Money::from_cents(2000),
                }
                .into(),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                CoverageError::PercentageOutOfRange(120.0).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DomainError::from(StoreError::Unavailable("down".into())).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (DomainError::NotFound(OrderId::new()).into(), StatusCode::NOT_FOUND),
            (
                DomainError::from(StoreError::Database(sqlx::Error::RowNotFound)).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                SettlementError::ReceiptNumberTaken("RCPT-20240101-000001".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err}");
        }
    }
}
