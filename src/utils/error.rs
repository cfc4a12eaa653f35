use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::gateway::{CheckoutError, GatewayError};
use crate::ledger::LedgerError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Ledger(e) => AppError::Ledger(e),
            CheckoutError::Gateway(e) => AppError::Gateway(e),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Ledger(err) => match err {
                LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                LedgerError::AlreadyPaid { .. }
                | LedgerError::DuplicateTransaction { .. }
                | LedgerError::ConcurrencyConflict
                | LedgerError::DuplicateEmail(_)
                | LedgerError::InvoiceClosed { .. } => StatusCode::CONFLICT,
                LedgerError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::InconsistentTotals { .. }
                | LedgerError::Invariant(_)
                | LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Gateway(GatewayError::Rejected(_)) => StatusCode::BAD_GATEWAY,
            AppError::Gateway(GatewayError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Ledger(err) => err.code(),
            AppError::Gateway(_) => "EXTERNAL_SERVICE_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::Ledger(err) if err.is_fatal() => {
                error!(error = ?err, "Ledger operation failed");
            }
            AppError::Ledger(err) => {
                warn!(code = err.code(), message = %err, "Ledger request rejected");
            }
            AppError::Gateway(err) => {
                error!(error = ?err, "Payment gateway error");
            }
        }
    }

    /// Client-facing message. Storage and invariant details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Ledger(LedgerError::Storage(_)) => "A database error occurred".to_string(),
            AppError::Ledger(LedgerError::Invariant(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Ledger(LedgerError::ConcurrencyConflict) => Some(json!({ "retry": true })),
            AppError::Ledger(err) if err.is_already_done() => {
                Some(json!({ "already_done": true }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
