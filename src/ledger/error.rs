use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::InvoiceStatus;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("installment {installment_id} is already paid")]
    AlreadyPaid { installment_id: Uuid },

    #[error("transaction reference {reference} was already recorded")]
    DuplicateTransaction { reference: String },

    #[error("capacity of {capacity} would be exceeded for event {event_id}")]
    CapacityExceeded {
        event_id: Uuid,
        /// Set when the limit that was hit belongs to a ticket type rather
        /// than to the event itself.
        ticket_type_id: Option<Uuid>,
        capacity: i32,
        /// Allocation or admission count the rejected change would have
        /// produced. `None` when an unbounded ticket type was refused outright.
        requested: Option<i64>,
    },

    #[error("invoice {invoice_id} installments sum to {allocated}, expected {total}")]
    InconsistentTotals {
        invoice_id: Uuid,
        total: Decimal,
        allocated: Decimal,
    },

    #[error("concurrent modification detected, retry the operation")]
    ConcurrencyConflict,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("invoice {invoice_id} is {status} and no longer accepts payments")]
    InvoiceClosed {
        invoice_id: Uuid,
        status: InvoiceStatus,
    },

    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error("storage error")]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::AlreadyPaid { .. } => "ALREADY_PAID",
            LedgerError::DuplicateTransaction { .. } => "DUPLICATE_TRANSACTION",
            LedgerError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            LedgerError::InconsistentTotals { .. } => "INCONSISTENT_TOTALS",
            LedgerError::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            LedgerError::InvoiceClosed { .. } => "INVOICE_CLOSED",
            LedgerError::Invariant(_) => "INVARIANT_VIOLATION",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// The requested effect already happened; a retrying caller can treat
    /// this as success.
    pub fn is_already_done(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyPaid { .. } | LedgerError::DuplicateTransaction { .. }
        )
    }

    /// Nothing was written and the whole operation may be replayed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict)
    }

    /// Storage outages and broken invariants abort the operation; the rest
    /// are expected outcomes reported back to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Storage(_) | LedgerError::Invariant(_))
    }
}
