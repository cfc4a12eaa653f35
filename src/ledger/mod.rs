//! Invoice → installment → payment → ticket reconciliation.
//!
//! [`Ledger`] is the single entry point for the caller-facing operations.
//! Each operation opens exactly one unit of work on the injected
//! [`LedgerStore`] and either commits all of its writes or none.

use std::sync::Arc;

use crate::store::LedgerStore;

pub mod capacity;
pub mod catalog;
pub mod confirmation;
pub mod directory;
pub mod error;
pub mod invoice;
pub mod issuer;
pub mod partition;
pub mod reconcile;

pub use capacity::UnboundedCapacityPolicy;
pub use catalog::TicketTypeRequest;
pub use confirmation::GatewayConfirmation;
pub use directory::{NewEvent, NewPerson};
pub use error::{LedgerError, LedgerResult};
pub use invoice::{LineItem, NewInvoice};
pub use reconcile::{PayInstallment, PaymentOutcome};

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    policy: UnboundedCapacityPolicy,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: UnboundedCapacityPolicy) -> Self {
        Self { store, policy }
    }
}

/// Trims `value` and rejects it when nothing is left.
pub(crate) fn required(field: &str, value: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
