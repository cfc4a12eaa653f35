use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{LedgerError, LedgerResult};
use crate::models::{Invoice, InvoiceStatus, Ticket, TicketStatus};
use crate::store::UnitOfWork;

/// Tickets that activation moves to ACTIVE. Cancelled tickets stay cancelled
/// and already active ones are not touched again.
pub fn activatable(tickets: &[Ticket]) -> Vec<Uuid> {
    tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Pending)
        .map(|t| t.id)
        .collect()
}

/// Activates the tickets of a freshly paid invoice.
///
/// Only reached from the reconciliation step that flipped `invoice` to PAID,
/// inside the same unit of work.
pub(crate) async fn issue(
    uow: &mut dyn UnitOfWork,
    invoice: &Invoice,
    payment_id: Uuid,
    at: DateTime<Utc>,
) -> LedgerResult<Vec<Ticket>> {
    if invoice.status != InvoiceStatus::Paid {
        return Err(LedgerError::Invariant(format!(
            "tickets of invoice {} issued while {}",
            invoice.id, invoice.status
        )));
    }

    let tickets = uow.tickets_for_invoice(invoice.id).await?;
    let ids = activatable(&tickets);
    let activated = uow.activate_tickets(&ids, payment_id, at).await?;

    info!(
        invoice_id = %invoice.id,
        payment_id = %payment_id,
        activated = activated.len(),
        untouched = tickets.len() - activated.len(),
        "Tickets issued"
    );
    Ok(activated)
}
