use std::collections::HashMap;

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::capacity;
use super::partition::{ensure_sum, split_total};
use super::{Ledger, LedgerError, LedgerResult};
use crate::models::{
    Installment, InstallmentDetail, InstallmentStatus, Invoice, InvoiceDetail, InvoiceStatus,
    Payment, Ticket, TicketStatus,
};

pub const MAX_INSTALLMENTS: u32 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub ticket_type_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub person_id: Uuid,
    pub event_id: Uuid,
    pub total: Decimal,
    pub installments: u32,
    /// Due date of the first installment; later ones follow monthly.
    /// Defaults to today.
    #[serde(default)]
    pub first_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Ledger {
    /// Persists an OPEN invoice, its PENDING installments and one PENDING
    /// ticket per purchased unit, all in one unit of work.
    ///
    /// The event row is locked while the new tickets are checked against the
    /// ticket-type and event capacities, so concurrent sales of one event
    /// cannot oversell it.
    pub async fn create_invoice(&self, request: NewInvoice) -> LedgerResult<InvoiceDetail> {
        if request.installments > MAX_INSTALLMENTS {
            return Err(LedgerError::Validation(format!(
                "at most {MAX_INSTALLMENTS} installments are allowed"
            )));
        }
        if request.items.iter().any(|item| item.quantity == 0) {
            return Err(LedgerError::Validation(
                "line item quantity must be at least 1".to_string(),
            ));
        }
        let amounts = split_total(request.total, request.installments)?;
        let first_due = request
            .first_due_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut uow = self.store.begin().await?;
        if uow.find_person(request.person_id).await?.is_none() {
            return Err(LedgerError::not_found("person", request.person_id));
        }
        let event = uow
            .lock_event(request.event_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("event", request.event_id))?;
        let ticket_types = uow.ticket_types_for_event(event.id).await?;

        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            person_id: request.person_id,
            event_id: request.event_id,
            total: request.total,
            status: InvoiceStatus::Open,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut installments = Vec::with_capacity(amounts.len());
        for (index, amount) in amounts.into_iter().enumerate() {
            let due_date = first_due
                .checked_add_months(Months::new(index as u32))
                .ok_or_else(|| LedgerError::Validation("due date is out of range".to_string()))?;
            installments.push(Installment {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                installment_number: index as i32 + 1,
                amount,
                due_date,
                status: InstallmentStatus::Pending,
                paid_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        if let Err(allocated) = ensure_sum(invoice.total, installments.iter().map(|i| i.amount)) {
            return Err(LedgerError::InconsistentTotals {
                invoice_id: invoice.id,
                total: invoice.total,
                allocated,
            });
        }

        let mut requested: HashMap<Uuid, i64> = HashMap::new();
        for item in &request.items {
            if !ticket_types.iter().any(|t| t.id == item.ticket_type_id) {
                return Err(match uow.find_ticket_type(item.ticket_type_id).await? {
                    Some(foreign) => LedgerError::Validation(format!(
                        "ticket type {} does not belong to event {}",
                        foreign.id, event.id
                    )),
                    None => LedgerError::not_found("ticket type", item.ticket_type_id),
                });
            }
            *requested.entry(item.ticket_type_id).or_insert(0) += i64::from(item.quantity);
        }

        let issued = uow.issued_tickets(event.id).await?;
        if let Err(err) = capacity::admit_sale(&event, &ticket_types, &issued, &requested) {
            warn!(
                event_id = %event.id,
                person_id = %request.person_id,
                error = %err,
                "Invoice rejected"
            );
            return Err(err);
        }

        let mut tickets = Vec::new();
        for item in &request.items {
            tickets.extend((0..item.quantity).map(|_| Ticket {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                ticket_type_id: item.ticket_type_id,
                payment_id: None,
                status: TicketStatus::Pending,
                qr_code: format!("TKT-{}", Uuid::new_v4().simple()),
                created_at: now,
                updated_at: now,
            }));
        }

        uow.insert_invoice(&invoice).await?;
        uow.insert_installments(&installments).await?;
        uow.insert_tickets(&tickets).await?;
        uow.commit().await?;

        info!(
            invoice_id = %invoice.id,
            person_id = %invoice.person_id,
            event_id = %invoice.event_id,
            total = %invoice.total,
            installments = installments.len(),
            tickets = tickets.len(),
            "Invoice created"
        );

        Ok(assemble(invoice, installments, Vec::new(), tickets))
    }

    pub async fn get_invoice(&self, id: Uuid) -> LedgerResult<InvoiceDetail> {
        let mut uow = self.store.begin().await?;
        let invoice = uow
            .find_invoice(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", id))?;
        let installments = uow.installments_for_invoice(id).await?;
        if installments.is_empty() {
            return Err(LedgerError::Invariant(format!(
                "invoice {id} has no installments"
            )));
        }
        let payments = uow.payments_for_invoice(id).await?;
        let tickets = uow.tickets_for_invoice(id).await?;

        Ok(assemble(invoice, installments, payments, tickets))
    }
}

/// Nests each payment under its installment, keeping both orders.
fn assemble(
    invoice: Invoice,
    installments: Vec<Installment>,
    payments: Vec<Payment>,
    tickets: Vec<Ticket>,
) -> InvoiceDetail {
    let installments = installments
        .into_iter()
        .map(|installment| {
            let payments = payments
                .iter()
                .filter(|p| p.installment_id == installment.id)
                .cloned()
                .collect();
            InstallmentDetail {
                installment,
                payments,
            }
        })
        .collect();

    InvoiceDetail {
        invoice,
        installments,
        tickets,
    }
}
