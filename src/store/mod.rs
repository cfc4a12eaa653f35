//! Persistence collaborator for the ledger.
//!
//! Every ledger operation runs inside one [`UnitOfWork`]. A unit is committed
//! explicitly; dropping it without calling [`UnitOfWork::commit`] discards
//! every write made through it.
//!
//! Two implementations are provided:
//!
//! - [`PgStore`]: Postgres via sqlx, row locks for per-invoice and per-event
//!   serialization.
//! - [`MemoryStore`]: in-process tables with the same per-row locks, used by
//!   the test-suite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ledger::LedgerResult;
use crate::models::{
    Event, Installment, Invoice, Payment, PaymentIntent, Person, Ticket, TicketType,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new atomic unit of work.
    async fn begin(&self) -> LedgerResult<Box<dyn UnitOfWork>>;
}

/// Reads and writes scoped to one transaction.
///
/// The `lock_*` reads return the row and hold it against concurrent
/// writers until the unit ends. Conditional writes (`mark_*`, `activate_*`)
/// only touch rows still in their source state and report what they changed.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_event(&mut self, event: &Event) -> LedgerResult<()>;
    async fn find_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>>;
    /// Serializes ticket-type allocation and ticket sales for one event.
    async fn lock_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>>;

    /// Fails with `DuplicateEmail` when the email is taken.
    async fn insert_person(&mut self, person: &Person) -> LedgerResult<()>;
    async fn find_person(&mut self, id: Uuid) -> LedgerResult<Option<Person>>;

    async fn find_ticket_type(&mut self, id: Uuid) -> LedgerResult<Option<TicketType>>;
    /// Ticket types of an event, oldest first.
    async fn ticket_types_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<TicketType>>;
    async fn insert_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()>;
    async fn update_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()>;
    async fn insert_installments(&mut self, installments: &[Installment]) -> LedgerResult<()>;
    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> LedgerResult<()>;
    async fn find_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>>;
    /// Serializes every installment-status change of one invoice.
    async fn lock_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>>;
    /// Installments of an invoice ordered by `installment_number`.
    async fn installments_for_invoice(&mut self, invoice_id: Uuid)
        -> LedgerResult<Vec<Installment>>;
    async fn find_installment(&mut self, id: Uuid) -> LedgerResult<Option<Installment>>;
    /// Payments against any installment of an invoice, oldest first.
    async fn payments_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Payment>>;
    async fn tickets_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Ticket>>;
    /// Non-cancelled tickets of an event, counted per ticket type.
    async fn issued_tickets(&mut self, event_id: Uuid) -> LedgerResult<HashMap<Uuid, i64>>;

    async fn payment_by_reference(&mut self, reference: &str) -> LedgerResult<Option<Payment>>;
    /// Fails with `DuplicateTransaction` when `external_ref` is taken.
    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()>;
    /// PENDING → PAID. `None` when the installment was not PENDING.
    async fn mark_installment_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Installment>>;
    /// OPEN → PAID. `None` when the invoice was not OPEN.
    async fn mark_invoice_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Invoice>>;
    /// PENDING → ACTIVE for the given tickets, stamping the completing
    /// payment. Returns the tickets that changed.
    async fn activate_tickets(
        &mut self,
        ids: &[Uuid],
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> LedgerResult<Vec<Ticket>>;

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> LedgerResult<()>;
    async fn lock_intent(&mut self, intent_id: &str) -> LedgerResult<Option<PaymentIntent>>;
    async fn mark_intent_succeeded(
        &mut self,
        intent_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
