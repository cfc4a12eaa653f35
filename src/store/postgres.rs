use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{
    Event, Installment, InstallmentStatus, Invoice, InvoiceStatus, Payment, PaymentIntent,
    PaymentStatus, Person, Ticket, TicketStatus, TicketType,
};

const EVENT_COLUMNS: &str = "id, title, capacity, price, created_at, updated_at";
const PERSON_COLUMNS: &str = "id, name, email, phone, created_at, updated_at";
const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, price, capacity, created_at, updated_at";
const INVOICE_COLUMNS: &str =
    "id, person_id, event_id, total, status, paid_at, created_at, updated_at";
const INSTALLMENT_COLUMNS: &str =
    "id, invoice_id, installment_number, amount, due_date, status, paid_at, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, installment_id, amount, method, status, external_ref, paid_at, created_at";
const TICKET_COLUMNS: &str =
    "id, invoice_id, ticket_type_id, payment_id, status, qr_code, created_at, updated_at";
const INTENT_COLUMNS: &str =
    "intent_id, installment_id, amount, currency, status, created_at, updated_at";

const PEOPLE_EMAIL_KEY: &str = "people_email_key";
const PAYMENTS_EXTERNAL_REF_KEY: &str = "payments_external_ref_key";

/// Postgres-backed store sharing one process-wide pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> LedgerResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Serialization failures and deadlocks surface as `ConcurrencyConflict`;
/// everything else is a storage error.
fn map_db_error(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return LedgerError::ConcurrencyConflict;
        }
    }
    LedgerError::Storage(err)
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// Rolls back on drop unless committed.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_event(&mut self, event: &Event) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO events (id, title, capacity, price, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(event.capacity)
        .bind(event.price)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn find_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn lock_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>> {
        // NO KEY UPDATE keeps foreign-key inserts referencing the event unblocked.
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR NO KEY UPDATE");
        sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn insert_person(&mut self, person: &Person) -> LedgerResult<()> {
        let result = sqlx::query(
            "INSERT INTO people (id, name, email, phone, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(person.id)
        .bind(&person.name)
        .bind(&person.email)
        .bind(&person.phone)
        .bind(person.created_at)
        .bind(person.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if violates(&err, PEOPLE_EMAIL_KEY) => {
                Err(LedgerError::DuplicateEmail(person.email.clone()))
            }
            Err(err) => Err(map_db_error(err)),
        }
    }

    async fn find_person(&mut self, id: Uuid) -> LedgerResult<Option<Person>> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = $1");
        sqlx::query_as::<_, Person>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn find_ticket_type(&mut self, id: Uuid) -> LedgerResult<Option<TicketType>> {
        let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
        sqlx::query_as::<_, TicketType>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn ticket_types_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<TicketType>> {
        let sql = format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types
             WHERE event_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, TicketType>(&sql)
            .bind(event_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn insert_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO ticket_types (id, event_id, name, price, capacity, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(ticket_type.id)
        .bind(ticket_type.event_id)
        .bind(&ticket_type.name)
        .bind(ticket_type.price)
        .bind(ticket_type.capacity)
        .bind(ticket_type.created_at)
        .bind(ticket_type.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn update_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE ticket_types SET name = $2, price = $3, capacity = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(ticket_type.id)
        .bind(&ticket_type.name)
        .bind(ticket_type.price)
        .bind(ticket_type.capacity)
        .bind(ticket_type.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("ticket type", ticket_type.id));
        }
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO invoices (id, person_id, event_id, total, status, paid_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(invoice.id)
        .bind(invoice.person_id)
        .bind(invoice.event_id)
        .bind(invoice.total)
        .bind(invoice.status)
        .bind(invoice.paid_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_installments(&mut self, installments: &[Installment]) -> LedgerResult<()> {
        for installment in installments {
            sqlx::query(
                "INSERT INTO installments
                 (id, invoice_id, installment_number, amount, due_date, status, paid_at, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(installment.id)
            .bind(installment.invoice_id)
            .bind(installment.installment_number)
            .bind(installment.amount)
            .bind(installment.due_date)
            .bind(installment.status)
            .bind(installment.paid_at)
            .bind(installment.created_at)
            .bind(installment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> LedgerResult<()> {
        for ticket in tickets {
            sqlx::query(
                "INSERT INTO tickets
                 (id, invoice_id, ticket_type_id, payment_id, status, qr_code, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(ticket.id)
            .bind(ticket.invoice_id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.payment_id)
            .bind(ticket.status)
            .bind(&ticket.qr_code)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }
        Ok(())
    }

    async fn find_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn lock_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn installments_for_invoice(
        &mut self,
        invoice_id: Uuid,
    ) -> LedgerResult<Vec<Installment>> {
        let sql = format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installments
             WHERE invoice_id = $1 ORDER BY installment_number"
        );
        sqlx::query_as::<_, Installment>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn find_installment(&mut self, id: Uuid) -> LedgerResult<Option<Installment>> {
        let sql = format!("SELECT {INSTALLMENT_COLUMNS} FROM installments WHERE id = $1");
        sqlx::query_as::<_, Installment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn payments_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE installment_id IN (SELECT id FROM installments WHERE invoice_id = $1)
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn tickets_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE invoice_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Ticket>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn issued_tickets(&mut self, event_id: Uuid) -> LedgerResult<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT t.ticket_type_id, COUNT(*) FROM tickets t
             JOIN ticket_types tt ON tt.id = t.ticket_type_id
             WHERE tt.event_id = $1 AND t.status <> $2
             GROUP BY t.ticket_type_id",
        )
        .bind(event_id)
        .bind(TicketStatus::Cancelled)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn payment_by_reference(&mut self, reference: &str) -> LedgerResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_ref = $1");
        sqlx::query_as::<_, Payment>(&sql)
            .bind(reference)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()> {
        let result = sqlx::query(
            "INSERT INTO payments
             (id, installment_id, amount, method, status, external_ref, paid_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.installment_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(payment.status)
        .bind(&payment.external_ref)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if violates(&err, PAYMENTS_EXTERNAL_REF_KEY) => {
                Err(LedgerError::DuplicateTransaction {
                    reference: payment.external_ref.clone().unwrap_or_default(),
                })
            }
            Err(err) => Err(map_db_error(err)),
        }
    }

    async fn mark_installment_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Installment>> {
        let sql = format!(
            "UPDATE installments SET status = $2, paid_at = $3, updated_at = $3
             WHERE id = $1 AND status = $4
             RETURNING {INSTALLMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Installment>(&sql)
            .bind(id)
            .bind(InstallmentStatus::Paid)
            .bind(paid_at)
            .bind(InstallmentStatus::Pending)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn mark_invoice_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Invoice>> {
        let sql = format!(
            "UPDATE invoices SET status = $2, paid_at = $3, updated_at = $3
             WHERE id = $1 AND status = $4
             RETURNING {INVOICE_COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .bind(InvoiceStatus::Paid)
            .bind(paid_at)
            .bind(InvoiceStatus::Open)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn activate_tickets(
        &mut self,
        ids: &[Uuid],
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> LedgerResult<Vec<Ticket>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "UPDATE tickets SET status = $2, payment_id = $3, updated_at = $4
             WHERE id = ANY($1) AND status = $5
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&sql)
            .bind(ids)
            .bind(TicketStatus::Active)
            .bind(payment_id)
            .bind(at)
            .bind(TicketStatus::Pending)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO payment_intents
             (intent_id, installment_id, amount, currency, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&intent.intent_id)
        .bind(intent.installment_id)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(intent.status)
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn lock_intent(&mut self, intent_id: &str) -> LedgerResult<Option<PaymentIntent>> {
        let sql = format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE intent_id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, PaymentIntent>(&sql)
            .bind(intent_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn mark_intent_succeeded(
        &mut self,
        intent_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        sqlx::query("UPDATE payment_intents SET status = $2, updated_at = $3 WHERE intent_id = $1")
            .bind(intent_id)
            .bind(PaymentStatus::Succeeded)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await.map_err(map_db_error)
    }
}
