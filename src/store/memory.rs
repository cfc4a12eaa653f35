use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{
    Event, Installment, InstallmentStatus, Invoice, InvoiceStatus, Payment, PaymentIntent,
    PaymentStatus, Person, Ticket, TicketStatus, TicketType,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    people: HashMap<Uuid, Person>,
    ticket_types: Vec<TicketType>,
    invoices: HashMap<Uuid, Invoice>,
    installments: Vec<Installment>,
    payments: Vec<Payment>,
    tickets: Vec<Ticket>,
    intents: HashMap<String, PaymentIntent>,
}

impl Tables {
    fn insert_person(&mut self, person: &Person) -> LedgerResult<()> {
        if self.people.values().any(|p| p.email == person.email) {
            return Err(LedgerError::DuplicateEmail(person.email.clone()));
        }
        self.people.insert(person.id, person.clone());
        Ok(())
    }

    fn update_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()> {
        let row = self
            .ticket_types
            .iter_mut()
            .find(|t| t.id == ticket_type.id)
            .ok_or_else(|| LedgerError::not_found("ticket type", ticket_type.id))?;
        *row = ticket_type.clone();
        Ok(())
    }

    fn payment_by_reference(&self, reference: &str) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.external_ref.as_deref() == Some(reference))
    }

    fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()> {
        if let Some(reference) = payment.external_ref.as_deref() {
            if self.payment_by_reference(reference).is_some() {
                return Err(LedgerError::DuplicateTransaction {
                    reference: reference.to_string(),
                });
            }
        }
        self.payments.push(payment.clone());
        Ok(())
    }

    fn mark_installment_paid(&mut self, id: Uuid, paid_at: DateTime<Utc>) -> Option<Installment> {
        let row = self
            .installments
            .iter_mut()
            .find(|i| i.id == id && i.status == InstallmentStatus::Pending)?;
        row.status = InstallmentStatus::Paid;
        row.paid_at = Some(paid_at);
        row.updated_at = paid_at;
        Some(row.clone())
    }

    fn mark_invoice_paid(&mut self, id: Uuid, paid_at: DateTime<Utc>) -> Option<Invoice> {
        let row = self
            .invoices
            .get_mut(&id)
            .filter(|inv| inv.status == InvoiceStatus::Open)?;
        row.status = InvoiceStatus::Paid;
        row.paid_at = Some(paid_at);
        row.updated_at = paid_at;
        Some(row.clone())
    }

    fn activate_tickets(&mut self, ids: &[Uuid], payment_id: Uuid, at: DateTime<Utc>) -> Vec<Ticket> {
        let mut changed = Vec::new();
        for ticket in self
            .tickets
            .iter_mut()
            .filter(|t| ids.contains(&t.id) && t.status == TicketStatus::Pending)
        {
            ticket.status = TicketStatus::Active;
            ticket.payment_id = Some(payment_id);
            ticket.updated_at = at;
            changed.push(ticket.clone());
        }
        changed
    }
}

type Write = Box<dyn Fn(&mut Tables) -> LedgerResult<()> + Send + Sync>;

/// In-process store for tests.
///
/// Units run concurrently and see committed data plus their own writes.
/// `lock_*` calls take a per-row lock held until the unit is committed or
/// dropped, mirroring the row locks of [`PgStore`](super::PgStore). Writes
/// are journaled and replayed onto the shared tables on commit, where
/// unique keys are checked again.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payment rows recorded so far.
    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }

    pub async fn invoice_count(&self) -> usize {
        self.tables.lock().await.invoices.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            journal: Vec::new(),
            held: HashMap::new(),
        }))
    }
}

pub struct MemoryUnitOfWork {
    store: MemoryStore,
    journal: Vec<Write>,
    held: HashMap<String, OwnedMutexGuard<()>>,
}

impl MemoryUnitOfWork {
    /// Committed tables with this unit's journal applied.
    async fn snapshot(&self) -> LedgerResult<Tables> {
        // Let concurrent units run between statements.
        tokio::task::yield_now().await;
        let mut tables = self.store.tables.lock().await.clone();
        for write in &self.journal {
            write(&mut tables)?;
        }
        Ok(tables)
    }

    async fn read<T>(&self, query: impl FnOnce(&Tables) -> T + Send) -> LedgerResult<T> {
        let tables = self.snapshot().await?;
        Ok(query(&tables))
    }

    async fn write<T, F>(&mut self, apply: F) -> LedgerResult<T>
    where
        F: Fn(&mut Tables) -> LedgerResult<T> + Send + Sync + 'static,
        T: 'static,
    {
        let mut tables = self.snapshot().await?;
        let output = apply(&mut tables)?;
        self.journal
            .push(Box::new(move |tables: &mut Tables| apply(tables).map(|_| ())));
        Ok(output)
    }

    async fn lock_row(&mut self, key: String) {
        if self.held.contains_key(&key) {
            return;
        }
        let row = {
            let mut locks = self.store.row_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = row.lock_owned().await;
        self.held.insert(key, guard);
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_event(&mut self, event: &Event) -> LedgerResult<()> {
        let event = event.clone();
        self.write(move |t| {
            t.events.insert(event.id, event.clone());
            Ok(())
        })
        .await
    }

    async fn find_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>> {
        self.read(|t| t.events.get(&id).cloned()).await
    }

    async fn lock_event(&mut self, id: Uuid) -> LedgerResult<Option<Event>> {
        self.lock_row(format!("event:{id}")).await;
        self.find_event(id).await
    }

    async fn insert_person(&mut self, person: &Person) -> LedgerResult<()> {
        let person = person.clone();
        self.write(move |t| t.insert_person(&person)).await
    }

    async fn find_person(&mut self, id: Uuid) -> LedgerResult<Option<Person>> {
        self.read(|t| t.people.get(&id).cloned()).await
    }

    async fn find_ticket_type(&mut self, id: Uuid) -> LedgerResult<Option<TicketType>> {
        self.read(|t| t.ticket_types.iter().find(|tt| tt.id == id).cloned())
            .await
    }

    async fn ticket_types_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<TicketType>> {
        self.read(|t| {
            t.ticket_types
                .iter()
                .filter(|tt| tt.event_id == event_id)
                .cloned()
                .collect()
        })
        .await
    }

    async fn insert_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()> {
        let ticket_type = ticket_type.clone();
        self.write(move |t| {
            t.ticket_types.push(ticket_type.clone());
            Ok(())
        })
        .await
    }

    async fn update_ticket_type(&mut self, ticket_type: &TicketType) -> LedgerResult<()> {
        let ticket_type = ticket_type.clone();
        self.write(move |t| t.update_ticket_type(&ticket_type)).await
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        let invoice = invoice.clone();
        self.write(move |t| {
            t.invoices.insert(invoice.id, invoice.clone());
            Ok(())
        })
        .await
    }

    async fn insert_installments(&mut self, installments: &[Installment]) -> LedgerResult<()> {
        let installments = installments.to_vec();
        self.write(move |t| {
            t.installments.extend_from_slice(&installments);
            Ok(())
        })
        .await
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> LedgerResult<()> {
        let tickets = tickets.to_vec();
        self.write(move |t| {
            t.tickets.extend_from_slice(&tickets);
            Ok(())
        })
        .await
    }

    async fn find_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        self.read(|t| t.invoices.get(&id).cloned()).await
    }

    async fn lock_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        self.lock_row(format!("invoice:{id}")).await;
        self.find_invoice(id).await
    }

    async fn installments_for_invoice(
        &mut self,
        invoice_id: Uuid,
    ) -> LedgerResult<Vec<Installment>> {
        self.read(|t| {
            let mut rows: Vec<Installment> = t
                .installments
                .iter()
                .filter(|i| i.invoice_id == invoice_id)
                .cloned()
                .collect();
            rows.sort_by_key(|i| i.installment_number);
            rows
        })
        .await
    }

    async fn find_installment(&mut self, id: Uuid) -> LedgerResult<Option<Installment>> {
        self.read(|t| t.installments.iter().find(|i| i.id == id).cloned())
            .await
    }

    async fn payments_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        self.read(|t| {
            let installment_ids: Vec<Uuid> = t
                .installments
                .iter()
                .filter(|i| i.invoice_id == invoice_id)
                .map(|i| i.id)
                .collect();
            let mut rows: Vec<Payment> = t
                .payments
                .iter()
                .filter(|p| installment_ids.contains(&p.installment_id))
                .cloned()
                .collect();
            rows.sort_by_key(|p| p.created_at);
            rows
        })
        .await
    }

    async fn tickets_for_invoice(&mut self, invoice_id: Uuid) -> LedgerResult<Vec<Ticket>> {
        self.read(|t| {
            t.tickets
                .iter()
                .filter(|ticket| ticket.invoice_id == invoice_id)
                .cloned()
                .collect()
        })
        .await
    }

    async fn issued_tickets(&mut self, event_id: Uuid) -> LedgerResult<HashMap<Uuid, i64>> {
        self.read(|t| {
            let mut counts = HashMap::new();
            for ticket in t.tickets.iter().filter(|ticket| ticket.status != TicketStatus::Cancelled) {
                let of_event = t
                    .ticket_types
                    .iter()
                    .any(|tt| tt.id == ticket.ticket_type_id && tt.event_id == event_id);
                if of_event {
                    *counts.entry(ticket.ticket_type_id).or_insert(0) += 1;
                }
            }
            counts
        })
        .await
    }

    async fn payment_by_reference(&mut self, reference: &str) -> LedgerResult<Option<Payment>> {
        self.read(|t| t.payment_by_reference(reference).cloned())
            .await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()> {
        let payment = payment.clone();
        self.write(move |t| t.insert_payment(&payment)).await
    }

    async fn mark_installment_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Installment>> {
        self.write(move |t| Ok(t.mark_installment_paid(id, paid_at)))
            .await
    }

    async fn mark_invoice_paid(
        &mut self,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Invoice>> {
        self.write(move |t| Ok(t.mark_invoice_paid(id, paid_at)))
            .await
    }

    async fn activate_tickets(
        &mut self,
        ids: &[Uuid],
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> LedgerResult<Vec<Ticket>> {
        let ids = ids.to_vec();
        self.write(move |t| Ok(t.activate_tickets(&ids, payment_id, at)))
            .await
    }

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> LedgerResult<()> {
        let intent = intent.clone();
        self.write(move |t| {
            t.intents.insert(intent.intent_id.clone(), intent.clone());
            Ok(())
        })
        .await
    }

    async fn lock_intent(&mut self, intent_id: &str) -> LedgerResult<Option<PaymentIntent>> {
        self.lock_row(format!("intent:{intent_id}")).await;
        self.read(|t| t.intents.get(intent_id).cloned()).await
    }

    async fn mark_intent_succeeded(
        &mut self,
        intent_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let intent_id = intent_id.to_string();
        self.write(move |t| {
            if let Some(intent) = t.intents.get_mut(&intent_id) {
                intent.status = PaymentStatus::Succeeded;
                intent.updated_at = at;
            }
            Ok(())
        })
        .await
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryUnitOfWork {
            store,
            journal,
            held,
        } = *self;

        let mut tables = store.tables.lock().await;
        let mut next = tables.clone();
        for write in &journal {
            write(&mut next)?;
        }
        *tables = next;
        drop(tables);
        // Row locks are released only once the writes are visible.
        drop(held);
        Ok(())
    }
}
