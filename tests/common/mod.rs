#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use ticket_ledger::ledger::{
    Ledger, LineItem, NewEvent, NewInvoice, NewPerson, TicketTypeRequest,
    UnboundedCapacityPolicy,
};
use ticket_ledger::models::{Event, InvoiceDetail, Person, TicketType};
use ticket_ledger::store::MemoryStore;
use uuid::Uuid;

pub struct Fixture {
    pub store: MemoryStore,
    pub ledger: Ledger,
    pub event: Event,
    pub person: Person,
    pub ticket_type: TicketType,
}

pub fn ledger(store: &MemoryStore, policy: UnboundedCapacityPolicy) -> Ledger {
    Ledger::new(Arc::new(store.clone()), policy)
}

pub async fn event(ledger: &Ledger, capacity: Option<i32>) -> Event {
    ledger
        .create_event(NewEvent {
            title: "RustConf".into(),
            capacity,
            price: Decimal::from(300),
        })
        .await
        .expect("event")
}

pub async fn person(ledger: &Ledger) -> Person {
    let tag = Uuid::new_v4().simple().to_string();
    ledger
        .create_person(NewPerson {
            name: "Ada Lovelace".into(),
            email: format!("ada+{tag}@example.com"),
            phone: None,
        })
        .await
        .expect("person")
}

pub async fn ticket_type(ledger: &Ledger, event_id: Uuid, capacity: Option<i32>) -> TicketType {
    ledger
        .create_or_update_ticket_type(
            event_id,
            None,
            TicketTypeRequest {
                name: "General admission".into(),
                price: Decimal::from(100),
                capacity,
            },
        )
        .await
        .expect("ticket type")
}

pub async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let ledger = ledger(&store, UnboundedCapacityPolicy::Exclude);
    let event = event(&ledger, Some(500)).await;
    let person = person(&ledger).await;
    let ticket_type = ticket_type(&ledger, event.id, Some(200)).await;
    Fixture {
        store,
        ledger,
        event,
        person,
        ticket_type,
    }
}

impl Fixture {
    pub fn invoice_request(&self, total: Decimal, installments: u32, seats: u32) -> NewInvoice {
        NewInvoice {
            person_id: self.person.id,
            event_id: self.event.id,
            total,
            installments,
            first_due_date: None,
            items: vec![LineItem {
                ticket_type_id: self.ticket_type.id,
                quantity: seats,
            }],
        }
    }

    pub async fn invoice(&self, total: i64, installments: u32, seats: u32) -> InvoiceDetail {
        self.ledger
            .create_invoice(self.invoice_request(Decimal::from(total), installments, seats))
            .await
            .expect("invoice")
    }
}
