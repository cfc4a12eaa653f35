use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{required, Ledger, LedgerError, LedgerResult};
use crate::models::{Event, Person};

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub capacity: Option<i32>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Emails compare case-insensitively, so they are stored lower-cased.
fn normalize_email(email: &str) -> LedgerResult<String> {
    let email = required("email", email)?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(LedgerError::Validation(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}

impl Ledger {
    pub async fn create_event(&self, request: NewEvent) -> LedgerResult<Event> {
        let title = required("title", &request.title)?;
        if request.capacity.is_some_and(|c| c < 0) {
            return Err(LedgerError::Validation(
                "event capacity must not be negative".to_string(),
            ));
        }
        if request.price.is_sign_negative() {
            return Err(LedgerError::Validation(
                "event price must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title,
            capacity: request.capacity,
            price: request.price,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        uow.insert_event(&event).await?;
        uow.commit().await?;

        info!(event_id = %event.id, capacity = ?event.capacity, "Event created");
        Ok(event)
    }

    pub async fn create_person(&self, request: NewPerson) -> LedgerResult<Person> {
        let name = required("name", &request.name)?;
        let email = normalize_email(&request.email)?;
        let phone = request
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let now = Utc::now();
        let person = Person {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        uow.insert_person(&person).await?;
        uow.commit().await?;

        info!(person_id = %person.id, "Person registered");
        Ok(person)
    }
}
