use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::capacity;
use super::{required, Ledger, LedgerError, LedgerResult};
use crate::models::TicketType;

#[derive(Debug, Clone, Deserialize)]
pub struct TicketTypeRequest {
    pub name: String,
    pub price: Decimal,
    /// `None` leaves the ticket type unbounded.
    #[serde(default)]
    pub capacity: Option<i32>,
}

impl Ledger {
    /// Creates a ticket type, or replaces the name, price and capacity of
    /// `ticket_type_id` when given.
    ///
    /// The event row is locked before the existing allocations are read, so
    /// concurrent calls for one event are decided one after another.
    pub async fn create_or_update_ticket_type(
        &self,
        event_id: Uuid,
        ticket_type_id: Option<Uuid>,
        request: TicketTypeRequest,
    ) -> LedgerResult<TicketType> {
        let name = required("name", &request.name)?;
        if request.price.is_sign_negative() {
            return Err(LedgerError::Validation(
                "ticket price must not be negative".to_string(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let event = uow
            .lock_event(event_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("event", event_id))?;

        let (current, others): (Vec<TicketType>, Vec<TicketType>) = uow
            .ticket_types_for_event(event_id)
            .await?
            .into_iter()
            .partition(|t| Some(t.id) == ticket_type_id);

        let current = match ticket_type_id {
            Some(id) => Some(
                current
                    .into_iter()
                    .next()
                    .ok_or_else(|| LedgerError::not_found("ticket type", id))?,
            ),
            None => None,
        };

        if let Err(err) = capacity::admit(&event, &others, request.capacity, self.policy) {
            warn!(
                event_id = %event_id,
                capacity = ?request.capacity,
                error = %err,
                "Ticket type rejected"
            );
            return Err(err);
        }

        let now = Utc::now();
        let ticket_type = match current {
            Some(existing) => {
                let issued = uow.issued_tickets(event_id).await?;
                let sold = issued.get(&existing.id).copied().unwrap_or(0);
                if let Err(err) = capacity::ensure_floor(&existing, request.capacity, sold) {
                    warn!(
                        event_id = %event_id,
                        ticket_type_id = %existing.id,
                        capacity = ?request.capacity,
                        sold,
                        "Ticket type capacity below tickets sold"
                    );
                    return Err(err);
                }
                let updated = TicketType {
                    name,
                    price: request.price,
                    capacity: request.capacity,
                    updated_at: now,
                    ..existing
                };
                uow.update_ticket_type(&updated).await?;
                updated
            }
            None => {
                let created = TicketType {
                    id: Uuid::new_v4(),
                    event_id,
                    name,
                    price: request.price,
                    capacity: request.capacity,
                    created_at: now,
                    updated_at: now,
                };
                uow.insert_ticket_type(&created).await?;
                created
            }
        };
        uow.commit().await?;

        info!(
            event_id = %event_id,
            ticket_type_id = %ticket_type.id,
            capacity = ?ticket_type.capacity,
            updated = ticket_type_id.is_some(),
            "Ticket type saved"
        );
        Ok(ticket_type)
    }

    pub async fn list_ticket_types(&self, event_id: Uuid) -> LedgerResult<Vec<TicketType>> {
        let mut uow = self.store.begin().await?;
        if uow.find_event(event_id).await?.is_none() {
            return Err(LedgerError::not_found("event", event_id));
        }
        uow.ticket_types_for_event(event_id).await
    }
}
