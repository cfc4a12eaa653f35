use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::ledger::{NewEvent, NewPerson, TicketTypeRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<NewEvent>,
) -> Result<Response, AppError> {
    let event = state.ledger.create_event(request).await?;
    Ok(created(event, "Event created"))
}

pub async fn create_person(
    State(state): State<AppState>,
    Json(request): Json<NewPerson>,
) -> Result<Response, AppError> {
    let person = state.ledger.create_person(request).await?;
    Ok(created(person, "Person registered"))
}

pub async fn list_ticket_types(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket_types = state.ledger.list_ticket_types(event_id).await?;
    Ok(success(ticket_types, "Ticket types fetched"))
}

pub async fn create_ticket_type(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<TicketTypeRequest>,
) -> Result<Response, AppError> {
    let ticket_type = state
        .ledger
        .create_or_update_ticket_type(event_id, None, request)
        .await?;
    Ok(created(ticket_type, "Ticket type created"))
}

pub async fn update_ticket_type(
    State(state): State<AppState>,
    Path((event_id, ticket_type_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<TicketTypeRequest>,
) -> Result<Response, AppError> {
    let ticket_type = state
        .ledger
        .create_or_update_ticket_type(event_id, Some(ticket_type_id), request)
        .await?;
    Ok(success(ticket_type, "Ticket type updated"))
}
