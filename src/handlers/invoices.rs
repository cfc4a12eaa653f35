use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::ledger::NewInvoice;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<NewInvoice>,
) -> Result<Response, AppError> {
    let invoice = state.ledger.create_invoice(request).await?;
    Ok(created(invoice, "Invoice created"))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let invoice = state.ledger.get_invoice(invoice_id).await?;
    Ok(success(invoice, "Invoice fetched"))
}
