use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::ledger::{GatewayConfirmation, PayInstallment};
use crate::models::PaymentMethod;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub method: PaymentMethod,
}

pub async fn pay_installment(
    State(state): State<AppState>,
    Path(installment_id): Path<Uuid>,
    Json(body): Json<PaymentBody>,
) -> Result<Response, AppError> {
    let outcome = state
        .ledger
        .pay_installment(PayInstallment {
            installment_id,
            external_ref: body.external_ref,
            method: body.method,
        })
        .await?;
    Ok(created(outcome, "Installment paid"))
}

pub async fn start_checkout(
    State(state): State<AppState>,
    Path(installment_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let session = state.checkout.start(installment_id).await?;
    Ok(created(session, "Checkout started"))
}

pub async fn gateway_confirmation(
    State(state): State<AppState>,
    Json(confirmation): Json<GatewayConfirmation>,
) -> Result<Response, AppError> {
    let outcome = state.ledger.confirm_gateway_payment(confirmation).await?;
    Ok(success(outcome, "Confirmation applied"))
}
