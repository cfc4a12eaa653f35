use chrono::Utc;
use serde::Deserialize;
use tracing::{instrument, warn};

use super::reconcile::{log_settled, settle, PayInstallment, PaymentOutcome};
use super::{Ledger, LedgerError, LedgerResult};
use crate::models::PaymentMethod;

/// Inbound gateway notification that an intent was charged.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfirmation {
    pub intent_id: String,
    pub charge_id: String,
}

impl Ledger {
    /// Maps a gateway confirmation onto its installment and pays it, using
    /// the charge id as the external transaction reference.
    #[instrument(skip(self, confirmation), fields(intent_id = %confirmation.intent_id))]
    pub async fn confirm_gateway_payment(
        &self,
        confirmation: GatewayConfirmation,
    ) -> LedgerResult<PaymentOutcome> {
        let mut uow = self.store.begin().await?;
        let intent = uow
            .lock_intent(&confirmation.intent_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment intent", &confirmation.intent_id))?;

        let request = PayInstallment {
            installment_id: intent.installment_id,
            external_ref: Some(confirmation.charge_id.clone()),
            method: PaymentMethod::Card,
        };
        let now = Utc::now();
        let outcome = match settle(uow.as_mut(), &request, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    intent_id = %confirmation.intent_id,
                    charge_id = %confirmation.charge_id,
                    code = err.code(),
                    "Gateway confirmation rejected"
                );
                return Err(err);
            }
        };
        uow.mark_intent_succeeded(&intent.intent_id, now).await?;
        uow.commit().await?;

        log_settled(&outcome);
        Ok(outcome)
    }
}
