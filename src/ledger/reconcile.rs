use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::issuer;
use super::partition::ensure_sum;
use super::{Ledger, LedgerError, LedgerResult};
use crate::models::{
    Installment, Invoice, InvoiceStatus, Payment, PaymentMethod, PaymentStatus, Ticket,
};
use crate::store::UnitOfWork;

#[derive(Debug, Clone, Deserialize)]
pub struct PayInstallment {
    pub installment_id: Uuid,
    /// Gateway confirmation id, used as the idempotency key.
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub installment: Installment,
    pub payment: Payment,
    pub all_paid: bool,
    /// The invoice after it flipped to PAID; `None` while installments remain.
    pub invoice: Option<Invoice>,
    pub activated_tickets: Vec<Ticket>,
}

impl Ledger {
    /// Records a confirmed payment against one installment.
    ///
    /// When that leaves every installment of the invoice PAID, the invoice is
    /// marked PAID and its tickets are activated before the unit commits.
    #[instrument(skip(self, request), fields(installment_id = %request.installment_id))]
    pub async fn pay_installment(&self, request: PayInstallment) -> LedgerResult<PaymentOutcome> {
        let mut uow = self.store.begin().await?;
        let outcome = match settle(uow.as_mut(), &request, Utc::now()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_rejection(&request, &err);
                return Err(err);
            }
        };
        uow.commit().await?;

        log_settled(&outcome);
        Ok(outcome)
    }
}

/// Applies one payment inside the caller's unit of work.
///
/// The parent invoice row is locked before the installment status is trusted
/// and before siblings are read, so two payments on one invoice can never
/// both conclude that the other installment is still open.
pub(crate) async fn settle(
    uow: &mut dyn UnitOfWork,
    request: &PayInstallment,
    now: DateTime<Utc>,
) -> LedgerResult<PaymentOutcome> {
    let external_ref = match request.external_ref.as_deref().map(str::trim) {
        Some("") => {
            return Err(LedgerError::Validation(
                "external transaction reference must not be blank".to_string(),
            ))
        }
        other => other.map(str::to_string),
    };

    let installment_id = request.installment_id;
    let invoice_id = uow
        .find_installment(installment_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("installment", installment_id))?
        .invoice_id;

    let invoice = uow.lock_invoice(invoice_id).await?.ok_or_else(|| {
        LedgerError::Invariant(format!(
            "installment {installment_id} references missing invoice {invoice_id}"
        ))
    })?;
    // Re-read under the invoice lock.
    let installment = uow
        .find_installment(installment_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("installment", installment_id))?;

    if installment.is_paid() {
        return Err(LedgerError::AlreadyPaid { installment_id });
    }
    if invoice.status != InvoiceStatus::Open {
        return Err(LedgerError::InvoiceClosed {
            invoice_id,
            status: invoice.status,
        });
    }
    if let Some(reference) = external_ref.as_deref() {
        if uow.payment_by_reference(reference).await?.is_some() {
            return Err(LedgerError::DuplicateTransaction {
                reference: reference.to_string(),
            });
        }
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        installment_id,
        amount: installment.amount,
        method: request.method,
        status: PaymentStatus::Succeeded,
        external_ref,
        paid_at: now,
        created_at: now,
    };
    uow.insert_payment(&payment).await?;

    let installment = uow
        .mark_installment_paid(installment_id, now)
        .await?
        .ok_or(LedgerError::AlreadyPaid { installment_id })?;

    let siblings = uow.installments_for_invoice(invoice_id).await?;
    let all_paid = all_installments_paid(&invoice, &siblings)?;

    let (invoice, activated_tickets) = if all_paid {
        let paid = uow.mark_invoice_paid(invoice_id, now).await?.ok_or_else(|| {
            LedgerError::Invariant(format!("invoice {invoice_id} left OPEN while locked"))
        })?;
        let activated = issuer::issue(uow, &paid, payment.id, now).await?;
        (Some(paid), activated)
    } else {
        (None, Vec::new())
    };

    Ok(PaymentOutcome {
        installment,
        payment,
        all_paid,
        invoice,
        activated_tickets,
    })
}

/// Recomputed from the full installment set on every payment.
fn all_installments_paid(invoice: &Invoice, installments: &[Installment]) -> LedgerResult<bool> {
    if installments.is_empty() {
        return Err(LedgerError::Invariant(format!(
            "invoice {} has no installments",
            invoice.id
        )));
    }
    if let Err(allocated) = ensure_sum(invoice.total, installments.iter().map(|i| i.amount)) {
        return Err(LedgerError::InconsistentTotals {
            invoice_id: invoice.id,
            total: invoice.total,
            allocated,
        });
    }
    Ok(installments.iter().all(Installment::is_paid))
}

fn log_rejection(request: &PayInstallment, err: &LedgerError) {
    if err.is_fatal() {
        tracing::error!(
            installment_id = %request.installment_id,
            error = ?err,
            "Installment payment aborted"
        );
    } else {
        warn!(
            installment_id = %request.installment_id,
            external_ref = ?request.external_ref,
            code = err.code(),
            "Installment payment rejected"
        );
    }
}

pub(crate) fn log_settled(outcome: &PaymentOutcome) {
    info!(
        installment_id = %outcome.installment.id,
        invoice_id = %outcome.installment.invoice_id,
        payment_id = %outcome.payment.id,
        external_ref = ?outcome.payment.external_ref,
        all_paid = outcome.all_paid,
        activated_tickets = outcome.activated_tickets.len(),
        "Installment paid"
    );
}
