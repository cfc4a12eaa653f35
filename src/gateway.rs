//! Payment-gateway collaborator.
//!
//! The ledger never talks to the gateway. [`CheckoutService`] opens an intent
//! for an installment and remembers which installment it belongs to; the
//! gateway's later confirmation is fed to
//! [`Ledger::confirm_gateway_payment`](crate::ledger::Ledger::confirm_gateway_payment).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{InvoiceStatus, PaymentIntent, PaymentStatus};
use crate::store::LedgerStore;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<GatewayIntent, GatewayError>;
}

/// Gateway stand-in that accepts every intent.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<GatewayIntent, GatewayError> {
        if amount <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let intent_id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let client_secret = format!("{intent_id}_secret_{}", Uuid::new_v4().simple());

        info!(
            intent_id = %intent_id,
            amount = %amount,
            currency,
            installment_id = metadata.get("installment_id").map(String::as_str),
            "Mock payment intent created"
        );
        Ok(GatewayIntent {
            intent_id,
            client_secret,
        })
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub installment_id: Uuid,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            currency: currency.into(),
        }
    }

    /// Opens a gateway intent for the full amount of a PENDING installment.
    pub async fn start(&self, installment_id: Uuid) -> Result<CheckoutSession, CheckoutError> {
        let (amount, invoice_id) = self.payable(installment_id).await?;

        let metadata = HashMap::from([
            ("installment_id".to_string(), installment_id.to_string()),
            ("invoice_id".to_string(), invoice_id.to_string()),
        ]);
        // Outside any unit of work: no row is held while the gateway responds.
        let intent = self
            .gateway
            .create_intent(amount, &self.currency, metadata)
            .await?;

        let now = Utc::now();
        let record = PaymentIntent {
            intent_id: intent.intent_id.clone(),
            installment_id,
            amount,
            currency: self.currency.clone(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let mut uow = self.store.begin().await?;
        uow.insert_intent(&record).await?;
        uow.commit().await?;

        info!(
            installment_id = %installment_id,
            intent_id = %intent.intent_id,
            "Checkout started"
        );
        Ok(CheckoutSession {
            installment_id,
            intent_id: intent.intent_id,
            client_secret: intent.client_secret,
            amount,
            currency: self.currency.clone(),
        })
    }

    async fn payable(&self, installment_id: Uuid) -> LedgerResult<(Decimal, Uuid)> {
        let mut uow = self.store.begin().await?;
        let installment = uow
            .find_installment(installment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("installment", installment_id))?;
        if installment.is_paid() {
            return Err(LedgerError::AlreadyPaid { installment_id });
        }
        let invoice = uow
            .find_invoice(installment.invoice_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", installment.invoice_id))?;
        if invoice.status != InvoiceStatus::Open {
            return Err(LedgerError::InvoiceClosed {
                invoice_id: invoice.id,
                status: invoice.status,
            });
        }
        Ok((installment.amount, invoice.id))
    }
}
