mod common;

use std::sync::Arc;

use uuid::Uuid;

use ticket_ledger::gateway::{CheckoutError, CheckoutService, MockPaymentGateway};
use ticket_ledger::ledger::{GatewayConfirmation, LedgerError};
use ticket_ledger::models::{InvoiceStatus, PaymentMethod, TicketStatus};

fn checkout(fx: &common::Fixture) -> CheckoutService {
    CheckoutService::new(Arc::new(fx.store.clone()), MockPaymentGateway::shared(), "usd")
}

#[tokio::test]
async fn confirmation_maps_intent_to_installment_payment() {
    let fx = common::fixture().await;
    let created = fx.invoice(150, 1, 2).await;
    let installment = &created.installments[0].installment;

    let session = checkout(&fx).start(installment.id).await.unwrap();
    assert_eq!(session.amount, installment.amount);
    assert_eq!(session.currency, "usd");

    let outcome = fx
        .ledger
        .confirm_gateway_payment(GatewayConfirmation {
            intent_id: session.intent_id.clone(),
            charge_id: "ch_gateway_1".into(),
        })
        .await
        .unwrap();
    assert!(outcome.all_paid);
    assert_eq!(outcome.payment.external_ref.as_deref(), Some("ch_gateway_1"));
    assert_eq!(outcome.payment.method, PaymentMethod::Card);

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Paid);
    assert!(view.tickets.iter().all(|t| t.status == TicketStatus::Active));
}

#[tokio::test]
async fn redelivered_confirmation_is_already_done() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 2, 1).await;
    let session = checkout(&fx)
        .start(created.installments[0].installment.id)
        .await
        .unwrap();
    let confirmation = GatewayConfirmation {
        intent_id: session.intent_id,
        charge_id: "ch_once".into(),
    };

    fx.ledger
        .confirm_gateway_payment(confirmation.clone())
        .await
        .unwrap();
    let err = fx
        .ledger
        .confirm_gateway_payment(confirmation)
        .await
        .unwrap_err();
    assert!(err.is_already_done());
    assert_eq!(fx.store.payment_count().await, 1);
}

#[tokio::test]
async fn unknown_intent_is_not_found() {
    let fx = common::fixture().await;
    let err = fx
        .ledger
        .confirm_gateway_payment(GatewayConfirmation {
            intent_id: "pi_missing".into(),
            charge_id: "ch_1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "payment intent", .. }));
}

#[tokio::test]
async fn checkout_refuses_paid_or_missing_installments() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 1, 1).await;
    let id = created.installments[0].installment.id;
    let service = checkout(&fx);

    let session = service.start(id).await.unwrap();
    fx.ledger
        .confirm_gateway_payment(GatewayConfirmation {
            intent_id: session.intent_id,
            charge_id: "ch_paid".into(),
        })
        .await
        .unwrap();

    let err = service.start(id).await.unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Ledger(LedgerError::AlreadyPaid { .. })
    ));

    let err = service.start(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Ledger(LedgerError::NotFound { .. })
    ));
}
