mod common;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Barrier;
use uuid::Uuid;

use ticket_ledger::ledger::{LedgerError, PayInstallment};
use ticket_ledger::models::{
    Installment, InstallmentStatus, Invoice, InvoiceStatus, PaymentMethod, Ticket, TicketStatus,
};
use ticket_ledger::store::LedgerStore;

fn pay(installment_id: Uuid, reference: &str) -> PayInstallment {
    PayInstallment {
        installment_id,
        external_ref: Some(reference.to_string()),
        method: PaymentMethod::Card,
    }
}

#[tokio::test]
async fn three_installments_flip_invoice_only_on_the_last_payment() {
    let fx = common::fixture().await;
    let created = fx.invoice(300, 3, 2).await;
    let ids: Vec<Uuid> = created.installments.iter().map(|i| i.installment.id).collect();
    assert!(created
        .installments
        .iter()
        .all(|i| i.installment.amount == Decimal::from(100)));

    let first = fx.ledger.pay_installment(pay(ids[0], "ch_1")).await.unwrap();
    assert!(!first.all_paid);
    assert!(first.invoice.is_none());
    assert_eq!(first.installment.status, InstallmentStatus::Paid);
    assert!(first.installment.paid_at.is_some());
    assert_eq!(first.payment.amount, Decimal::from(100));

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Open);
    assert!(view.tickets.iter().all(|t| t.status == TicketStatus::Pending));

    let second = fx.ledger.pay_installment(pay(ids[1], "ch_2")).await.unwrap();
    assert!(!second.all_paid);
    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Open);

    let third = fx.ledger.pay_installment(pay(ids[2], "ch_3")).await.unwrap();
    assert!(third.all_paid);
    let paid = third.invoice.expect("paid invoice");
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(third.activated_tickets.len(), 2);

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Paid);
    assert!(view.tickets.iter().all(|t| t.status == TicketStatus::Active));
    assert!(view
        .tickets
        .iter()
        .all(|t| t.payment_id == Some(third.payment.id)));
    let total: Decimal = view.installments.iter().map(|i| i.installment.amount).sum();
    assert_eq!(total, view.invoice.total);
    assert!(view.installments.iter().all(|i| i.payments.len() == 1));
}

#[tokio::test]
async fn paying_twice_is_rejected_and_changes_nothing() {
    let fx = common::fixture().await;
    let created = fx.invoice(200, 2, 1).await;
    let id = created.installments[0].installment.id;

    let first = fx.ledger.pay_installment(pay(id, "ch_a")).await.unwrap();
    let payments_before = fx.store.payment_count().await;

    for reference in ["ch_a", "ch_b"] {
        let err = fx
            .ledger
            .pay_installment(pay(id, reference))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyPaid { installment_id } if installment_id == id));
        assert!(err.is_already_done());
    }

    assert_eq!(fx.store.payment_count().await, payments_before);
    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    let row = &view.installments[0];
    assert_eq!(row.installment.paid_at, first.installment.paid_at);
    assert_eq!(row.payments.len(), 1);
    assert_eq!(view.invoice.status, InvoiceStatus::Open);
}

#[tokio::test]
async fn reused_reference_on_another_installment_is_a_duplicate_transaction() {
    let fx = common::fixture().await;
    let created = fx.invoice(200, 2, 1).await;
    let first = created.installments[0].installment.id;
    let second = created.installments[1].installment.id;

    fx.ledger.pay_installment(pay(first, "ch_same")).await.unwrap();
    let err = fx
        .ledger
        .pay_installment(pay(second, "ch_same"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction { ref reference } if reference == "ch_same"));

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.installments[1].installment.status, InstallmentStatus::Pending);
    assert!(view.installments[1].payments.is_empty());
    assert_eq!(fx.store.payment_count().await, 1);
}

#[tokio::test]
async fn reference_from_another_invoice_is_a_duplicate_transaction() {
    let fx = common::fixture().await;
    let a = fx.invoice(100, 1, 1).await;
    let b = fx.invoice(100, 1, 1).await;

    fx.ledger
        .pay_installment(pay(a.installments[0].installment.id, "ch_shared"))
        .await
        .unwrap();
    let err = fx
        .ledger
        .pay_installment(pay(b.installments[0].installment.id, "ch_shared"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction { .. }));

    let view = fx.ledger.get_invoice(b.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Open);
    assert!(view.tickets.iter().all(|t| t.status == TicketStatus::Pending));
}

#[tokio::test]
async fn payments_without_reference_are_allowed() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 2, 1).await;

    for detail in &created.installments {
        fx.ledger
            .pay_installment(PayInstallment {
                installment_id: detail.installment.id,
                external_ref: None,
                method: PaymentMethod::Cash,
            })
            .await
            .unwrap();
    }

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Paid);
    assert_eq!(view.installments[0].payments[0].method, PaymentMethod::Cash);
}

#[tokio::test]
async fn blank_reference_is_rejected() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 1, 1).await;

    let err = fx
        .ledger
        .pay_installment(pay(created.installments[0].installment.id, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn unknown_installment_is_not_found() {
    let fx = common::fixture().await;
    let err = fx
        .ledger
        .pay_installment(pay(Uuid::new_v4(), "ch_x"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "installment", .. }));
}

#[tokio::test]
async fn cancelled_tickets_stay_cancelled_when_invoice_is_paid() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 1, 1).await;

    let now = Utc::now();
    let cancelled = Ticket {
        id: Uuid::new_v4(),
        invoice_id: created.invoice.id,
        ticket_type_id: fx.ticket_type.id,
        payment_id: None,
        status: TicketStatus::Cancelled,
        qr_code: "TKT-cancelled".into(),
        created_at: now,
        updated_at: now,
    };
    let mut uow = fx.store.begin().await.unwrap();
    uow.insert_tickets(std::slice::from_ref(&cancelled)).await.unwrap();
    uow.commit().await.unwrap();

    let outcome = fx
        .ledger
        .pay_installment(pay(created.installments[0].installment.id, "ch_c"))
        .await
        .unwrap();
    assert!(outcome.all_paid);
    assert_eq!(outcome.activated_tickets.len(), 1);

    let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
    let still_cancelled = view.tickets.iter().find(|t| t.id == cancelled.id).unwrap();
    assert_eq!(still_cancelled.status, TicketStatus::Cancelled);
    assert!(still_cancelled.payment_id.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_on_sibling_installments_activate_tickets_once() {
    let fx = common::fixture().await;

    for round in 0..25 {
        let created = fx.invoice(200, 2, 3).await;
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = created
            .installments
            .iter()
            .enumerate()
            .map(|(n, detail)| {
                let ledger = fx.ledger.clone();
                let barrier = Arc::clone(&barrier);
                let request = pay(detail.installment.id, &format!("ch_{round}_{n}"));
                tokio::spawn(async move {
                    barrier.wait().await;
                    ledger.pay_installment(request).await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        let flips = outcomes.iter().filter(|o| o.all_paid).count();
        assert_eq!(flips, 1, "round {round}: exactly one payment completes the invoice");
        let activated: usize = outcomes.iter().map(|o| o.activated_tickets.len()).sum();
        assert_eq!(activated, 3, "round {round}: every ticket activated exactly once");

        let view = fx.ledger.get_invoice(created.invoice.id).await.unwrap();
        assert_eq!(view.invoice.status, InvoiceStatus::Paid);
        assert!(view.tickets.iter().all(|t| t.status == TicketStatus::Active));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_on_one_installment_succeed_once() {
    let fx = common::fixture().await;
    let created = fx.invoice(100, 1, 1).await;
    let id = created.installments[0].installment.id;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["ch_left", "ch_right"]
        .into_iter()
        .map(|reference| {
            let ledger = fx.ledger.clone();
            let barrier = Arc::clone(&barrier);
            let request = pay(id, reference);
            tokio::spawn(async move {
                barrier.wait().await;
                ledger.pay_installment(request).await
            })
        })
        .collect();

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                successes += 1;
                assert!(outcome.all_paid);
            }
            Err(err) => {
                assert!(err.is_already_done(), "unexpected error: {err}");
                rejections += 1;
            }
        }
    }
    assert_eq!((successes, rejections), (1, 1));
    assert_eq!(fx.store.payment_count().await, 1);
}

#[tokio::test]
async fn installment_of_cancelled_invoice_is_refused() {
    let fx = common::fixture().await;

    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        person_id: fx.person.id,
        event_id: fx.event.id,
        total: Decimal::from(100),
        status: InvoiceStatus::Cancelled,
        paid_at: None,
        created_at: now,
        updated_at: now,
    };
    let installment = Installment {
        id: Uuid::new_v4(),
        invoice_id: invoice.id,
        installment_number: 1,
        amount: Decimal::from(100),
        due_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        status: InstallmentStatus::Pending,
        paid_at: None,
        created_at: now,
        updated_at: now,
    };
    let mut uow = fx.store.begin().await.unwrap();
    uow.insert_invoice(&invoice).await.unwrap();
    uow.insert_installments(std::slice::from_ref(&installment)).await.unwrap();
    uow.commit().await.unwrap();

    let err = fx
        .ledger
        .pay_installment(pay(installment.id, "ch_closed"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvoiceClosed {
            invoice_id,
            status: InvoiceStatus::Cancelled,
        } if invoice_id == invoice.id
    ));
    assert_eq!(err.code(), "INVOICE_CLOSED");
    assert_eq!(fx.store.payment_count().await, 0);
}
