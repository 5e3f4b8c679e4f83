//! Verified gateway notices settle the row that carries their reference.

use fd_lifecycle::{
    apply_payment_notice, initiate_payment, InitiationError, InvalidStateReason,
    NoticeDisposition, NoticeError, PaymentGateway,
};
use fd_schemas::PaymentStatus;
use fd_testkit::{FakeGateway, InMemoryShipmentStore, ShipmentBuilder, FAKE_NOTICE_SIGNATURE};
use uuid::Uuid;

const APP: &str = "http://localhost:3000";

/// Seed one eligible shipment and initiate payment for it.
async fn initiated() -> (InMemoryShipmentStore, FakeGateway, Uuid, String) {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::new();
    let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();
    (store, gateway, id, out.merchant_transaction_id)
}

#[tokio::test]
async fn success_notice_completes_payment_and_blocks_reinitiation() {
    let (store, gateway, id, txn) = initiated().await;

    let body = FakeGateway::notice_body(&txn, "PAYMENT_SUCCESS");
    let notice = gateway
        .decode_notice(&body, Some(FAKE_NOTICE_SIGNATURE))
        .unwrap();
    let d = apply_payment_notice(&store, &notice).await.unwrap();
    assert_eq!(d, NoticeDisposition::Applied(PaymentStatus::Completed));
    assert_eq!(
        store.get(id).unwrap().shipment.payment_status,
        Some(PaymentStatus::Completed)
    );

    let err = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InitiationError::InvalidState(InvalidStateReason::AlreadyPaid)
    ));
    assert_eq!(err.to_string(), "Payment already completed");
    assert_eq!(gateway.call_count(), 1);

    // Replayed or contradictory notices do not reopen a completed payment.
    let late = gateway
        .decode_notice(
            &FakeGateway::notice_body(&txn, "PAYMENT_ERROR"),
            Some(FAKE_NOTICE_SIGNATURE),
        )
        .unwrap();
    assert_eq!(
        apply_payment_notice(&store, &late).await.unwrap(),
        NoticeDisposition::Unmatched
    );
    assert_eq!(
        store.get(id).unwrap().shipment.payment_status,
        Some(PaymentStatus::Completed)
    );
}

#[tokio::test]
async fn pending_notice_changes_nothing() {
    let (store, gateway, id, txn) = initiated().await;
    let notice = gateway
        .decode_notice(
            &FakeGateway::notice_body(&txn, "PAYMENT_PENDING"),
            Some(FAKE_NOTICE_SIGNATURE),
        )
        .unwrap();

    assert_eq!(
        apply_payment_notice(&store, &notice).await.unwrap(),
        NoticeDisposition::Pending
    );
    assert_eq!(
        store.get(id).unwrap().shipment.payment_status,
        Some(PaymentStatus::Initiated)
    );
}

#[tokio::test]
async fn failure_notice_marks_failed_and_allows_retry() {
    let (store, gateway, id, txn) = initiated().await;
    let notice = gateway
        .decode_notice(
            &FakeGateway::notice_body(&txn, "PAYMENT_DECLINED"),
            Some(FAKE_NOTICE_SIGNATURE),
        )
        .unwrap();
    assert_eq!(
        apply_payment_notice(&store, &notice).await.unwrap(),
        NoticeDisposition::Applied(PaymentStatus::Failed)
    );

    let retry = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();
    assert_ne!(retry.merchant_transaction_id, txn);
    let stored = store.get(id).unwrap().shipment;
    assert_eq!(stored.payment_status, Some(PaymentStatus::Initiated));
    assert_eq!(
        stored.phonepe_order_id.as_deref(),
        Some(retry.merchant_transaction_id.as_str())
    );
}

#[tokio::test]
async fn unknown_reference_is_unmatched() {
    let (store, gateway, id, _txn) = initiated().await;
    let notice = gateway
        .decode_notice(
            &FakeGateway::notice_body("MTnobody", "PAYMENT_SUCCESS"),
            Some(FAKE_NOTICE_SIGNATURE),
        )
        .unwrap();
    assert_eq!(
        apply_payment_notice(&store, &notice).await.unwrap(),
        NoticeDisposition::Unmatched
    );
    assert_eq!(
        store.get(id).unwrap().shipment.payment_status,
        Some(PaymentStatus::Initiated)
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_before_anything_is_written() {
    let (store, gateway, id, txn) = initiated().await;
    let body = FakeGateway::notice_body(&txn, "PAYMENT_SUCCESS");

    assert_eq!(
        gateway.decode_notice(&body, Some("forged###1")),
        Err(NoticeError::BadSignature)
    );
    assert_eq!(
        gateway.decode_notice(&body, None),
        Err(NoticeError::BadSignature)
    );
    assert_eq!(
        store.get(id).unwrap().shipment.payment_status,
        Some(PaymentStatus::Initiated)
    );
}
