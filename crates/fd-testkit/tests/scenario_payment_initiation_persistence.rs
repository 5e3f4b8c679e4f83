//! What the store looks like after the gateway has answered.

use fd_lifecycle::{initiate_payment, InitiationError, PersistenceWarning};
use fd_schemas::{Paise, PaymentStatus, ShipmentStatus};
use fd_testkit::{FakeGateway, FakeGatewayMode, InMemoryShipmentStore, ShipmentBuilder};

const APP: &str = "https://desk.example.in";

#[tokio::test]
async fn five_hundred_rupee_shipment_gets_redirect_and_is_marked_initiated() {
    let row = ShipmentBuilder::new()
        .revenue(Some(Paise::from_rupees(500)))
        .build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::new();

    let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 1);
    let sent = gateway.last_request().unwrap();
    assert_eq!(sent.amount, Paise::from_rupees(500));
    assert_eq!(
        serde_json::to_value(&sent).unwrap()["amountInRupees"],
        500
    );
    assert_eq!(sent.customer_phone, "9876543210");
    assert_eq!(
        sent.redirect_url,
        format!("{APP}/api/payment/callback?shipmentId={id}")
    );
    assert_eq!(sent.callback_url, format!("{APP}/api/payment/webhook"));

    assert_eq!(
        out.redirect_url,
        FakeGateway::redirect_for(&out.merchant_transaction_id)
    );
    assert_eq!(out.amount, Paise::from_rupees(500));
    assert!(out.is_uat_sandbox);
    assert!(out.warning.is_none());

    let stored = store.get(id).unwrap().shipment;
    assert_eq!(stored.payment_status, Some(PaymentStatus::Initiated));
    assert_eq!(
        stored.phonepe_order_id.as_deref(),
        Some(out.merchant_transaction_id.as_str())
    );
    assert_eq!(stored.status, ShipmentStatus::Arrived);
}

#[tokio::test]
async fn missing_customer_sends_empty_phone() {
    let row = ShipmentBuilder::new().without_customer().build();
    let id = row.shipment.id.to_string();
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::new();

    initiate_payment(&store, &gateway, &id, APP).await.unwrap();
    assert_eq!(gateway.last_request().unwrap().customer_phone, "");
}

#[tokio::test]
async fn gateway_failure_leaves_payment_fields_untouched() {
    let row = ShipmentBuilder::new()
        .payment(Some(PaymentStatus::Failed), Some("MTold"))
        .build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::failing("merchant not onboarded");

    let err = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap_err();
    match err {
        InitiationError::Gateway(msg) => assert_eq!(msg, "merchant not onboarded"),
        other => panic!("expected gateway error, got {other:?}"),
    }

    assert_eq!(store.payment_write_attempts(), 0);
    let stored = store.get(id).unwrap().shipment;
    assert_eq!(stored.payment_status, Some(PaymentStatus::Failed));
    assert_eq!(stored.phonepe_order_id.as_deref(), Some("MTold"));
}

#[tokio::test]
async fn success_without_redirect_is_a_gateway_error() {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::with_mode(FakeGatewayMode::SucceedWithoutRedirect);

    let err = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap_err();
    assert!(matches!(err, InitiationError::Gateway(_)));
    assert_eq!(store.get(id).unwrap().shipment.payment_status, None);
}

#[tokio::test]
async fn bookkeeping_failure_still_returns_redirect_with_warning() {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    store.fail_next_payment_write("connection reset");
    let gateway = FakeGateway::new();

    let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();

    assert!(!out.redirect_url.is_empty());
    match out.warning {
        Some(PersistenceWarning::WriteFailed { detail }) => {
            assert!(detail.contains("connection reset"))
        }
        other => panic!("expected WriteFailed, got {other:?}"),
    }
    let stored = store.get(id).unwrap().shipment;
    assert_eq!(stored.payment_status, None);
    assert_eq!(stored.phonepe_order_id, None);
}

#[tokio::test]
async fn concurrent_initiation_that_lands_first_supersedes_this_one() {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    store.interfere_before_next_payment_write(|s| {
        s.payment_status = Some(PaymentStatus::Initiated);
        s.phonepe_order_id = Some("MTwinner".to_string());
    });
    let gateway = FakeGateway::new();

    let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();

    assert_eq!(out.warning, Some(PersistenceWarning::Superseded));
    assert_ne!(out.merchant_transaction_id, "MTwinner");
    let stored = store.get(id).unwrap().shipment;
    assert_eq!(stored.phonepe_order_id.as_deref(), Some("MTwinner"));
}

#[tokio::test]
async fn status_change_during_checkout_supersedes_the_write() {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);
    store.interfere_before_next_payment_write(|s| s.status = ShipmentStatus::Cancelled);
    let gateway = FakeGateway::new();

    let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
        .await
        .unwrap();
    assert_eq!(out.warning, Some(PersistenceWarning::Superseded));
    assert_eq!(store.get(id).unwrap().shipment.payment_status, None);
}

#[tokio::test]
async fn retry_replaces_the_reference() {
    for prior in [PaymentStatus::Initiated, PaymentStatus::Failed] {
        let row = ShipmentBuilder::new()
            .payment(Some(prior), Some("MTfirst"))
            .build();
        let id = row.shipment.id;
        let store = InMemoryShipmentStore::with_rows([row]);
        let gateway = FakeGateway::new();

        let out = initiate_payment(&store, &gateway, &id.to_string(), APP)
            .await
            .unwrap();
        assert!(out.warning.is_none(), "prior {prior}");

        let stored = store.get(id).unwrap().shipment;
        assert_eq!(stored.payment_status, Some(PaymentStatus::Initiated));
        assert_eq!(
            stored.phonepe_order_id.as_deref(),
            Some(out.merchant_transaction_id.as_str())
        );
    }
}

#[tokio::test]
async fn production_gateway_reports_not_sandbox() {
    let row = ShipmentBuilder::new().build();
    let id = row.shipment.id.to_string();
    let store = InMemoryShipmentStore::with_rows([row]);
    let gateway = FakeGateway::new().production();

    let out = initiate_payment(&store, &gateway, &id, APP).await.unwrap();
    assert!(!out.is_uat_sandbox);
}
