//! Status changes go through the transition table and a compare-and-set.

use async_trait::async_trait;
use fd_lifecycle::{
    apply_transition, available_actions, delete_shipment, ActionKind, PaymentSnapshot,
    ShipmentStore, StatusChangeError,
};
use fd_schemas::{PaymentStatus, ShipmentStatus, ShipmentWithRelations};
use fd_testkit::{shipment, InMemoryShipmentStore};
use uuid::Uuid;
use ShipmentStatus::*;

#[tokio::test]
async fn forward_moves_land() {
    for (from, to) in [
        (Pending, InTransit),
        (Pending, Cancelled),
        (InTransit, Delivered),
        (InTransit, Cancelled),
        (Arrived, Delivered),
        (Arrived, Cancelled),
    ] {
        let row = shipment(from);
        let id = row.shipment.id;
        let store = InMemoryShipmentStore::with_rows([row]);

        let t = apply_transition(&store, id, to).await.unwrap();
        assert_eq!((t.from, t.to), (from, to));
        assert_eq!(store.get(id).unwrap().shipment.status, to);
    }
}

#[tokio::test]
async fn terminal_statuses_never_change() {
    for from in [Delivered, Cancelled] {
        for to in ShipmentStatus::ALL {
            let row = shipment(from);
            let id = row.shipment.id;
            let store = InMemoryShipmentStore::with_rows([row]);

            let err = apply_transition(&store, id, to).await.unwrap_err();
            assert!(
                matches!(err, StatusChangeError::InvalidTransition(_)),
                "{from} -> {to}"
            );
            assert_eq!(store.get(id).unwrap().shipment.status, from);
        }
    }
}

#[tokio::test]
async fn pending_cannot_skip_to_delivered() {
    let row = shipment(Pending);
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);

    let err = apply_transition(&store, id, Delivered).await.unwrap_err();
    assert!(matches!(err, StatusChangeError::InvalidTransition(_)));
    assert_eq!(store.get(id).unwrap().shipment.status, Pending);
}

#[tokio::test]
async fn arrived_cannot_be_re_entered_manually() {
    let row = shipment(InTransit);
    let id = row.shipment.id;
    let store = InMemoryShipmentStore::with_rows([row]);

    let err = apply_transition(&store, id, Arrived).await.unwrap_err();
    assert!(matches!(err, StatusChangeError::InvalidTransition(_)));
}

#[tokio::test]
async fn unknown_shipment_is_not_found() {
    let store = InMemoryShipmentStore::new();
    let err = apply_transition(&store, Uuid::new_v4(), Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, StatusChangeError::NotFound));
}

/// Moves the row to `cancelled` right before any status write lands.
struct CancelsFirst(InMemoryShipmentStore);

#[async_trait]
impl ShipmentStore for CancelsFirst {
    async fn fetch_shipment(&self, id: Uuid) -> anyhow::Result<Option<ShipmentWithRelations>> {
        self.0.fetch_shipment(id).await
    }
    async fn list_shipments(&self) -> anyhow::Result<Vec<ShipmentWithRelations>> {
        self.0.list_shipments().await
    }
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        target: ShipmentStatus,
    ) -> anyhow::Result<bool> {
        self.0.compare_and_set_status(id, expected, Cancelled).await?;
        self.0.compare_and_set_status(id, expected, target).await
    }
    async fn record_payment_initiated(
        &self,
        id: Uuid,
        observed: &PaymentSnapshot,
        merchant_transaction_id: &str,
    ) -> anyhow::Result<bool> {
        self.0
            .record_payment_initiated(id, observed, merchant_transaction_id)
            .await
    }
    async fn record_payment_result(
        &self,
        merchant_transaction_id: &str,
        result: PaymentStatus,
    ) -> anyhow::Result<bool> {
        self.0.record_payment_result(merchant_transaction_id, result).await
    }
    async fn delete_shipment(&self, id: Uuid) -> anyhow::Result<bool> {
        self.0.delete_shipment(id).await
    }
}

#[tokio::test]
async fn lost_race_reports_conflict_with_current_status() {
    let row = shipment(InTransit);
    let id = row.shipment.id;
    let store = CancelsFirst(InMemoryShipmentStore::with_rows([row]));

    let err = apply_transition(&store, id, Delivered).await.unwrap_err();
    match err {
        StatusChangeError::Conflict { found } => assert_eq!(found, Cancelled),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(store.0.get(id).unwrap().shipment.status, Cancelled);
}

#[tokio::test]
async fn delete_is_available_everywhere_and_reports_missing_rows() {
    for status in ShipmentStatus::ALL {
        assert!(available_actions(status)
            .iter()
            .any(|a| a.kind == ActionKind::Delete));

        let row = shipment(status);
        let id = row.shipment.id;
        let store = InMemoryShipmentStore::with_rows([row]);
        delete_shipment(&store, id).await.unwrap();
        assert!(store.is_empty());

        let err = delete_shipment(&store, id).await.unwrap_err();
        assert!(matches!(err, StatusChangeError::NotFound));
    }
}

#[test]
fn actions_offered_per_status() {
    let labels = |s| -> Vec<&'static str> {
        available_actions(s).into_iter().map(|a| a.label).collect()
    };
    assert_eq!(labels(Pending), ["Start Transit", "Cancel Shipment", "Delete"]);
    assert_eq!(labels(InTransit), ["Mark Delivered", "Cancel Shipment", "Delete"]);
    assert_eq!(
        labels(Arrived),
        ["Force Complete Delivery", "Cancel Shipment", "Delete"]
    );
    assert_eq!(labels(Delivered), ["Delete"]);
    assert_eq!(labels(Cancelled), ["Delete"]);
}
