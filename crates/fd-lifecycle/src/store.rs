//! Shipment store boundary.
//!
//! Core operations never reach a database client directly: they take a
//! `&dyn ShipmentStore` handed to them by the caller (the daemon passes the
//! one held in its `AppState`). `fd-db` provides the Postgres implementation;
//! `fd-testkit` provides an in-memory one.
//!
//! Every mutation is a compare-and-set. The boolean result reports whether a
//! row matched the guard; `false` means "someone else got there first" (or
//! the row is gone) and the caller decides what that means.

use async_trait::async_trait;
use fd_schemas::{PaymentStatus, ShipmentStatus, ShipmentWithRelations};
use uuid::Uuid;

/// The payment fields observed when preconditions were checked. The
/// post-gateway write only lands if the row still carries exactly these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSnapshot {
    pub payment_status: Option<PaymentStatus>,
    pub phonepe_order_id: Option<String>,
}

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Read one shipment joined with customer, driver and vehicle.
    async fn fetch_shipment(&self, id: Uuid) -> anyhow::Result<Option<ShipmentWithRelations>>;

    /// All shipments, newest first.
    async fn list_shipments(&self) -> anyhow::Result<Vec<ShipmentWithRelations>>;

    /// `status = target` where `id = id and status = expected`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        target: ShipmentStatus,
    ) -> anyhow::Result<bool>;

    /// `payment_status = initiated, phonepe_order_id = merchant_transaction_id`
    /// where the row is still `arrived` and its payment fields equal `observed`.
    async fn record_payment_initiated(
        &self,
        id: Uuid,
        observed: &PaymentSnapshot,
        merchant_transaction_id: &str,
    ) -> anyhow::Result<bool>;

    /// Apply a gateway-reported result to the row carrying
    /// `phonepe_order_id = merchant_transaction_id`. Only an `initiated` row
    /// moves, so a completed payment is never rewritten.
    async fn record_payment_result(
        &self,
        merchant_transaction_id: &str,
        result: PaymentStatus,
    ) -> anyhow::Result<bool>;

    /// Unguarded delete. `false` when no row had this id.
    async fn delete_shipment(&self, id: Uuid) -> anyhow::Result<bool>;
}
