use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fd_lifecycle::{payment_status_can_move, PaymentSnapshot, ShipmentStore};
use fd_schemas::{PaymentStatus, Shipment, ShipmentStatus, ShipmentWithRelations};
use uuid::Uuid;

type Interference = Box<dyn FnOnce(&mut Shipment) + Send>;

/// In-memory [`ShipmentStore`] used ONLY for tests.
///
/// Writes follow the same compare-and-set guards as the Postgres store.
/// Failure injection:
/// - [`fail_reads`](Self::fail_reads) makes every read error.
/// - [`fail_next_payment_write`](Self::fail_next_payment_write) makes the
///   next initiation write error.
/// - [`interfere_before_next_payment_write`](Self::interfere_before_next_payment_write)
///   mutates the row just before the next initiation write, as a concurrent
///   writer would.
#[derive(Default)]
pub struct InMemoryShipmentStore {
    rows: Mutex<HashMap<Uuid, ShipmentWithRelations>>,
    fail_reads: Mutex<bool>,
    fail_next_payment_write: Mutex<Option<String>>,
    interference: Mutex<Option<Interference>>,
    payment_writes: Mutex<usize>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ShipmentWithRelations>) -> Self {
        let store = Self::new();
        for r in rows {
            store.insert(r);
        }
        store
    }

    pub fn insert(&self, row: ShipmentWithRelations) {
        lock(&self.rows).insert(row.shipment.id, row);
    }

    /// Current row, bypassing failure injection.
    pub fn get(&self, id: Uuid) -> Option<ShipmentWithRelations> {
        lock(&self.rows).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_reads(&self, on: bool) {
        *lock(&self.fail_reads) = on;
    }

    pub fn fail_next_payment_write(&self, detail: impl Into<String>) {
        *lock(&self.fail_next_payment_write) = Some(detail.into());
    }

    pub fn interfere_before_next_payment_write(
        &self,
        f: impl FnOnce(&mut Shipment) + Send + 'static,
    ) {
        *lock(&self.interference) = Some(Box::new(f));
    }

    /// Initiation writes attempted so far, including failed ones.
    pub fn payment_write_attempts(&self) -> usize {
        *lock(&self.payment_writes)
    }

    fn check_reads(&self) -> Result<()> {
        if *lock(&self.fail_reads) {
            return Err(anyhow!("injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn fetch_shipment(&self, id: Uuid) -> Result<Option<ShipmentWithRelations>> {
        self.check_reads()?;
        Ok(self.get(id))
    }

    async fn list_shipments(&self) -> Result<Vec<ShipmentWithRelations>> {
        self.check_reads()?;
        let mut rows: Vec<_> = lock(&self.rows).values().cloned().collect();
        rows.sort_by(|a, b| {
            b.shipment
                .created_at
                .cmp(&a.shipment.created_at)
                .then_with(|| b.shipment.shipment_number.cmp(&a.shipment.shipment_number))
        });
        Ok(rows)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        target: ShipmentStatus,
    ) -> Result<bool> {
        let mut rows = lock(&self.rows);
        match rows.get_mut(&id) {
            Some(r) if r.shipment.status == expected => {
                r.shipment.status = target;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_payment_initiated(
        &self,
        id: Uuid,
        observed: &PaymentSnapshot,
        merchant_transaction_id: &str,
    ) -> Result<bool> {
        *lock(&self.payment_writes) += 1;
        if let Some(detail) = lock(&self.fail_next_payment_write).take() {
            return Err(anyhow!(detail));
        }

        let interference = lock(&self.interference).take();
        let mut rows = lock(&self.rows);
        let Some(r) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(f) = interference {
            f(&mut r.shipment);
        }

        let s = &mut r.shipment;
        let unchanged = s.payment_status == observed.payment_status
            && s.phonepe_order_id == observed.phonepe_order_id;
        if s.status != ShipmentStatus::Arrived
            || !unchanged
            || !payment_status_can_move(s.payment_status, PaymentStatus::Initiated)
        {
            return Ok(false);
        }
        s.payment_status = Some(PaymentStatus::Initiated);
        s.phonepe_order_id = Some(merchant_transaction_id.to_string());
        Ok(true)
    }

    async fn record_payment_result(
        &self,
        merchant_transaction_id: &str,
        result: PaymentStatus,
    ) -> Result<bool> {
        let mut rows = lock(&self.rows);
        let row = rows.values_mut().find(|r| {
            r.shipment.phonepe_order_id.as_deref() == Some(merchant_transaction_id)
        });
        // Only an in-flight payment settles.
        match row {
            Some(r)
                if r.shipment.payment_status == Some(PaymentStatus::Initiated)
                    && payment_status_can_move(r.shipment.payment_status, result) =>
            {
                r.shipment.payment_status = Some(result);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_shipment(&self, id: Uuid) -> Result<bool> {
        Ok(lock(&self.rows).remove(&id).is_some())
    }
}
