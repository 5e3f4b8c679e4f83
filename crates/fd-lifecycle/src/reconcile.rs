//! Payment result reconciliation.
//!
//! Applies a verified gateway notice to the shipment store. This is what
//! closes the gap left by a failed or superseded initiation write: the
//! gateway reports the final result against the transaction reference, and
//! the row carrying that reference is settled.

use fd_schemas::PaymentStatus;
use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::{PaymentNotice, PaymentOutcome};
use crate::store::ShipmentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeDisposition {
    /// Row updated to the reported status.
    Applied(PaymentStatus),
    /// Gateway still processing; nothing written.
    Pending,
    /// No row carries this reference, or its payment is no longer in flight.
    Unmatched,
}

pub async fn apply_payment_notice(
    store: &dyn ShipmentStore,
    notice: &PaymentNotice,
) -> anyhow::Result<NoticeDisposition> {
    let target = match notice.outcome {
        PaymentOutcome::Pending => {
            info!(
                merchant_transaction_id = %notice.merchant_transaction_id,
                code = %notice.provider_code,
                "payment still pending"
            );
            return Ok(NoticeDisposition::Pending);
        }
        PaymentOutcome::Success => PaymentStatus::Completed,
        PaymentOutcome::Failed => PaymentStatus::Failed,
    };

    if store
        .record_payment_result(&notice.merchant_transaction_id, target)
        .await?
    {
        info!(
            merchant_transaction_id = %notice.merchant_transaction_id,
            payment_status = %target,
            code = %notice.provider_code,
            "payment result recorded"
        );
        Ok(NoticeDisposition::Applied(target))
    } else {
        warn!(
            merchant_transaction_id = %notice.merchant_transaction_id,
            code = %notice.provider_code,
            "payment notice matched no updatable shipment"
        );
        Ok(NoticeDisposition::Unmatched)
    }
}
