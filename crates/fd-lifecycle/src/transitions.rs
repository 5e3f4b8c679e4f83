//! Status Transition Guard.
//!
//! # Permitted manual transitions
//!
//! ```text
//!    pending ──► in_transit ──► delivered (term.)
//!       │            │              ▲
//!       │            │   arrived ───┘      (arrived is set by the driver flow,
//!       │            │      │               never by this guard)
//!       ▼            ▼      ▼
//!    cancelled (term.) ◄────┘
//! ```
//!
//! [`allowed_next`] is the single table. [`available_actions`] derives the
//! per-row UI affordances from it, and [`apply_transition`] enforces it
//! server-side with a compare-and-set on the status that was read.
//!
//! Deletion is deliberately not a transition: [`delete_shipment`] has no
//! status precondition.

use fd_schemas::ShipmentStatus;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::store::ShipmentStore;

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Statuses reachable from `from` through a manual action, in menu order.
pub fn allowed_next(from: ShipmentStatus) -> &'static [ShipmentStatus] {
    use ShipmentStatus::*;
    match from {
        Pending => &[InTransit, Cancelled],
        InTransit => &[Delivered, Cancelled],
        Arrived => &[Delivered, Cancelled],
        Delivered | Cancelled => &[],
    }
}

/// Returned when a requested status change is not in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from.is_terminal() {
            write!(
                f,
                "shipment is {} and cannot change status (requested {})",
                self.from, self.to
            )
        } else {
            write!(f, "cannot move shipment from {} to {}", self.from, self.to)
        }
    }
}

impl std::error::Error for TransitionError {}

pub fn check_transition(from: ShipmentStatus, to: ShipmentStatus) -> Result<(), TransitionError> {
    if allowed_next(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

// ---------------------------------------------------------------------------
// Row actions (UI affordances)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    StartTransit,
    MarkDelivered,
    ForceCompleteDelivery,
    Cancel,
    Delete,
}

/// One dropdown entry for a shipment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentAction {
    pub kind: ActionKind,
    pub label: &'static str,
    /// Status the action writes; `None` for delete.
    pub target: Option<ShipmentStatus>,
}

pub fn available_actions(status: ShipmentStatus) -> Vec<ShipmentAction> {
    let mut out: Vec<ShipmentAction> = allowed_next(status)
        .iter()
        .map(|&target| {
            let (kind, label) = match (status, target) {
                (_, ShipmentStatus::InTransit) => (ActionKind::StartTransit, "Start Transit"),
                (ShipmentStatus::Arrived, ShipmentStatus::Delivered) => {
                    (ActionKind::ForceCompleteDelivery, "Force Complete Delivery")
                }
                (_, ShipmentStatus::Delivered) => (ActionKind::MarkDelivered, "Mark Delivered"),
                _ => (ActionKind::Cancel, "Cancel Shipment"),
            };
            ShipmentAction {
                kind,
                label,
                target: Some(target),
            }
        })
        .collect();

    out.push(ShipmentAction {
        kind: ActionKind::Delete,
        label: "Delete",
        target: None,
    });
    out
}

// ---------------------------------------------------------------------------
// Store-backed operations
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StatusChangeError {
    NotFound,
    InvalidTransition(TransitionError),
    /// The row changed between read and write; `found` is the fresh status.
    Conflict { found: ShipmentStatus },
    Store(anyhow::Error),
}

impl std::fmt::Display for StatusChangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusChangeError::NotFound => write!(f, "Shipment not found"),
            StatusChangeError::InvalidTransition(e) => write!(f, "{e}"),
            StatusChangeError::Conflict { found } => {
                write!(f, "shipment status changed concurrently (now {found})")
            }
            StatusChangeError::Store(e) => write!(f, "store error: {e:#}"),
        }
    }
}

impl std::error::Error for StatusChangeError {}

impl From<TransitionError> for StatusChangeError {
    fn from(e: TransitionError) -> Self {
        StatusChangeError::InvalidTransition(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transitioned {
    pub id: Uuid,
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

/// Guarded status write. Payment fields are never touched.
pub async fn apply_transition(
    store: &dyn ShipmentStore,
    id: Uuid,
    target: ShipmentStatus,
) -> Result<Transitioned, StatusChangeError> {
    let row = store
        .fetch_shipment(id)
        .await
        .map_err(StatusChangeError::Store)?
        .ok_or(StatusChangeError::NotFound)?;
    let from = row.shipment.status;

    check_transition(from, target)?;

    let written = store
        .compare_and_set_status(id, from, target)
        .await
        .map_err(StatusChangeError::Store)?;

    if !written {
        let fresh = store
            .fetch_shipment(id)
            .await
            .map_err(StatusChangeError::Store)?
            .ok_or(StatusChangeError::NotFound)?;
        return Err(StatusChangeError::Conflict {
            found: fresh.shipment.status,
        });
    }

    info!(shipment_id = %id, from = %from, to = %target, "shipment status changed");
    Ok(Transitioned {
        id,
        from,
        to: target,
    })
}

/// Unguarded delete, available in every status.
pub async fn delete_shipment(store: &dyn ShipmentStore, id: Uuid) -> Result<(), StatusChangeError> {
    let deleted = store
        .delete_shipment(id)
        .await
        .map_err(StatusChangeError::Store)?;
    if !deleted {
        return Err(StatusChangeError::NotFound);
    }
    info!(shipment_id = %id, "shipment deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
