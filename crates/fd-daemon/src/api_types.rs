//! Request and response types for fd-daemon HTTP endpoints.
//!
//! Payment endpoints use the camelCase names the web client already speaks;
//! the `/v1` operator endpoints use snake_case like the row schema.

use fd_lifecycle::{NoticeDisposition, PersistenceWarning, ShipmentAction};
use fd_schemas::{Paise, ShipmentStatus, ShipmentWithRelations};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Body for every 4xx/5xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/payment/initiate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(rename = "shipmentId", default)]
    pub shipment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub redirect_url: String,
    pub merchant_transaction_id: String,
    /// Rupees on the wire.
    pub amount: Paise,
    #[serde(rename = "isUATSandbox")]
    pub is_uat_sandbox: bool,
    /// Present when the gateway succeeded but the shipment row was not updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<PersistenceWarning>,
}

// ---------------------------------------------------------------------------
// POST /api/payment/webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub disposition: NoticeDisposition,
}

// ---------------------------------------------------------------------------
// /v1/shipments
// ---------------------------------------------------------------------------

/// One table row: the shipment with relations plus its dropdown actions.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRow {
    #[serde(flatten)]
    pub row: ShipmentWithRelations,
    pub actions: Vec<ShipmentAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentsResponse {
    pub shipments: Vec<ShipmentRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentActionsResponse {
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    pub actions: Vec<ShipmentAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}
