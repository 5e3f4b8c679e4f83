//! Payment gateway boundary.
//!
//! The initiation handler treats the gateway as a black box: it hands over a
//! [`CheckoutRequest`] and gets back a [`CheckoutResponse`] that either carries
//! a redirect plus transaction reference or an error message. Transport
//! failures are folded into `success = false` by the implementation; nothing
//! here retries.
//!
//! Implementations: `fd_phonepe::PhonePeClient` (live HTTP) and
//! `fd_testkit::FakeGateway` (tests).

use async_trait::async_trait;
use fd_schemas::Paise;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipment_id: Uuid,
    pub shipment_number: String,
    #[serde(rename = "amountInRupees")]
    pub amount: Paise,
    pub customer_phone: String,
    pub redirect_url: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub redirect_url: Option<String>,
    pub merchant_transaction_id: Option<String>,
    pub error: Option<String>,
}

impl CheckoutResponse {
    pub fn ok(redirect_url: impl Into<String>, merchant_transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            redirect_url: Some(redirect_url.into()),
            merchant_transaction_id: Some(merchant_transaction_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            redirect_url: None,
            merchant_transaction_id: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server-to-server payment notices
// ---------------------------------------------------------------------------

/// Final (or not yet final) result the gateway reports for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Pending,
    Failed,
}

/// A verified, decoded gateway notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub merchant_transaction_id: String,
    pub outcome: PaymentOutcome,
    /// Provider's raw result code, kept for logging.
    pub provider_code: String,
}

/// Why a notice could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeError {
    /// Checksum header missing or not matching the payload.
    BadSignature,
    /// Payload could not be decoded.
    Malformed(String),
}

impl std::fmt::Display for NoticeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeError::BadSignature => write!(f, "payment notice checksum mismatch"),
            NoticeError::Malformed(why) => write!(f, "malformed payment notice: {why}"),
        }
    }
}

impl std::error::Error for NoticeError {}

// ---------------------------------------------------------------------------
// PaymentGateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// True when the configured credentials target the provider's UAT sandbox.
    fn is_uat_sandbox(&self) -> bool;

    /// Create a checkout session. Attempted exactly once.
    async fn create_checkout(&self, req: CheckoutRequest) -> CheckoutResponse;

    /// Verify and decode a server-to-server notice body.
    fn decode_notice(&self, body: &str, checksum: Option<&str>)
        -> Result<PaymentNotice, NoticeError>;
}
