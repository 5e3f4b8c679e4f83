//! Payment Initiation Handler.
//!
//! # Flow
//!
//! ```text
//! shipment_id
//!     │
//!     ├── blank?                      → MissingInput
//!     ├── store.fetch_shipment        → NotFound
//!     ├── check_payment_eligibility   → InvalidState(NotArrived | OtpUnverified
//!     │                                               | AlreadyPaid | BadAmount)
//!     ├── gateway.create_checkout     → GatewayError   (store untouched)
//!     └── store.record_payment_initiated  (compare-and-set, best effort)
//!             ├── wrote        → outcome, warning = None
//!             ├── guard missed → outcome, warning = Superseded
//!             └── failed       → outcome, warning = WriteFailed
//! ```
//!
//! The bookkeeping write never blocks the payer: once the gateway has issued
//! a redirect it is returned, and any write problem travels back as a typed
//! [`PersistenceWarning`]. The webhook reconciler (`crate::reconcile`) is what
//! eventually settles the row.

use fd_schemas::{Paise, PaymentStatus, Shipment, ShipmentStatus};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::gateway::{CheckoutRequest, PaymentGateway};
use crate::store::{PaymentSnapshot, ShipmentStore};

pub const CALLBACK_PATH: &str = "/api/payment/callback";
pub const WEBHOOK_PATH: &str = "/api/payment/webhook";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidStateReason {
    NotArrived,
    OtpUnverified,
    AlreadyPaid,
    BadAmount,
}

impl InvalidStateReason {
    pub fn message(&self) -> &'static str {
        match self {
            InvalidStateReason::NotArrived => "Payment can only be initiated for arrived shipments",
            InvalidStateReason::OtpUnverified => "OTP must be verified before payment",
            InvalidStateReason::AlreadyPaid => "Payment already completed",
            InvalidStateReason::BadAmount => "Invalid payment amount",
        }
    }
}

#[derive(Debug)]
pub enum InitiationError {
    MissingInput,
    NotFound,
    InvalidState(InvalidStateReason),
    /// Gateway refused or could not be reached. Carries the gateway's message.
    Gateway(String),
    /// The initial read failed.
    Store(anyhow::Error),
}

impl std::fmt::Display for InitiationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitiationError::MissingInput => write!(f, "Shipment ID is required"),
            InitiationError::NotFound => write!(f, "Shipment not found"),
            InitiationError::InvalidState(r) => write!(f, "{}", r.message()),
            InitiationError::Gateway(msg) => write!(f, "payment gateway error: {msg}"),
            InitiationError::Store(e) => write!(f, "store error: {e:#}"),
        }
    }
}

impl std::error::Error for InitiationError {}

/// Non-fatal bookkeeping problem after the gateway already succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistenceWarning {
    /// The write errored; the store does not reference this transaction.
    WriteFailed { detail: String },
    /// The row changed since it was read (e.g. a concurrent initiation won);
    /// the store references a different transaction.
    Superseded,
}

impl std::fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceWarning::WriteFailed { detail } => {
                write!(f, "payment_status update failed: {detail}")
            }
            PersistenceWarning::Superseded => {
                write!(f, "payment_status update skipped: shipment changed concurrently")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Preconditions 3–6, in order. Returns the payable amount.
pub fn check_payment_eligibility(s: &Shipment) -> Result<Paise, InvalidStateReason> {
    if s.status != ShipmentStatus::Arrived {
        return Err(InvalidStateReason::NotArrived);
    }
    if s.otp_verified_at.is_none() {
        return Err(InvalidStateReason::OtpUnverified);
    }
    if s.payment_status == Some(PaymentStatus::Completed) {
        return Err(InvalidStateReason::AlreadyPaid);
    }
    let amount = s.payable_amount();
    if !amount.is_positive() {
        return Err(InvalidStateReason::BadAmount);
    }
    Ok(amount)
}

/// Payment status moves the store is allowed to make.
///
/// unset → initiated; initiated → initiated | completed | failed;
/// failed → initiated; completed is terminal.
pub fn payment_status_can_move(from: Option<PaymentStatus>, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (None, Initiated)
            | (Some(Initiated), Initiated | Completed | Failed)
            | (Some(Failed), Initiated)
    )
}

// ---------------------------------------------------------------------------
// App URL resolution
// ---------------------------------------------------------------------------

/// Public origin used to build the gateway's redirect and callback targets.
///
/// A configured `base_url` always wins. Otherwise the `host` header is used
/// (default `localhost:3000`) with the protocol from `x-forwarded-proto`,
/// falling back to `http` for localhost and `https` for everything else.
/// Header values that are not a plausible authority / scheme are ignored.
pub fn resolve_app_url(
    base_url: Option<&str>,
    host: Option<&str>,
    forwarded_proto: Option<&str>,
) -> String {
    if let Some(base) = base_url.map(str::trim).filter(|b| !b.is_empty()) {
        return base.trim_end_matches('/').to_string();
    }

    let host = match host.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) if is_plausible_authority(h) => h,
        Some(h) => {
            warn!(host = %h, "ignoring implausible host header; falling back to localhost:3000");
            "localhost:3000"
        }
        None => "localhost:3000",
    };

    let proto = forwarded_proto
        .and_then(|p| p.split(',').next())
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| p == "http" || p == "https")
        .unwrap_or_else(|| {
            if host.contains("localhost") {
                "http".to_string()
            } else {
                "https".to_string()
            }
        });

    format!("{proto}://{host}")
}

fn is_plausible_authority(h: &str) -> bool {
    !h.is_empty()
        && h.len() <= 255
        && h
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUrls {
    pub redirect_url: String,
    pub callback_url: String,
}

impl PaymentUrls {
    pub fn for_shipment(app_url: &str, shipment_id: Uuid) -> Self {
        let app_url = app_url.trim_end_matches('/');
        Self {
            redirect_url: format!("{app_url}{CALLBACK_PATH}?shipmentId={shipment_id}"),
            callback_url: format!("{app_url}{WEBHOOK_PATH}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initiation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiationOutcome {
    pub shipment_id: Uuid,
    pub redirect_url: String,
    pub merchant_transaction_id: String,
    pub amount: Paise,
    pub is_uat_sandbox: bool,
    pub warning: Option<PersistenceWarning>,
}

pub async fn initiate_payment(
    store: &dyn ShipmentStore,
    gateway: &dyn PaymentGateway,
    shipment_id: &str,
    app_url: &str,
) -> Result<InitiationOutcome, InitiationError> {
    let raw = shipment_id.trim();
    if raw.is_empty() {
        return Err(InitiationError::MissingInput);
    }
    // A malformed id cannot name an existing row.
    let id = Uuid::parse_str(raw).map_err(|_| InitiationError::NotFound)?;

    let row = store
        .fetch_shipment(id)
        .await
        .map_err(InitiationError::Store)?
        .ok_or(InitiationError::NotFound)?;

    let amount =
        check_payment_eligibility(&row.shipment).map_err(InitiationError::InvalidState)?;

    let observed = PaymentSnapshot {
        payment_status: row.shipment.payment_status,
        phonepe_order_id: row.shipment.phonepe_order_id.clone(),
    };
    let urls = PaymentUrls::for_shipment(app_url, id);

    let resp = gateway
        .create_checkout(CheckoutRequest {
            shipment_id: id,
            shipment_number: row.shipment.shipment_number.clone(),
            amount,
            customer_phone: row.customer_phone().to_string(),
            redirect_url: urls.redirect_url,
            callback_url: urls.callback_url,
        })
        .await;

    if !resp.success {
        let msg = resp
            .error
            .unwrap_or_else(|| "Failed to create payment".to_string());
        error!(shipment_id = %id, provider = gateway.provider_name(), error = %msg, "checkout creation failed");
        return Err(InitiationError::Gateway(msg));
    }

    let (Some(redirect_url), Some(merchant_transaction_id)) =
        (resp.redirect_url, resp.merchant_transaction_id)
    else {
        error!(shipment_id = %id, provider = gateway.provider_name(), "checkout succeeded without redirect or reference");
        return Err(InitiationError::Gateway(
            "gateway response missing redirect url or transaction id".to_string(),
        ));
    };

    let warning = match store
        .record_payment_initiated(id, &observed, &merchant_transaction_id)
        .await
    {
        Ok(true) => None,
        Ok(false) => Some(PersistenceWarning::Superseded),
        Err(e) => Some(PersistenceWarning::WriteFailed {
            detail: format!("{e:#}"),
        }),
    };

    match &warning {
        None => info!(
            shipment_id = %id,
            merchant_transaction_id = %merchant_transaction_id,
            amount = %amount,
            "payment initiated"
        ),
        Some(w) => warn!(
            shipment_id = %id,
            merchant_transaction_id = %merchant_transaction_id,
            warning = %w,
            "payment initiated but shipment row not updated; reconcile via webhook"
        ),
    }

    Ok(InitiationOutcome {
        shipment_id: id,
        redirect_url,
        merchant_transaction_id,
        amount,
        is_uat_sandbox: gateway.is_uat_sandbox(),
        warning,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn arrived() -> Shipment {
        Shipment {
            id: Uuid::new_v4(),
            shipment_number: "SHP-0001".to_string(),
            status: ShipmentStatus::Arrived,
            payment_status: None,
            otp_verified_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            revenue: Some(Paise::from_rupees(500)),
            phonepe_order_id: None,
            start_location: "Nashik".to_string(),
            destination: "Pune".to_string(),
            customer_id: None,
            driver_id: None,
            vehicle_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn eligible_shipment_yields_amount() {
        assert_eq!(
            check_payment_eligibility(&arrived()),
            Ok(Paise::from_rupees(500))
        );
    }

    #[test]
    fn every_non_arrived_status_is_rejected_first() {
        for status in ShipmentStatus::ALL {
            if status == ShipmentStatus::Arrived {
                continue;
            }
            // Everything else broken too: status must be the reported reason.
            let mut s = arrived();
            s.status = status;
            s.otp_verified_at = None;
            s.revenue = None;
            assert_eq!(
                check_payment_eligibility(&s),
                Err(InvalidStateReason::NotArrived)
            );
        }
    }

    #[test]
    fn otp_checked_before_payment_status_and_amount() {
        let mut s = arrived();
        s.otp_verified_at = None;
        s.payment_status = Some(PaymentStatus::Completed);
        s.revenue = Some(Paise::ZERO);
        assert_eq!(
            check_payment_eligibility(&s),
            Err(InvalidStateReason::OtpUnverified)
        );
    }

    #[test]
    fn completed_payment_blocks_regardless_of_amount() {
        let mut s = arrived();
        s.payment_status = Some(PaymentStatus::Completed);
        s.revenue = Some(Paise::ZERO);
        assert_eq!(
            check_payment_eligibility(&s),
            Err(InvalidStateReason::AlreadyPaid)
        );
    }

    #[test]
    fn initiated_and_failed_payments_may_be_retried() {
        for ps in [PaymentStatus::Initiated, PaymentStatus::Failed] {
            let mut s = arrived();
            s.payment_status = Some(ps);
            assert!(check_payment_eligibility(&s).is_ok());
        }
    }

    #[test]
    fn non_positive_or_missing_revenue_is_bad_amount() {
        for revenue in [None, Some(Paise::ZERO), Some(Paise(-100))] {
            let mut s = arrived();
            s.revenue = revenue;
            assert_eq!(
                check_payment_eligibility(&s),
                Err(InvalidStateReason::BadAmount)
            );
        }
    }

    #[test]
    fn payment_status_moves() {
        use PaymentStatus::*;
        assert!(payment_status_can_move(None, Initiated));
        assert!(!payment_status_can_move(None, Completed));
        assert!(payment_status_can_move(Some(Initiated), Completed));
        assert!(payment_status_can_move(Some(Initiated), Failed));
        assert!(payment_status_can_move(Some(Failed), Initiated));
        assert!(!payment_status_can_move(Some(Failed), Completed));
        for to in [Initiated, Completed, Failed] {
            assert!(!payment_status_can_move(Some(Completed), to));
        }
    }

    #[test]
    fn configured_base_url_overrides_headers() {
        let url = resolve_app_url(
            Some("https://desk.example.com/"),
            Some("evil.example"),
            Some("http"),
        );
        assert_eq!(url, "https://desk.example.com");
    }

    #[test]
    fn host_detection_defaults() {
        assert_eq!(resolve_app_url(None, None, None), "http://localhost:3000");
        assert_eq!(
            resolve_app_url(None, Some("ops.example.in"), None),
            "https://ops.example.in"
        );
        assert_eq!(
            resolve_app_url(None, Some("ops.example.in"), Some("http")),
            "http://ops.example.in"
        );
        assert_eq!(
            resolve_app_url(None, Some("localhost:8080"), Some("https, http")),
            "https://localhost:8080"
        );
    }

    #[test]
    fn internal_service_hostnames_are_kept() {
        assert_eq!(
            resolve_app_url(None, Some("freight_api:8080"), Some("http")),
            "http://freight_api:8080"
        );
        assert_eq!(
            resolve_app_url(None, Some("fd_daemon.svc.cluster.local"), None),
            "https://fd_daemon.svc.cluster.local"
        );
    }

    #[test]
    fn untrustworthy_headers_are_ignored() {
        assert_eq!(
            resolve_app_url(None, Some("a.example/evil?x="), Some("javascript")),
            "http://localhost:3000"
        );
        assert_eq!(
            resolve_app_url(None, Some("ops.example.in"), Some("gopher")),
            "https://ops.example.in"
        );
    }

    #[test]
    fn payment_urls_point_at_callback_and_webhook() {
        let id = Uuid::nil();
        let urls = PaymentUrls::for_shipment("https://desk.example.com/", id);
        assert_eq!(
            urls.redirect_url,
            format!("https://desk.example.com/api/payment/callback?shipmentId={id}")
        );
        assert_eq!(urls.callback_url, "https://desk.example.com/api/payment/webhook");
    }
}
