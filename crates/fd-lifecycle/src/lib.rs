//! fd-lifecycle
//!
//! Shipment lifecycle rules, independent of HTTP and of any concrete store or
//! payment provider:
//!
//! - `transitions`: the Status Transition Guard and the row actions derived
//!   from it.
//! - `payment`: the Payment Initiation Handler: eligibility checks, gateway
//!   orchestration and the best-effort bookkeeping write.
//! - `reconcile`: settling rows from verified gateway notices.
//!
//! Collaborators are reached only through the [`ShipmentStore`] and
//! [`PaymentGateway`] traits, passed in explicitly by the caller.

pub mod gateway;
pub mod payment;
pub mod reconcile;
pub mod store;
pub mod transitions;

pub use gateway::{
    CheckoutRequest, CheckoutResponse, NoticeError, PaymentGateway, PaymentNotice, PaymentOutcome,
};
pub use payment::{
    check_payment_eligibility, initiate_payment, payment_status_can_move, resolve_app_url,
    InitiationError, InitiationOutcome, InvalidStateReason, PaymentUrls, PersistenceWarning,
};
pub use reconcile::{apply_payment_notice, NoticeDisposition};
pub use store::{PaymentSnapshot, ShipmentStore};
pub use transitions::{
    allowed_next, apply_transition, available_actions, check_transition, delete_shipment,
    ActionKind, ShipmentAction, StatusChangeError, TransitionError, Transitioned,
};
