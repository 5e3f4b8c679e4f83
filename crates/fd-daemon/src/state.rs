//! Shared runtime state for fd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The store and gateway
//! are trait objects so tests can hand in the in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use fd_config::AppConfig;
use fd_lifecycle::{PaymentGateway, ShipmentStore};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
///
/// UIs react to `shipment_changed` with a full refresh of the list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    ShipmentChanged {
        /// `None` when the row is only known by gateway reference.
        shipment_id: Option<Uuid>,
        reason: String,
    },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::ShipmentChanged { .. } => "shipment_changed",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub config: AppConfig,
    pub store: Arc<dyn ShipmentStore>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ShipmentStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "fd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config,
            store,
            gateway,
        }
    }

    /// Tell connected UIs to refresh. No receivers is not an error.
    pub fn publish_change(&self, shipment_id: Option<Uuid>, reason: &str) {
        let _ = self.bus.send(BusMsg::ShipmentChanged {
            shipment_id,
            reason: reason.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
