//! Axum router and all HTTP handlers for fd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Domain errors are mapped to HTTP status codes here and
//! nowhere else.

use std::{convert::Infallible, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use fd_lifecycle::{
    apply_payment_notice, apply_transition, available_actions, delete_shipment, initiate_payment,
    resolve_app_url, InitiationError, NoticeDisposition, NoticeError, StatusChangeError,
};
use fd_schemas::ShipmentStatus;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, InitiatePaymentRequest, InitiatePaymentResponse,
        ShipmentActionsResponse, ShipmentRow, ShipmentsResponse, StatusChangeRequest, WebhookAck,
    },
    state::{uptime_secs, AppState, BusMsg},
};

const INTERNAL_ERROR: &str = "Internal server error";
const PAYMENT_CREATE_FAILED: &str = "Failed to create payment";
const SHIPMENT_NOT_FOUND: &str = "Shipment not found";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/shipments", get(list_shipments))
        .route("/v1/shipments/:id", delete(remove_shipment))
        .route("/v1/shipments/:id/actions", get(shipment_actions))
        .route("/v1/shipments/:id/status", post(change_status))
        .route("/api/payment/initiate", post(payment_initiate))
        .route("/api/payment/webhook", post(payment_webhook))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain in-flight
/// requests and return.
pub async fn serve_until(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server crashed")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn error_json(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(msg))).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/payment/initiate
// ---------------------------------------------------------------------------

/// The body is parsed by hand: an unreadable body names no shipment and is
/// answered like a missing `shipmentId`.
pub(crate) async fn payment_initiate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: InitiatePaymentRequest = serde_json::from_slice(&body).unwrap_or_default();
    let shipment_id = req.shipment_id.unwrap_or_default();

    let app_url = resolve_app_url(
        st.config.base_url(),
        header_str(&headers, header::HOST.as_str()),
        header_str(&headers, "x-forwarded-proto"),
    );

    match initiate_payment(st.store.as_ref(), st.gateway.as_ref(), &shipment_id, &app_url).await
    {
        Ok(out) => {
            st.publish_change(Some(out.shipment_id), "payment_initiated");
            (
                StatusCode::OK,
                Json(InitiatePaymentResponse {
                    success: true,
                    redirect_url: out.redirect_url,
                    merchant_transaction_id: out.merchant_transaction_id,
                    amount: out.amount,
                    is_uat_sandbox: out.is_uat_sandbox,
                    warning: out.warning,
                }),
            )
                .into_response()
        }
        Err(e) => initiation_error_response(e),
    }
}

fn initiation_error_response(e: InitiationError) -> Response {
    match e {
        InitiationError::MissingInput | InitiationError::InvalidState(_) => {
            error_json(StatusCode::BAD_REQUEST, e.to_string())
        }
        InitiationError::NotFound => error_json(StatusCode::NOT_FOUND, e.to_string()),
        // Gateway detail was logged by the handler; the payer sees a generic message.
        InitiationError::Gateway(_) => {
            error_json(StatusCode::INTERNAL_SERVER_ERROR, PAYMENT_CREATE_FAILED)
        }
        InitiationError::Store(err) => {
            error!(error = %format!("{err:#}"), "payment initiation store read failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/payment/webhook
// ---------------------------------------------------------------------------

pub(crate) async fn payment_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let checksum = header_str(&headers, "x-verify");

    let notice = match st.gateway.decode_notice(&body, checksum) {
        Ok(n) => n,
        Err(NoticeError::BadSignature) => {
            warn!(provider = st.gateway.provider_name(), "payment notice rejected: bad checksum");
            return error_json(StatusCode::UNAUTHORIZED, "Invalid checksum");
        }
        Err(e @ NoticeError::Malformed(_)) => {
            warn!(provider = st.gateway.provider_name(), error = %e, "payment notice rejected");
            return error_json(StatusCode::BAD_REQUEST, "Invalid notification payload");
        }
    };

    match apply_payment_notice(st.store.as_ref(), &notice).await {
        Ok(disposition) => {
            if let NoticeDisposition::Applied(_) = disposition {
                st.publish_change(None, "payment_settled");
            }
            (
                StatusCode::OK,
                Json(WebhookAck {
                    success: true,
                    disposition,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(
                merchant_transaction_id = %notice.merchant_transaction_id,
                error = %format!("{err:#}"),
                "payment notice could not be applied"
            );
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/shipments
// ---------------------------------------------------------------------------

pub(crate) async fn list_shipments(State(st): State<Arc<AppState>>) -> Response {
    match st.store.list_shipments().await {
        Ok(rows) => {
            let shipments = rows
                .into_iter()
                .map(|row| ShipmentRow {
                    actions: available_actions(row.shipment.status),
                    row,
                })
                .collect();
            (StatusCode::OK, Json(ShipmentsResponse { shipments })).into_response()
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "list_shipments failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// A path segment that is not a UUID cannot name a shipment.
fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw.trim()).map_err(|_| error_json(StatusCode::NOT_FOUND, SHIPMENT_NOT_FOUND))
}

pub(crate) async fn shipment_actions(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match st.store.fetch_shipment(id).await {
        Ok(Some(row)) => (
            StatusCode::OK,
            Json(ShipmentActionsResponse {
                shipment_id: id,
                status: row.shipment.status,
                actions: available_actions(row.shipment.status),
            }),
        )
            .into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, SHIPMENT_NOT_FOUND),
        Err(err) => {
            error!(shipment_id = %id, error = %format!("{err:#}"), "fetch_shipment failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// A body without a `status` string is answered with the JSON error shape.
pub(crate) async fn change_status(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Response {
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let req: StatusChangeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_json(
                StatusCode::BAD_REQUEST,
                format!("invalid status change body: {e}"),
            )
        }
    };
    let target: ShipmentStatus = match req.status.parse() {
        Ok(s) => s,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, format!("{e}")),
    };

    if let Err(e) = apply_transition(st.store.as_ref(), id, target).await {
        return status_change_error_response(id, e);
    }
    st.publish_change(Some(id), "status_changed");

    match st.store.fetch_shipment(id).await {
        Ok(Some(row)) => (
            StatusCode::OK,
            Json(ShipmentRow {
                actions: available_actions(row.shipment.status),
                row,
            }),
        )
            .into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, SHIPMENT_NOT_FOUND),
        Err(err) => {
            error!(shipment_id = %id, error = %format!("{err:#}"), "fetch after status change failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

pub(crate) async fn remove_shipment(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match delete_shipment(st.store.as_ref(), id).await {
        Ok(()) => {
            st.publish_change(Some(id), "deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => status_change_error_response(id, e),
    }
}

fn status_change_error_response(id: Uuid, e: StatusChangeError) -> Response {
    match e {
        StatusChangeError::NotFound => error_json(StatusCode::NOT_FOUND, SHIPMENT_NOT_FOUND),
        StatusChangeError::InvalidTransition(_) | StatusChangeError::Conflict { .. } => {
            info!(shipment_id = %id, reason = %e, "status change refused");
            error_json(StatusCode::CONFLICT, e.to_string())
        }
        StatusChangeError::Store(err) => {
            error!(shipment_id = %id, error = %format!("{err:#}"), "status change store failure");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
