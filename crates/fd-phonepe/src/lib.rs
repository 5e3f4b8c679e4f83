//! PhonePe PG v1 standard checkout (salt-key credentials).
//!
//! Credentials are resolved by the caller (`fd_config::resolve_gateway_secrets`)
//! and passed in; they are never logged.

mod signing;

pub use signing::{checksum_matches, notice_checksum, request_checksum, CHECKSUM_SEPARATOR};

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fd_config::{GatewayEnvironment, GatewaySection, ResolvedGatewaySecrets};
use fd_lifecycle::{
    CheckoutRequest, CheckoutResponse, NoticeError, PaymentGateway, PaymentNotice, PaymentOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const SANDBOX_HOST: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox";
pub const PRODUCTION_HOST: &str = "https://api.phonepe.com/apis/hermes";
pub const PAY_PATH: &str = "/pg/v1/pay";

pub const CODE_PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS";
pub const CODE_PAYMENT_PENDING: &str = "PAYMENT_PENDING";

/// `MT` followed by 32 lowercase hex characters.
pub fn new_merchant_transaction_id() -> String {
    format!("MT{}", Uuid::new_v4().simple())
}

pub fn default_host(environment: GatewayEnvironment) -> &'static str {
    match environment {
        GatewayEnvironment::Sandbox => SANDBOX_HOST,
        GatewayEnvironment::Production => PRODUCTION_HOST,
    }
}

/// Map a notice result code onto the payment outcome.
pub fn outcome_for_code(code: &str) -> PaymentOutcome {
    match code {
        CODE_PAYMENT_SUCCESS => PaymentOutcome::Success,
        CODE_PAYMENT_PENDING => PaymentOutcome::Pending,
        _ => PaymentOutcome::Failed,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload<'a> {
    merchant_id: &'a str,
    merchant_transaction_id: &'a str,
    merchant_user_id: String,
    /// Paise.
    amount: i64,
    redirect_url: &'a str,
    redirect_mode: &'static str,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<&'a str>,
    payment_instrument: PaymentInstrument,
}

#[derive(Debug, Clone, Serialize)]
struct PaymentInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct EncodedRequest<'a> {
    request: &'a str,
}

#[derive(Debug, Deserialize)]
struct PayResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<PayResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResponseData {
    #[serde(default)]
    merchant_transaction_id: Option<String>,
    #[serde(default)]
    instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    #[serde(default)]
    redirect_info: Option<RedirectInfo>,
}

#[derive(Debug, Deserialize)]
struct RedirectInfo {
    url: String,
}

impl PayResponse {
    fn failure_message(&self) -> String {
        match (&self.code, &self.message) {
            (Some(c), Some(m)) => format!("code={c} {m}"),
            (Some(c), None) => format!("code={c}"),
            (None, Some(m)) => m.clone(),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NoticeEnvelope {
    response: String,
}

#[derive(Debug, Deserialize)]
struct NoticeBody {
    code: String,
    data: NoticeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoticeData {
    merchant_transaction_id: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PhonePeClient {
    http: reqwest::Client,
    host: String,
    environment: GatewayEnvironment,
    secrets: ResolvedGatewaySecrets,
}

impl std::fmt::Debug for PhonePeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonePeClient")
            .field("host", &self.host)
            .field("environment", &self.environment)
            .field("secrets", &self.secrets)
            .finish()
    }
}

impl PhonePeClient {
    /// Host comes from `gateway.host` when set, else the environment default.
    pub fn new(section: &GatewaySection, secrets: ResolvedGatewaySecrets) -> Result<Self> {
        let host = section
            .host
            .clone()
            .unwrap_or_else(|| default_host(section.environment).to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .context("phonepe http client build failed")?;

        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            environment: section.environment,
            secrets,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn pay_url(&self) -> String {
        format!("{}{PAY_PATH}", self.host)
    }

    /// Returns `(redirect_url, merchant_transaction_id)`.
    async fn pay(&self, req: &CheckoutRequest) -> Result<(String, String)> {
        let merchant_transaction_id = new_merchant_transaction_id();
        let phone = req.customer_phone.trim();
        let payload = PayPayload {
            merchant_id: &self.secrets.merchant_id,
            merchant_transaction_id: &merchant_transaction_id,
            merchant_user_id: format!("MUID{}", req.shipment_id.simple()),
            amount: req.amount.as_i64(),
            redirect_url: &req.redirect_url,
            redirect_mode: "REDIRECT",
            callback_url: &req.callback_url,
            mobile_number: (!phone.is_empty()).then_some(phone),
            payment_instrument: PaymentInstrument { kind: "PAY_PAGE" },
        };

        let json = serde_json::to_vec(&payload).context("phonepe payload encode failed")?;
        let encoded = BASE64.encode(json);
        let checksum = request_checksum(
            &encoded,
            PAY_PATH,
            &self.secrets.salt_key,
            &self.secrets.salt_index,
        );

        let resp = self
            .http
            .post(self.pay_url())
            .header("X-VERIFY", checksum)
            .json(&EncodedRequest { request: &encoded })
            .send()
            .await
            .context("phonepe pay request failed")?;

        let status = resp.status();
        let body: PayResponse = resp.json().await.with_context(|| {
            format!("phonepe pay response decode failed status={}", status.as_u16())
        })?;

        if !status.is_success() || !body.success {
            return Err(anyhow!(
                "phonepe pay rejected status={} {}",
                status.as_u16(),
                body.failure_message()
            ));
        }

        let data = body
            .data
            .ok_or_else(|| anyhow!("phonepe pay response missing data"))?;
        let redirect = data
            .instrument_response
            .and_then(|i| i.redirect_info)
            .map(|r| r.url)
            .ok_or_else(|| anyhow!("phonepe pay response missing redirect url"))?;
        let txn = data
            .merchant_transaction_id
            .unwrap_or(merchant_transaction_id);

        Ok((redirect, txn))
    }
}

#[async_trait]
impl PaymentGateway for PhonePeClient {
    fn provider_name(&self) -> &'static str {
        "phonepe"
    }

    fn is_uat_sandbox(&self) -> bool {
        self.environment.is_sandbox()
    }

    async fn create_checkout(&self, req: CheckoutRequest) -> CheckoutResponse {
        match self.pay(&req).await {
            Ok((redirect_url, merchant_transaction_id)) => {
                info!(
                    shipment_id = %req.shipment_id,
                    merchant_transaction_id = %merchant_transaction_id,
                    amount_paise = req.amount.as_i64(),
                    "phonepe checkout created"
                );
                CheckoutResponse::ok(redirect_url, merchant_transaction_id)
            }
            Err(e) => {
                let detail = format!("{e:#}");
                warn!(shipment_id = %req.shipment_id, error = %detail, "phonepe checkout failed");
                CheckoutResponse::failed(detail)
            }
        }
    }

    fn decode_notice(
        &self,
        body: &str,
        checksum: Option<&str>,
    ) -> Result<PaymentNotice, NoticeError> {
        let envelope: NoticeEnvelope = serde_json::from_str(body)
            .map_err(|e| NoticeError::Malformed(format!("envelope: {e}")))?;

        let expected = notice_checksum(
            &envelope.response,
            &self.secrets.salt_key,
            &self.secrets.salt_index,
        );
        match checksum {
            Some(received) if checksum_matches(received, &expected) => {}
            _ => return Err(NoticeError::BadSignature),
        }

        let decoded = BASE64
            .decode(envelope.response.trim())
            .map_err(|e| NoticeError::Malformed(format!("base64: {e}")))?;
        let notice: NoticeBody = serde_json::from_slice(&decoded)
            .map_err(|e| NoticeError::Malformed(format!("response: {e}")))?;

        Ok(PaymentNotice {
            outcome: outcome_for_code(&notice.code),
            merchant_transaction_id: notice.data.merchant_transaction_id,
            provider_code: notice.code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merchant_transaction_id_shape() {
        let id = new_merchant_transaction_id();
        assert_eq!(id.len(), 34);
        assert!(id.starts_with("MT"));
        assert!(id[2..].bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(id, new_merchant_transaction_id());
    }

    #[test]
    fn only_success_and_pending_codes_are_not_failures() {
        assert_eq!(outcome_for_code("PAYMENT_SUCCESS"), PaymentOutcome::Success);
        assert_eq!(outcome_for_code("PAYMENT_PENDING"), PaymentOutcome::Pending);
        assert_eq!(outcome_for_code("PAYMENT_ERROR"), PaymentOutcome::Failed);
        assert_eq!(outcome_for_code("PAYMENT_DECLINED"), PaymentOutcome::Failed);
    }

    #[test]
    fn host_follows_environment_unless_overridden() {
        let secrets = ResolvedGatewaySecrets {
            merchant_id: "M1".to_string(),
            salt_key: "k".to_string(),
            salt_index: "1".to_string(),
        };
        let sandbox = PhonePeClient::new(&GatewaySection::default(), secrets.clone()).unwrap();
        assert_eq!(sandbox.host(), SANDBOX_HOST);
        assert!(sandbox.is_uat_sandbox());

        let prod = GatewaySection {
            environment: GatewayEnvironment::Production,
            host: Some("http://127.0.0.1:9999/".to_string()),
            timeout_secs: 5,
        };
        let c = PhonePeClient::new(&prod, secrets).unwrap();
        assert_eq!(c.host(), "http://127.0.0.1:9999");
        assert!(!c.is_uat_sandbox());
        assert!(!format!("{c:?}").contains("\"k\""));
    }
}
