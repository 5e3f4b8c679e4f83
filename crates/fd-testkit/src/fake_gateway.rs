use std::sync::Mutex;

use async_trait::async_trait;
use fd_lifecycle::{
    CheckoutRequest, CheckoutResponse, NoticeError, PaymentGateway, PaymentNotice,
};
use serde::Deserialize;
use uuid::Uuid;

/// Checksum [`FakeGateway::decode_notice`] accepts.
pub const FAKE_NOTICE_SIGNATURE: &str = "fake-signature###1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeGatewayMode {
    /// Every checkout succeeds with a fresh `MT…` reference.
    Succeed,
    /// Every checkout fails with this message.
    Fail(String),
    /// Reports success but omits the redirect URL.
    SucceedWithoutRedirect,
}

/// Minimal fake payment gateway used ONLY for tests.
///
/// Records every checkout request so tests can assert on call counts and the
/// exact amount handed to the provider.
pub struct FakeGateway {
    mode: Mutex<FakeGatewayMode>,
    sandbox: bool,
    requests: Mutex<Vec<CheckoutRequest>>,
    issued: Mutex<Vec<String>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FakeNotice {
    merchant_transaction_id: String,
    code: String,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::with_mode(FakeGatewayMode::Succeed)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(FakeGatewayMode::Fail(message.into()))
    }

    pub fn with_mode(mode: FakeGatewayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            sandbox: true,
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn production(mut self) -> Self {
        self.sandbox = false;
        self
    }

    pub fn set_mode(&self, mode: FakeGatewayMode) {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = mode;
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn last_request(&self) -> Option<CheckoutRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last()
            .cloned()
    }

    /// References handed out by successful checkouts, oldest first.
    pub fn issued_references(&self) -> Vec<String> {
        self.issued.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Redirect URL the fake returns for a given reference.
    pub fn redirect_for(merchant_transaction_id: &str) -> String {
        format!("https://pay.fake.test/checkout/{merchant_transaction_id}")
    }

    /// A notice body this fake decodes; sign it with [`FAKE_NOTICE_SIGNATURE`].
    pub fn notice_body(merchant_transaction_id: &str, code: &str) -> String {
        serde_json::json!({
            "merchantTransactionId": merchant_transaction_id,
            "code": code,
        })
        .to_string()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn is_uat_sandbox(&self) -> bool {
        self.sandbox
    }

    async fn create_checkout(&self, req: CheckoutRequest) -> CheckoutResponse {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(req);

        let mode = self.mode.lock().unwrap_or_else(|p| p.into_inner()).clone();
        match mode {
            FakeGatewayMode::Fail(msg) => CheckoutResponse::failed(msg),
            FakeGatewayMode::SucceedWithoutRedirect => CheckoutResponse {
                success: true,
                redirect_url: None,
                merchant_transaction_id: Some(format!("MT{}", Uuid::new_v4().simple())),
                error: None,
            },
            FakeGatewayMode::Succeed => {
                let txn = format!("MT{}", Uuid::new_v4().simple());
                self.issued
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(txn.clone());
                CheckoutResponse::ok(Self::redirect_for(&txn), txn)
            }
        }
    }

    fn decode_notice(
        &self,
        body: &str,
        checksum: Option<&str>,
    ) -> Result<PaymentNotice, NoticeError> {
        if checksum != Some(FAKE_NOTICE_SIGNATURE) {
            return Err(NoticeError::BadSignature);
        }
        let n: FakeNotice =
            serde_json::from_str(body).map_err(|e| NoticeError::Malformed(e.to_string()))?;
        Ok(PaymentNotice {
            outcome: fd_phonepe::outcome_for_code(&n.code),
            merchant_transaction_id: n.merchant_transaction_id,
            provider_code: n.code,
        })
    }
}
