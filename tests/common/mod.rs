#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use onramp_core::adapters::{InMemoryTransactionRepository, InMemoryWebhookRepository};
use onramp_core::config::GatewayConfig;
use onramp_core::gateway::{GatewayError, PushAck, PushGateway, PushRequest};
use onramp_core::ports::WebhookRepository;
use onramp_core::pricing::FixedRate;
use onramp_core::services::{settlement_channel, OnrampOrchestrator, WebhookReconciler};
use onramp_core::AppState;

pub const CALLBACK_URL: &str = "https://onramp.example.com/webhooks/mpesa";
pub const CHECKOUT_REFERENCE: &str = "ws_CO_191220191020363925";
pub const MERCHANT_REFERENCE: &str = "29115-34620561-1";

pub fn rate() -> BigDecimal {
    BigDecimal::from_str("128.83").unwrap()
}

pub fn accepted_ack(checkout_reference: &str) -> PushAck {
    PushAck {
        merchant_request_id: MERCHANT_REFERENCE.to_string(),
        checkout_request_id: checkout_reference.to_string(),
        response_code: "0".to_string(),
        response_description: "Success. Request accepted for processing".to_string(),
        customer_message: "Success. Request accepted for processing".to_string(),
    }
}

pub fn rejected_ack() -> PushAck {
    PushAck {
        merchant_request_id: String::new(),
        checkout_request_id: String::new(),
        response_code: "400.002.02".to_string(),
        response_description: "Bad Request - Invalid PhoneNumber".to_string(),
        customer_message: String::new(),
    }
}

/// Gateway double that replays a fixed answer and records every push.
pub struct StubGateway {
    answer: Result<PushAck, fn() -> GatewayError>,
    pub calls: Mutex<Vec<PushRequest>>,
    count: AtomicUsize,
}

impl StubGateway {
    pub fn accepting(checkout_reference: &str) -> Self {
        Self::answering(Ok(accepted_ack(checkout_reference)))
    }

    pub fn answering(answer: Result<PushAck, fn() -> GatewayError>) -> Self {
        Self {
            answer,
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushGateway for StubGateway {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck, GatewayError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().await.push(request.clone());
        match &self.answer {
            Ok(ack) => Ok(ack.clone()),
            Err(make_error) => Err(make_error()),
        }
    }
}

pub struct Harness {
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub webhooks: Arc<InMemoryWebhookRepository>,
    pub gateway: Arc<StubGateway>,
    pub onramp: Arc<OnrampOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
}

impl Harness {
    pub fn new(gateway: StubGateway) -> Self {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let webhooks = Arc::new(InMemoryWebhookRepository::new());
        let gateway = Arc::new(gateway);

        let onramp = Arc::new(OnrampOrchestrator::new(
            transactions.clone(),
            gateway.clone(),
            Arc::new(FixedRate(rate())),
            CALLBACK_URL.to_string(),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            transactions.clone(),
            Some(webhooks.clone() as Arc<dyn WebhookRepository>),
            settlement_channel(),
        ));

        Self {
            transactions,
            webhooks,
            gateway,
            onramp,
            reconciler,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            onramp: self.onramp.clone(),
            reconciler: self.reconciler.clone(),
            transactions: self.transactions.clone(),
            dependencies: Vec::new(),
            start_time: Instant::now(),
            log_request_body: false,
            request_timeout: Duration::from_secs(5),
        }
    }
}

pub fn onramp_request() -> Value {
    json!({
        "phone": "0712345678",
        "amount_source": 1000,
        "destination_account": "0.0.4515756"
    })
}

pub fn success_callback(checkout_reference: &str, receipt: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": MERCHANT_REFERENCE,
                "CheckoutRequestID": checkout_reference,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 1000.00},
                        {"Name": "MpesaReceiptNumber", "Value": receipt},
                        {"Name": "Balance"},
                        {"Name": "TransactionDate", "Value": 20191219102115u64},
                        {"Name": "PhoneNumber", "Value": 254712345678u64}
                    ]
                }
            }
        }
    })
}

pub fn failure_callback(checkout_reference: &str, code: i64, description: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": MERCHANT_REFERENCE,
                "CheckoutRequestID": checkout_reference,
                "ResultCode": code,
                "ResultDesc": description
            }
        }
    })
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        auth_url: format!("{}/oauth/v1/generate", base_url),
        push_url: format!("{}/mpesa/stkpush/v1/processrequest", base_url),
        business_short_code: "174379".to_string(),
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        pass_key: "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919".to_string(),
        callback_url: CALLBACK_URL.to_string(),
        account_reference: "NHXWALLET".to_string(),
        transaction_desc: "USDC Purchase".to_string(),
        timeout: Duration::from_secs(5),
    }
}
