use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::types::{AuthorizationResponse, GatewayErrorBody, PushAck, StkPushRequest};
use super::{GatewayError, PushGateway, PushRequest};
use crate::config::GatewayConfig;

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
/// Daraja timestamps are East Africa Time.
const GATEWAY_UTC_OFFSET_SECS: i32 = 3 * 3600;
/// Tokens are refreshed this long before Daraja says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct TokenState {
    cached: Option<CachedToken>,
    /// Outcome of the last failed exchange, shared with callers that queued behind it.
    last_failure: Option<(Instant, String)>,
}

impl TokenState {
    fn fresh_token(&self, now: Instant) -> Option<String> {
        self.cached
            .as_ref()
            .filter(|t| t.is_fresh(now))
            .map(|t| t.value.clone())
    }
}

/// HTTP client for the Daraja (M-Pesa) STK push API.
pub struct DarajaClient {
    http: Client,
    config: GatewayConfig,
    short_code: u64,
    token: Mutex<TokenState>,
    /// Held for the duration of a credential exchange so only one runs at a time.
    refresh: Mutex<()>,
}

impl DarajaClient {
    /// Validates the configuration up front; a missing value is reported here, before
    /// any call is attempted.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let short_code = config.short_code()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            short_code,
            token: Mutex::new(TokenState::default()),
            refresh: Mutex::new(()),
        })
    }

    /// Returns a bearer token, exchanging credentials only when the cached one has expired.
    ///
    /// Concurrent callers share a single exchange: whoever waited on it reuses its token,
    /// or its error, instead of starting another round trip.
    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let requested_at = Instant::now();
        if let Some(token) = self.token.lock().await.fresh_token(requested_at) {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        {
            let state = self.token.lock().await;
            if let Some(token) = state.fresh_token(Instant::now()) {
                return Ok(token);
            }
            if let Some((failed_at, reason)) = &state.last_failure {
                if *failed_at >= requested_at {
                    return Err(GatewayError::Auth(reason.clone()));
                }
            }
        }

        match self.fetch_access_token().await {
            Ok(fresh) => {
                let value = fresh.value.clone();
                let mut state = self.token.lock().await;
                state.cached = Some(fresh);
                state.last_failure = None;
                Ok(value)
            }
            Err(e) => {
                let reason = match &e {
                    GatewayError::Auth(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.token.lock().await.last_failure = Some((Instant::now(), reason));
                Err(e)
            }
        }
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.cached = None;
    }

    async fn fetch_access_token(&self) -> Result<CachedToken, GatewayError> {
        let response = self
            .http
            .get(&self.config.auth_url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| GatewayError::Auth(format!("credential exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Auth(format!(
                "credential exchange returned status {}",
                status
            )));
        }

        let auth = response
            .json::<AuthorizationResponse>()
            .await
            .map_err(|e| GatewayError::Auth(format!("undecodable token response: {}", e)))?;

        if auth.access_token.trim().is_empty() {
            return Err(GatewayError::Auth("empty access token".to_string()));
        }

        let ttl = Duration::from_secs(auth.expires_in_secs()).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!(ttl_secs = ttl.as_secs(), "Obtained gateway access token");

        Ok(CachedToken {
            value: auth.access_token,
            expires_at: Instant::now() + ttl,
        })
    }

    fn build_request(&self, request: &PushRequest, now: DateTime<Utc>) -> StkPushRequest {
        let timestamp = push_timestamp(now);
        StkPushRequest {
            business_short_code: self.short_code,
            password: push_password(&self.config.business_short_code, &self.config.pass_key, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: request.amount,
            party_a: request.phone,
            party_b: self.short_code,
            phone_number: request.phone,
            callback_url: request.callback_url.clone(),
            account_reference: self.config.account_reference.clone(),
            transaction_desc: self.config.transaction_desc.clone(),
        }
    }

    async fn decode_ack(&self, status: StatusCode, body: &[u8]) -> Result<PushAck, GatewayError> {
        if let Ok(ack) = serde_json::from_slice::<PushAck>(body) {
            if ack.is_accepted() && ack.checkout_request_id.trim().is_empty() {
                return Err(GatewayError::Protocol(
                    "accepted push carried no CheckoutRequestID".to_string(),
                ));
            }
            return Ok(ack);
        }

        if let Ok(error_body) = serde_json::from_slice::<GatewayErrorBody>(body) {
            if status == StatusCode::UNAUTHORIZED || error_body.is_invalid_token() {
                self.invalidate_token().await;
            }
            tracing::warn!(
                status = %status,
                request_id = %error_body.request_id,
                error_code = %error_body.error_code,
                "Gateway returned an error body for push request"
            );
            return Ok(error_body.into_ack());
        }

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }
        Err(GatewayError::Protocol(format!(
            "undecodable push response (status {}, {} bytes)",
            status,
            body.len()
        )))
    }
}

#[async_trait]
impl PushGateway for DarajaClient {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck, GatewayError> {
        let token = self.access_token().await?;
        let payload = self.build_request(request, Utc::now());

        let response = self
            .http
            .post(&self.config.push_url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Request(format!("push request timed out: {}", e))
                } else {
                    GatewayError::Request(format!("push request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Request(format!("failed to read push response: {}", e)))?;

        tracing::info!(status = %status, amount = request.amount, "STK push response received");

        self.decode_ack(status, &body).await
    }
}

/// `YYYYMMDDHHmmss` in gateway local time.
pub fn push_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Base64 of short code + pass key + timestamp.
pub fn push_password(short_code: &str, pass_key: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, pass_key, timestamp))
}
