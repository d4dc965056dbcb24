pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConfigError;

pub use client::{push_password, push_timestamp, DarajaClient};
pub use types::{CallbackEnvelope, PushAck, StkCallback};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway configuration error: {0}")]
    Config(String),

    #[error("Gateway authentication failed: {0}")]
    Auth(String),

    #[error("Gateway request failed: {0}")]
    Request(String),

    #[error("Gateway response was invalid: {0}")]
    Protocol(String),
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

/// A single push-payment prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Payer MSISDN, e.g. `254712345678`.
    pub phone: u64,
    /// Whole KES.
    pub amount: u64,
    pub callback_url: String,
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Sends the push. Never retried: a repeated call may charge the payer twice.
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck, GatewayError>;
}
