use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::PricingConfig;

/// Stablecoin precision used for settlement amounts.
pub const SETTLEMENT_SCALE: i64 = 6;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Quote source not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Quote source returned status {0}")]
    Status(u16),
    #[error("Invalid rate from quote source: {0}")]
    InvalidRate(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Debug, Deserialize)]
struct CoinPriceResponse {
    data: CoinPriceData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPriceData {
    fiat_exchange_rate: FiatExchangeRate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FiatExchangeRate {
    usd_rate: f64,
}

/// Source of the KES-per-settlement-unit rate.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Always yields a positive rate; unavailability must never block an onramp.
    async fn resolve_rate(&self) -> BigDecimal;
}

/// A rate that never changes. Handy for tests and for running without a quote source.
#[derive(Debug, Clone)]
pub struct FixedRate(pub BigDecimal);

#[async_trait]
impl RateProvider for FixedRate {
    async fn resolve_rate(&self) -> BigDecimal {
        self.0.clone()
    }
}

/// Live quote lookup with a fixed fallback rate.
#[derive(Clone)]
pub struct PriceResolver {
    client: Client,
    quote_url: Option<String>,
    default_rate: BigDecimal,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PriceResolver {
    pub fn new(config: &PricingConfig) -> Result<Self, PricingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(PriceResolver {
            client,
            quote_url: config.quote_url.clone(),
            default_rate: config.default_rate.clone(),
            circuit_breaker,
        })
    }

    pub fn default_rate(&self) -> &BigDecimal {
        &self.default_rate
    }

    /// Returns the current state of the quote-source circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Fetches the live rate without falling back.
    pub async fn fetch_rate(&self) -> Result<BigDecimal, PricingError> {
        let url = self.quote_url.clone().ok_or(PricingError::NotConfigured)?;
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(PricingError::Status(response.status().as_u16()));
                }
                let quote = response.json::<CoinPriceResponse>().await?;
                parse_rate(quote.data.fiat_exchange_rate.usd_rate)
            })
            .await;

        match result {
            Ok(rate) => Ok(rate),
            Err(FailsafeError::Rejected) => Err(PricingError::CircuitBreakerOpen(
                "quote source circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl RateProvider for PriceResolver {
    async fn resolve_rate(&self) -> BigDecimal {
        match self.fetch_rate().await {
            Ok(rate) => rate,
            Err(PricingError::NotConfigured) => {
                tracing::debug!("EXCHANGE_RATE_URL is not set, using default exchange rate");
                self.default_rate.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, default_rate = %self.default_rate, "Failed to fetch exchange rate, using default");
                self.default_rate.clone()
            }
        }
    }
}

fn parse_rate(raw: f64) -> Result<BigDecimal, PricingError> {
    if !raw.is_finite() || raw <= 0.0 {
        return Err(PricingError::InvalidRate(raw.to_string()));
    }
    BigDecimal::from_str(&raw.to_string()).map_err(|e| PricingError::InvalidRate(e.to_string()))
}

/// Settlement amount for `amount_source` at `rate`, rounded to [`SETTLEMENT_SCALE`].
pub fn convert(amount_source: &BigDecimal, rate: &BigDecimal) -> BigDecimal {
    (amount_source / rate).round(SETTLEMENT_SCALE)
}
