use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_EXCHANGE_RATE: &str = "128.83";
const DEFAULT_ACCOUNT_REFERENCE: &str = "NHXWALLET";
const DEFAULT_TRANSACTION_DESC: &str = "USDC Purchase";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database: DatabaseConfig,
    pub request_timeout: Duration,
    pub log_request_body: bool,
    pub log_format: LogFormat,
    pub gateway: GatewayConfig,
    pub pricing: PricingConfig,
}

/// The subset needed by commands that only touch Postgres.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Daraja credentials and endpoints.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub auth_url: String,
    pub push_url: String,
    pub business_short_code: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub pass_key: String,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub quote_url: Option<String>,
    pub default_rate: BigDecimal,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Ok(Self::from_lookup(|name| env::var(name).ok())?)
    }

    /// Builds the configuration from any variable source. Every value is validated here,
    /// so nothing downstream re-reads the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            database: DatabaseConfig::from_lookup(&lookup)?,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?),
            log_request_body: parse_or(&lookup, "LOG_REQUEST_BODY", false)?,
            log_format: LogFormat::from_lookup(&lookup)?,
            gateway: GatewayConfig::from_lookup(&lookup)?,
            pricing: PricingConfig::from_lookup(&lookup)?,
        })
    }
}

impl LogFormat {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match optional(lookup, "LOG_FORMAT").as_deref() {
            None | Some("text") => Ok(LogFormat::Text),
            Some("json") => Ok(LogFormat::Json),
            Some(other) => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                reason: format!("expected 'text' or 'json', got '{}'", other),
            }),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Ok(Self::from_lookup(&|name: &str| env::var(name).ok())?)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(DatabaseConfig {
            url: required(lookup, "DATABASE_URL")?,
            max_connections: parse_or(lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
        })
    }
}

impl GatewayConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = GatewayConfig {
            auth_url: required(lookup, "AUTHORIZATION_URL")?,
            push_url: required(lookup, "STK_PUSH_URL")?,
            business_short_code: required(lookup, "BUSINESS_SHORT_CODE")?,
            consumer_key: required(lookup, "CONSUMER_KEY")?,
            consumer_secret: required(lookup, "CONSUMER_SECRET")?,
            pass_key: required(lookup, "PASS_KEY")?,
            callback_url: required(lookup, "CALLBACK_URL")?,
            account_reference: optional(lookup, "ACCOUNT_REFERENCE")
                .unwrap_or_else(|| DEFAULT_ACCOUNT_REFERENCE.to_string()),
            transaction_desc: optional(lookup, "TRANSACTION_DESC")
                .unwrap_or_else(|| DEFAULT_TRANSACTION_DESC.to_string()),
            timeout: Duration::from_secs(parse_or(lookup, "GATEWAY_TIMEOUT_SECS", 15)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects empty values, malformed URLs and a non-numeric short code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, &str); 7] = [
            ("AUTHORIZATION_URL", &self.auth_url),
            ("STK_PUSH_URL", &self.push_url),
            ("BUSINESS_SHORT_CODE", &self.business_short_code),
            ("CONSUMER_KEY", &self.consumer_key),
            ("CONSUMER_SECRET", &self.consumer_secret),
            ("PASS_KEY", &self.pass_key),
            ("CALLBACK_URL", &self.callback_url),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        for (name, value) in [
            ("AUTHORIZATION_URL", &self.auth_url),
            ("STK_PUSH_URL", &self.push_url),
            ("CALLBACK_URL", &self.callback_url),
        ] {
            validate_url(name, value)?;
        }

        self.short_code()?;
        Ok(())
    }

    pub fn short_code(&self) -> Result<u64, ConfigError> {
        self.business_short_code
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid {
                name: "BUSINESS_SHORT_CODE",
                reason: "must be a valid integer".to_string(),
            })
    }
}

impl PricingConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let quote_url = optional(lookup, "EXCHANGE_RATE_URL");
        if let Some(url) = &quote_url {
            validate_url("EXCHANGE_RATE_URL", url)?;
        }

        let raw_rate =
            optional(lookup, "DEFAULT_EXCHANGE_RATE").unwrap_or_else(|| DEFAULT_EXCHANGE_RATE.to_string());
        let default_rate = BigDecimal::from_str(raw_rate.trim()).map_err(|e| ConfigError::Invalid {
            name: "DEFAULT_EXCHANGE_RATE",
            reason: e.to_string(),
        })?;
        if default_rate <= BigDecimal::from(0) {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_EXCHANGE_RATE",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(PricingConfig {
            quote_url,
            default_rate,
            timeout: Duration::from_secs(parse_or(lookup, "PRICING_TIMEOUT_SECS", 5)?),
        })
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map(|_| ()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
