use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::config::Config;
use crate::gateway::DarajaClient;
use crate::pricing::{PriceResolver, PricingError};

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub gateway: bool,
    pub pricing: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.gateway && self.pricing
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Gateway Credentials:   {}", status(self.gateway));
        println!("Exchange Rate Source:  {}", status(self.pricing));

        if !self.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &self.warnings {
                println!("  ⚠️  {}", warning);
            }
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Checks every external dependency the server needs before it accepts traffic.
pub async fn validate_environment(config: &Config, pool: &PgPool) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        gateway: true,
        pricing: true,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    if let Err(e) = validate_gateway(config).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {:#}", e));
    }

    if let Err(e) = validate_pricing(config, &mut report.warnings).await {
        report.pricing = false;
        report.errors.push(format!("Exchange rate: {}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database.url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.database.max_connections == 0 {
        anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
    }

    config
        .gateway
        .validate()
        .context("Gateway configuration is invalid")?;

    if let Some(quote_url) = &config.pricing.quote_url {
        url::Url::parse(quote_url).context("EXCHANGE_RATE_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_pricing(config: &Config, warnings: &mut Vec<String>) -> Result<(), PricingError> {
    let resolver = PriceResolver::new(&config.pricing)?;
    match resolver.fetch_rate().await {
        Ok(_) => Ok(()),
        Err(PricingError::NotConfigured) => {
            warnings.push(format!(
                "EXCHANGE_RATE_URL is not set; onramps use the default rate {}",
                resolver.default_rate()
            ));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn validate_gateway(config: &Config) -> Result<()> {
    let client = DarajaClient::new(config.gateway.clone())?;
    client
        .access_token()
        .await
        .context("Failed to obtain an access token")?;
    Ok(())
}
