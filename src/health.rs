use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::pricing::PriceResolver;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const CRITICAL_DEPENDENCIES: [&str; 1] = ["postgres"];

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status != "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the quote source as unhealthy while its circuit breaker is open.
/// Onramps keep working on the default rate, so this only degrades the service.
pub struct ExchangeRateChecker {
    resolver: PriceResolver,
}

impl ExchangeRateChecker {
    pub fn new(resolver: PriceResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl DependencyChecker for ExchangeRateChecker {
    fn name(&self) -> &'static str {
        "exchange_rate"
    }

    async fn check(&self) -> DependencyStatus {
        match self.resolver.circuit_state().as_str() {
            "closed" => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: 0,
            },
            _ => DependencyStatus::unhealthy(format!(
                "quote source circuit breaker is open, using default rate {}",
                self.resolver.default_rate()
            )),
        }
    }
}

/// Runs every checker concurrently, each bounded by its own timeout.
pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let results = run_checks(checkers).await;

    let dependencies: HashMap<String, DependencyStatus> = results.into_iter().collect();
    let status = determine_overall_status(&dependencies);

    HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

async fn run_checks(checkers: &[Arc<dyn DependencyChecker>]) -> Vec<(String, DependencyStatus)> {
    let mut handles = Vec::with_capacity(checkers.len());
    for checker in checkers {
        let checker = Arc::clone(checker);
        handles.push(tokio::spawn(async move {
            let status = timeout(CHECK_TIMEOUT, checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            (checker.name().to_string(), status)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (handle, checker) in handles.into_iter().zip(checkers) {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => results.push((
                checker.name().to_string(),
                DependencyStatus::unhealthy(format!("check panicked: {}", e)),
            )),
        }
    }
    results
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if CRITICAL_DEPENDENCIES.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
