pub mod onramp;
pub mod transactions;
pub mod webhook;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::domain::{Transaction, TransactionKind, TransactionStatus};
use crate::gateway::PushAck;
use crate::health::{check_health, DependencyStatus, HealthResponse};
use crate::services::{OnrampReceipt, OnrampRequest};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        onramp::initiate,
        webhook::mpesa_callback,
        transactions::get_transaction,
    ),
    components(schemas(
        OnrampRequest,
        OnrampReceipt,
        PushAck,
        Transaction,
        TransactionStatus,
        TransactionKind,
        webhook::CallbackAck,
        HealthResponse,
        DependencyStatus,
    )),
    tags(
        (name = "Onramp", description = "M-Pesa funded USDC purchases"),
        (name = "Webhooks", description = "Gateway callbacks"),
        (name = "Transactions", description = "Ledger lookups"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.dependencies, state.start_time).await;

    let status_code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(report))
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
