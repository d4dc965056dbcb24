pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod pricing;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;

use crate::health::DependencyChecker;
use crate::middleware::request_logger::{request_logger_middleware, LogRequestBody};
use crate::ports::TransactionRepository;
use crate::services::{OnrampOrchestrator, WebhookReconciler};

#[derive(Clone)]
pub struct AppState {
    pub onramp: Arc<OnrampOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub dependencies: Vec<Arc<dyn DependencyChecker>>,
    pub start_time: Instant,
    pub log_request_body: bool,
    pub request_timeout: Duration,
}

pub fn create_app(state: AppState) -> Router {
    let log_body = LogRequestBody(state.log_request_body);
    let request_timeout = state.request_timeout;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/onramp/initiate", post(handlers::onramp::initiate))
        .route("/webhooks/mpesa", post(handlers::webhook::mpesa_callback))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .layer(axum::middleware::from_fn_with_state(
            log_body,
            request_logger_middleware,
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
