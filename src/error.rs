use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ports::RepositoryError;
use crate::services::{OnrampError, ReconcileError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payment gateway is misconfigured")]
    GatewayConfig(String),

    #[error("Payment gateway is unavailable")]
    GatewayUnavailable(String),

    #[error("Payment request was rejected by the gateway (code {code})")]
    GatewayRejected { code: String, description: String },

    #[error("Failed to record the transaction")]
    Persistence(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::GatewayConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::GatewayUnavailable(_) | AppError::GatewayRejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Config(detail) => AppError::GatewayConfig(detail),
            other => AppError::GatewayUnavailable(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<OnrampError> for AppError {
    fn from(e: OnrampError) -> Self {
        match e {
            OnrampError::InvalidRequest(v) => AppError::Validation(v.to_string()),
            OnrampError::Gateway(g) => g.into(),
            OnrampError::GatewayRejected { code, description } => {
                AppError::GatewayRejected { code, description }
            }
            OnrampError::Persistence(p) => AppError::Persistence(p.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Malformed(_) => AppError::BadRequest("invalid callback body".to_string()),
            ReconcileError::MissingMetadata(item) => {
                AppError::BadRequest(format!("callback metadata is missing {}", item))
            }
            ReconcileError::Persistence(p) => AppError::Persistence(p.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Display carries only the user-safe message; upstream detail stays in logs.
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
