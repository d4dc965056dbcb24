use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Transaction;
use crate::error::AppError;
use crate::services::ReconcileOutcome;
use crate::AppState;

/// Acknowledgement returned to the gateway for every handled delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ReconcileOutcome> for CallbackAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Confirmed(tx) => CallbackAck {
                result_code: 0,
                result_desc: "Accepted".to_string(),
                transaction: Some(tx),
                error: None,
            },
            ReconcileOutcome::Failed {
                transaction,
                description,
            } => CallbackAck {
                result_code: 0,
                result_desc: "Accepted".to_string(),
                transaction: Some(transaction),
                error: Some(description),
            },
            ReconcileOutcome::Duplicate(tx) => CallbackAck {
                result_code: 0,
                result_desc: "Already processed".to_string(),
                transaction: Some(tx),
                error: None,
            },
            ReconcileOutcome::UnknownReference { .. } => CallbackAck {
                result_code: 0,
                result_desc: "Accepted".to_string(),
                transaction: None,
                error: None,
            },
        }
    }
}

/// Receives STK push results from the gateway.
#[utoipa::path(
    post,
    path = "/webhooks/mpesa",
    request_body(content = String, description = "Daraja stkCallback envelope", content_type = "application/json"),
    responses(
        (status = 200, description = "Callback applied, duplicate, or unknown reference", body = CallbackAck),
        (status = 400, description = "Payment failed, or the callback was malformed", body = CallbackAck),
        (status = 500, description = "Ledger unavailable")
    ),
    tag = "Webhooks"
)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.reconciler.handle_callback(&body).await?;
    let status = outcome.status_code();
    Ok((status, Json(CallbackAck::from(outcome))))
}
