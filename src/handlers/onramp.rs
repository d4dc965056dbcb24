use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::services::{OnrampReceipt, OnrampRequest};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/onramp/initiate",
    request_body = OnrampRequest,
    responses(
        (status = 200, description = "STK push sent and transaction recorded", body = OnrampReceipt),
        (status = 400, description = "Invalid phone, amount, or destination account"),
        (status = 502, description = "Gateway rejected the push or is unavailable"),
        (status = 500, description = "Gateway misconfigured or ledger unavailable")
    ),
    tag = "Onramp"
)]
pub async fn initiate(
    State(state): State<AppState>,
    payload: Result<Json<OnrampRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected onramp request body");
        AppError::Validation(
            "body must be JSON with phone, amount_source and destination_account".to_string(),
        )
    })?;
    let receipt = state.onramp.initiate(request).await?;
    Ok(Json(receipt))
}
