use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::domain::Transaction;
use crate::error::AppError;
use crate::ports::RepositoryError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction found", body = Transaction),
        (status = 404, description = "No transaction with this id")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.transactions.get_by_id(id).await.map_err(|e| match e {
        RepositoryError::NotFound(_) => AppError::NotFound(format!("Transaction {} not found", id)),
        other => other.into(),
    })?;

    Ok(Json(tx))
}
