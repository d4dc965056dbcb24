//! Applies asynchronous gateway callbacks to the ledger, exactly once per reference.

use axum::http::StatusCode;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::webhook::SOURCE_MPESA;
use crate::domain::{NewWebhookEvent, StatusUpdate, Transaction};
use crate::gateway::types::{CallbackEnvelope, RECEIPT_ITEM};
use crate::ports::{RepositoryError, TransactionRepository, Transition, WebhookRepository};
use crate::services::settlement::SettlementRequested;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Confirmed(Transaction),
    Failed {
        transaction: Transaction,
        description: String,
    },
    /// The row was already terminal; this delivery changed nothing.
    Duplicate(Transaction),
    /// No row carries this reference, e.g. the ledger write after the push failed.
    UnknownReference { checkout_reference: String },
}

impl ReconcileOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileOutcome::Failed { .. } => StatusCode::BAD_REQUEST,
            ReconcileOutcome::Confirmed(_)
            | ReconcileOutcome::Duplicate(_)
            | ReconcileOutcome::UnknownReference { .. } => StatusCode::OK,
        }
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            ReconcileOutcome::Confirmed(tx)
            | ReconcileOutcome::Duplicate(tx)
            | ReconcileOutcome::Failed { transaction: tx, .. } => Some(tx),
            ReconcileOutcome::UnknownReference { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Malformed callback: {0}")]
    Malformed(String),

    #[error("Callback metadata is missing {0}")]
    MissingMetadata(&'static str),

    #[error(transparent)]
    Persistence(RepositoryError),
}

impl ReconcileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::Malformed(_) | ReconcileError::MissingMetadata(_) => {
                StatusCode::BAD_REQUEST
            }
            ReconcileError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct WebhookReconciler {
    transactions: Arc<dyn TransactionRepository>,
    webhooks: Option<Arc<dyn WebhookRepository>>,
    settlements: broadcast::Sender<SettlementRequested>,
}

impl WebhookReconciler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        webhooks: Option<Arc<dyn WebhookRepository>>,
        settlements: broadcast::Sender<SettlementRequested>,
    ) -> Self {
        Self {
            transactions,
            webhooks,
            settlements,
        }
    }

    /// Settlement hook: one event per freshly confirmed onramp.
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementRequested> {
        self.settlements.subscribe()
    }

    pub async fn handle_callback(&self, raw: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        let received_at = Utc::now();
        let parsed = serde_json::from_slice::<CallbackEnvelope>(raw);
        let reference = parsed
            .as_ref()
            .ok()
            .map(|envelope| envelope.body.stk_callback.checkout_request_id.trim().to_string())
            .filter(|reference| !reference.is_empty());

        let result = match parsed {
            Ok(envelope) => self.reconcile(envelope).await,
            Err(e) => Err(ReconcileError::Malformed(e.to_string())),
        };

        self.audit(raw, reference, received_at, &result).await;
        result
    }

    async fn reconcile(&self, envelope: CallbackEnvelope) -> Result<ReconcileOutcome, ReconcileError> {
        let callback = envelope.body.stk_callback;
        let reference = callback.checkout_request_id.trim().to_string();
        if reference.is_empty() {
            return Err(ReconcileError::Malformed("empty CheckoutRequestID".to_string()));
        }

        let update = if callback.is_success() {
            let receipt = callback
                .callback_metadata
                .as_ref()
                .and_then(|metadata| metadata.receipt_number())
                .ok_or(ReconcileError::MissingMetadata(RECEIPT_ITEM))?;
            StatusUpdate::Confirm { receipt }
        } else {
            StatusUpdate::Fail {
                reason: callback.result_desc.clone(),
            }
        };

        let transition = match self
            .transactions
            .transition_by_checkout_reference(&reference, &update)
            .await
        {
            Ok(transition) => transition,
            Err(RepositoryError::NotFound(_)) => {
                tracing::warn!(
                    checkout_reference = %reference,
                    merchant_reference = %callback.merchant_request_id,
                    result_code = callback.result_code,
                    "Callback for unknown checkout reference acknowledged"
                );
                return Ok(ReconcileOutcome::UnknownReference {
                    checkout_reference: reference,
                });
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    checkout_reference = %reference,
                    result_code = callback.result_code,
                    "Failed to apply callback"
                );
                return Err(ReconcileError::Persistence(e));
            }
        };

        match transition {
            Transition::AlreadyTerminal(transaction) => {
                tracing::info!(
                    checkout_reference = %reference,
                    status = %transaction.status,
                    "Duplicate callback delivery ignored"
                );
                Ok(ReconcileOutcome::Duplicate(transaction))
            }
            Transition::Applied(transaction) => match update {
                StatusUpdate::Confirm { .. } => {
                    tracing::info!(
                        transaction_id = %transaction.id,
                        checkout_reference = %reference,
                        receipt = ?transaction.mpesa_receipt_number,
                        "Onramp confirmed"
                    );
                    self.request_settlement(&transaction);
                    Ok(ReconcileOutcome::Confirmed(transaction))
                }
                StatusUpdate::Fail { reason } => {
                    tracing::info!(
                        transaction_id = %transaction.id,
                        checkout_reference = %reference,
                        result_code = callback.result_code,
                        reason = %reason,
                        "Onramp failed"
                    );
                    Ok(ReconcileOutcome::Failed {
                        transaction,
                        description: reason,
                    })
                }
            },
        }
    }

    fn request_settlement(&self, transaction: &Transaction) {
        // No subscribers is fine: settlement is not wired yet.
        if self
            .settlements
            .send(SettlementRequested::from_transaction(transaction))
            .is_err()
        {
            tracing::debug!(transaction_id = %transaction.id, "No settlement listener attached");
        }
    }

    async fn audit(
        &self,
        raw: &[u8],
        reference: Option<String>,
        received_at: chrono::DateTime<Utc>,
        result: &Result<ReconcileOutcome, ReconcileError>,
    ) {
        let Some(webhooks) = &self.webhooks else {
            return;
        };

        let payload = serde_json::from_slice::<serde_json::Value>(raw)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw).into_owned()));
        let (status_code, transaction_id, processed) = match result {
            Ok(outcome) => (
                outcome.status_code(),
                outcome.transaction().map(|tx| tx.id),
                outcome.transaction().is_some(),
            ),
            Err(e) => (e.status_code(), None, false),
        };

        let event = NewWebhookEvent {
            transaction_id,
            source: SOURCE_MPESA.to_string(),
            checkout_reference: reference,
            payload,
            status_code: i32::from(status_code.as_u16()),
            received_at,
            processed,
        };

        if let Err(e) = webhooks.record(&event).await {
            tracing::warn!(error = %e, "Failed to record webhook audit row");
        }
    }
}
