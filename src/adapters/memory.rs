//! In-memory ledger with the same compare-and-set semantics as the Postgres adapter.
//! Used for local wiring and the service-level tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{NewTransaction, NewWebhookEvent, StatusUpdate, Transaction, WebhookEvent};
use crate::ports::{
    RepositoryError, RepositoryResult, TransactionRepository, Transition, WebhookRepository,
};

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        let mut rows = self.rows.lock().await;

        if let Some(reference) = &tx.checkout_reference {
            let taken = rows
                .values()
                .any(|row| row.checkout_reference.as_deref() == Some(reference.as_str()));
            if taken {
                return Err(RepositoryError::Persistence(format!(
                    "duplicate checkout reference {}",
                    reference
                )));
            }
        }

        let now = Utc::now();
        let row = Transaction {
            id: Uuid::new_v4(),
            phone: tx.phone.clone(),
            destination_account: tx.destination_account.clone(),
            kind: tx.kind,
            amount_source: tx.amount_source.clone(),
            amount_settlement: tx.amount_settlement.clone(),
            exchange_rate: tx.exchange_rate.clone(),
            status: tx.status,
            checkout_reference: tx.checkout_reference.clone(),
            merchant_reference: tx.merchant_reference.clone(),
            mpesa_receipt_number: None,
            failure_reason: None,
            settlement_tx_id: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.rows
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn find_by_checkout_reference(&self, reference: &str) -> RepositoryResult<Transaction> {
        self.rows
            .lock()
            .await
            .values()
            .find(|row| row.checkout_reference.as_deref() == Some(reference))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout reference {}", reference)))
    }

    async fn transition_by_checkout_reference(
        &self,
        reference: &str,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transition> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .values_mut()
            .find(|row| row.checkout_reference.as_deref() == Some(reference))
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout reference {}", reference)))?;

        if row.status.is_terminal() {
            return Ok(Transition::AlreadyTerminal(row.clone()));
        }
        if !row.status.can_transition_to(update.target()) {
            return Err(RepositoryError::InvalidTransition {
                reference: reference.to_string(),
                current: row.status,
                requested: update.target(),
            });
        }

        row.status = update.target();
        match update {
            StatusUpdate::Confirm { receipt } => row.mpesa_receipt_number = Some(receipt.clone()),
            StatusUpdate::Fail { reason } => row.failure_reason = Some(reason.clone()),
        }
        row.updated_at = Utc::now();

        Ok(Transition::Applied(row.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryWebhookRepository {
    events: Mutex<Vec<WebhookEvent>>,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn record(&self, event: &NewWebhookEvent) -> RepositoryResult<WebhookEvent> {
        let stored = WebhookEvent {
            id: Uuid::new_v4(),
            transaction_id: event.transaction_id,
            source: event.source.clone(),
            checkout_reference: event.checkout_reference.clone(),
            payload: event.payload.clone(),
            status_code: event.status_code,
            received_at: event.received_at,
            processed: event.processed,
        };
        self.events.lock().await.push(stored.clone());
        Ok(stored)
    }
}
