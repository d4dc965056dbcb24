//! Storage ports. The orchestrator and reconciler depend on these traits only.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewWebhookEvent, StatusUpdate, Transaction, TransactionStatus, WebhookEvent,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction {reference} is {current}, cannot move to {requested}")]
    InvalidTransition {
        reference: String,
        current: TransactionStatus,
        requested: TransactionStatus,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            other => RepositoryError::Persistence(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of a conditional terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// This call moved the row out of `initiated`.
    Applied(Transaction),
    /// The row was already terminal; nothing was written.
    AlreadyTerminal(Transaction),
}

impl Transition {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Transition::Applied(tx) | Transition::AlreadyTerminal(tx) => tx,
        }
    }
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn find_by_checkout_reference(&self, reference: &str) -> RepositoryResult<Transaction>;

    /// Moves the `initiated` row with this reference to the update's terminal status.
    /// Must be atomic: concurrent callers for one reference see exactly one `Applied`.
    async fn transition_by_checkout_reference(
        &self,
        reference: &str,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transition>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn record(&self, event: &NewWebhookEvent) -> RepositoryResult<WebhookEvent>;
}
