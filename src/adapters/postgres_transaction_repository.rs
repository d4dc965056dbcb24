//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewTransaction, StatusUpdate, Transaction};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository, Transition};

macro_rules! transaction_columns {
    () => {
        "id, phone, destination_account, kind, amount_source, amount_settlement, exchange_rate, \
         status, checkout_reference, merchant_reference, mpesa_receipt_number, failure_reason, \
         settlement_tx_id, created_at, updated_at"
    };
}

/// Postgres-backed transaction ledger.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(concat!(
            r#"
            INSERT INTO transactions (
                phone, destination_account, kind, amount_source, amount_settlement,
                exchange_rate, status, checkout_reference, merchant_reference
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING "#,
            transaction_columns!()
        ))
        .bind(&tx.phone)
        .bind(&tx.destination_account)
        .bind(tx.kind.as_str())
        .bind(&tx.amount_source)
        .bind(&tx.amount_settlement)
        .bind(&tx.exchange_rate)
        .bind(tx.status.as_str())
        .bind(&tx.checkout_reference)
        .bind(&tx.merchant_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn find_by_checkout_reference(&self, reference: &str) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE checkout_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("checkout reference {}", reference)))?
            .into_domain()
    }

    async fn transition_by_checkout_reference(
        &self,
        reference: &str,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transition> {
        let (receipt, reason) = match update {
            StatusUpdate::Confirm { receipt } => (Some(receipt.as_str()), None),
            StatusUpdate::Fail { reason } => (None, Some(reason.as_str())),
        };

        let mut db_tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // Row lock + status predicate: concurrent deliveries re-check status after
        // the first commit and match nothing.
        let updated = sqlx::query_as::<_, TransactionRow>(concat!(
            r#"
            UPDATE transactions
            SET status = $2, mpesa_receipt_number = $3, failure_reason = $4, updated_at = NOW()
            WHERE checkout_reference = $1 AND status = 'initiated'
            RETURNING "#,
            transaction_columns!()
        ))
        .bind(reference)
        .bind(update.target().as_str())
        .bind(receipt)
        .bind(reason)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(RepositoryError::from)?;

        if let Some(row) = updated {
            db_tx.commit().await.map_err(RepositoryError::from)?;
            return Ok(Transition::Applied(row.into_domain()?));
        }

        let existing = sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE checkout_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(RepositoryError::from)?;

        db_tx.commit().await.map_err(RepositoryError::from)?;

        let existing = existing
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout reference {}", reference)))?
            .into_domain()?;

        if existing.status.is_terminal() {
            Ok(Transition::AlreadyTerminal(existing))
        } else {
            Err(RepositoryError::InvalidTransition {
                reference: reference.to_string(),
                current: existing.status,
                requested: update.target(),
            })
        }
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    phone: String,
    destination_account: String,
    kind: String,
    amount_source: bigdecimal::BigDecimal,
    amount_settlement: bigdecimal::BigDecimal,
    exchange_rate: bigdecimal::BigDecimal,
    status: String,
    checkout_reference: Option<String>,
    merchant_reference: Option<String>,
    mpesa_receipt_number: Option<String>,
    failure_reason: Option<String>,
    settlement_tx_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            phone: self.phone,
            destination_account: self.destination_account,
            kind: self.kind.parse().map_err(RepositoryError::Persistence)?,
            amount_source: self.amount_source,
            amount_settlement: self.amount_settlement,
            exchange_rate: self.exchange_rate,
            status: self.status.parse().map_err(RepositoryError::Persistence)?,
            checkout_reference: self.checkout_reference,
            merchant_reference: self.merchant_reference,
            mpesa_receipt_number: self.mpesa_receipt_number,
            failure_reason: self.failure_reason,
            settlement_tx_id: self.settlement_tx_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
