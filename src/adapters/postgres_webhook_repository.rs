//! Postgres implementation of WebhookRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewWebhookEvent, WebhookEvent};
use crate::ports::{RepositoryError, RepositoryResult, WebhookRepository};

#[derive(Clone)]
pub struct PostgresWebhookRepository {
    pool: PgPool,
}

impl PostgresWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for PostgresWebhookRepository {
    async fn record(&self, event: &NewWebhookEvent) -> RepositoryResult<WebhookEvent> {
        let row = sqlx::query_as::<_, WebhookRow>(
            r#"
            INSERT INTO webhooks (
                transaction_id, source, checkout_reference, payload, status_code, received_at, processed
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, transaction_id, source, checkout_reference, payload, status_code,
                received_at, processed
            "#,
        )
        .bind(event.transaction_id)
        .bind(&event.source)
        .bind(&event.checkout_reference)
        .bind(&event.payload)
        .bind(event.status_code)
        .bind(event.received_at)
        .bind(event.processed)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.into_domain())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    transaction_id: Option<Uuid>,
    source: String,
    checkout_reference: Option<String>,
    payload: serde_json::Value,
    status_code: i32,
    received_at: chrono::DateTime<chrono::Utc>,
    processed: bool,
}

impl WebhookRow {
    fn into_domain(self) -> WebhookEvent {
        WebhookEvent {
            id: self.id,
            transaction_id: self.transaction_id,
            source: self.source,
            checkout_reference: self.checkout_reference,
            payload: self.payload,
            status_code: self.status_code,
            received_at: self.received_at,
            processed: self.processed,
        }
    }
}
