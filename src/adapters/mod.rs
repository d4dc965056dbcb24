pub mod memory;
pub mod postgres_transaction_repository;
pub mod postgres_webhook_repository;

pub use memory::{InMemoryTransactionRepository, InMemoryWebhookRepository};
pub use postgres_transaction_repository::PostgresTransactionRepository;
pub use postgres_webhook_repository::PostgresWebhookRepository;
