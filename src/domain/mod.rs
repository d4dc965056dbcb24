pub mod transaction;
pub mod webhook;

pub use transaction::{NewTransaction, StatusUpdate, Transaction, TransactionKind, TransactionStatus};
pub use webhook::{NewWebhookEvent, WebhookEvent};
