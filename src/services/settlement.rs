use bigdecimal::BigDecimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::Transaction;

/// Capacity of the settlement hook channel.
pub const SETTLEMENT_CHANNEL_CAPACITY: usize = 256;

/// Emitted once per confirmed onramp. The on-chain transfer itself is not wired yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementRequested {
    pub transaction_id: Uuid,
    pub destination_account: String,
    pub amount_settlement: BigDecimal,
    pub mpesa_receipt_number: Option<String>,
}

impl SettlementRequested {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            destination_account: tx.destination_account.clone(),
            amount_settlement: tx.amount_settlement.clone(),
            mpesa_receipt_number: tx.mpesa_receipt_number.clone(),
        }
    }
}

pub fn settlement_channel() -> broadcast::Sender<SettlementRequested> {
    let (tx, _rx) = broadcast::channel(SETTLEMENT_CHANNEL_CAPACITY);
    tx
}

/// Drains the settlement hook, logging each request until a settlement backend exists.
pub async fn run_settlement_listener(mut rx: broadcast::Receiver<SettlementRequested>) {
    tracing::info!("Settlement listener started");

    loop {
        match rx.recv().await {
            Ok(request) => tracing::info!(
                transaction_id = %request.transaction_id,
                destination_account = %request.destination_account,
                amount_settlement = %request.amount_settlement,
                "Settlement requested; on-chain transfer deferred"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Settlement listener lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    tracing::info!("Settlement listener stopped");
}
