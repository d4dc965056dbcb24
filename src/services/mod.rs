pub mod onramp;
pub mod reconciler;
pub mod settlement;

pub use onramp::{OnrampError, OnrampOrchestrator, OnrampReceipt, OnrampRequest};
pub use reconciler::{ReconcileError, ReconcileOutcome, WebhookReconciler};
pub use settlement::{run_settlement_listener, settlement_channel, SettlementRequested};
