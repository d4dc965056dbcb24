//! Transaction domain entity.
//! Framework-agnostic representation of an onramp and its status machine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Initiated,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// `confirmed` and `failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Initiated) | (Initiated, Confirmed) | (Initiated, Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "initiated" => Ok(TransactionStatus::Initiated),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TransactionKind {
    #[serde(rename = "onramp")]
    Onramp,
    #[serde(rename = "card-onramp")]
    CardOnramp,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Onramp => "onramp",
            TransactionKind::CardOnramp => "card-onramp",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onramp" => Ok(TransactionKind::Onramp),
            "card-onramp" => Ok(TransactionKind::CardOnramp),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// Domain entity representing a persisted onramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub phone: String,
    pub destination_account: String,
    pub kind: TransactionKind,
    #[schema(value_type = String)]
    pub amount_source: BigDecimal,
    #[schema(value_type = String)]
    pub amount_settlement: BigDecimal,
    #[schema(value_type = String)]
    pub exchange_rate: BigDecimal,
    pub status: TransactionStatus,
    pub checkout_reference: Option<String>,
    pub merchant_reference: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub failure_reason: Option<String>,
    pub settlement_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction before the store has assigned its id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub phone: String,
    pub destination_account: String,
    pub kind: TransactionKind,
    pub amount_source: BigDecimal,
    pub amount_settlement: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub status: TransactionStatus,
    pub checkout_reference: Option<String>,
    pub merchant_reference: Option<String>,
}

impl NewTransaction {
    /// An onramp whose push has been accepted by the gateway.
    pub fn initiated_onramp(
        phone: String,
        destination_account: String,
        amount_source: BigDecimal,
        amount_settlement: BigDecimal,
        exchange_rate: BigDecimal,
        checkout_reference: String,
        merchant_reference: Option<String>,
    ) -> Self {
        Self {
            phone,
            destination_account,
            kind: TransactionKind::Onramp,
            amount_source,
            amount_settlement,
            exchange_rate,
            status: TransactionStatus::Initiated,
            checkout_reference: Some(checkout_reference),
            merchant_reference,
        }
    }
}

/// The only terminal changes a callback may request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Confirm { receipt: String },
    Fail { reason: String },
}

impl StatusUpdate {
    pub fn target(&self) -> TransactionStatus {
        match self {
            StatusUpdate::Confirm { .. } => TransactionStatus::Confirmed,
            StatusUpdate::Fail { .. } => TransactionStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Initiated.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_only_initiated_rows_reach_terminal_states() {
        use TransactionStatus::*;
        assert!(Initiated.can_transition_to(Confirmed));
        assert!(Initiated.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Initiated));

        assert!(!Pending.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Initiated,
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("completed".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_kind_serializes_with_hyphen() {
        let json = serde_json::to_string(&TransactionKind::CardOnramp).unwrap();
        assert_eq!(json, "\"card-onramp\"");
        assert_eq!("card-onramp".parse::<TransactionKind>(), Ok(TransactionKind::CardOnramp));
    }

    #[test]
    fn test_status_update_target() {
        let confirm = StatusUpdate::Confirm { receipt: "NLJ7RT61SV".to_string() };
        let fail = StatusUpdate::Fail { reason: "Request cancelled by user".to_string() };
        assert_eq!(confirm.target(), TransactionStatus::Confirmed);
        assert_eq!(fail.target(), TransactionStatus::Failed);
    }
}
