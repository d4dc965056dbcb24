//! Onramp orchestration: validate, push, price, persist.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::{NewTransaction, Transaction};
use crate::gateway::{GatewayError, PushAck, PushGateway, PushRequest};
use crate::ports::{RepositoryError, TransactionRepository};
use crate::pricing::{convert, RateProvider};
use crate::utils::sanitize::mask_phone;
use crate::validation::{
    msisdn_number, normalize_msisdn, validate_destination_account, validate_push_amount,
    ValidationError,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OnrampRequest {
    pub phone: String,
    pub amount_source: f64,
    pub destination_account: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OnrampReceipt {
    pub transaction: Transaction,
    pub gateway_ack: PushAck,
}

#[derive(Error, Debug)]
pub enum OnrampError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Gateway rejected push ({code}): {description}")]
    GatewayRejected { code: String, description: String },

    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

pub struct OnrampOrchestrator {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PushGateway>,
    rates: Arc<dyn RateProvider>,
    callback_url: String,
}

impl OnrampOrchestrator {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        gateway: Arc<dyn PushGateway>,
        rates: Arc<dyn RateProvider>,
        callback_url: String,
    ) -> Self {
        Self {
            transactions,
            gateway,
            rates,
            callback_url,
        }
    }

    pub async fn initiate(&self, request: OnrampRequest) -> Result<OnrampReceipt, OnrampError> {
        let phone = normalize_msisdn(&request.phone)?;
        let amount = validate_push_amount(request.amount_source)?;
        let destination_account = validate_destination_account(&request.destination_account)?;
        let masked_phone = mask_phone(&phone);

        let push = PushRequest {
            phone: msisdn_number(&phone)?,
            amount,
            callback_url: self.callback_url.clone(),
        };

        let ack = self.gateway.initiate_push(&push).await.map_err(|e| {
            tracing::error!(error = %e, amount, phone = %masked_phone, "STK push failed");
            e
        })?;

        if !ack.is_accepted() {
            tracing::warn!(
                response_code = %ack.response_code,
                description = %ack.response_description,
                amount,
                phone = %masked_phone,
                "STK push rejected by gateway"
            );
            return Err(OnrampError::GatewayRejected {
                code: ack.response_code,
                description: ack.response_description,
            });
        }

        // Captured once; the row keeps this rate for good.
        let rate = self.rates.resolve_rate().await;
        let amount_source = BigDecimal::from(amount);
        let amount_settlement = convert(&amount_source, &rate);

        let new_tx = NewTransaction::initiated_onramp(
            phone,
            destination_account,
            amount_source,
            amount_settlement,
            rate,
            ack.checkout_request_id.clone(),
            Some(ack.merchant_request_id.clone()).filter(|id| !id.is_empty()),
        );

        let transaction = self.transactions.create(&new_tx).await.map_err(|e| {
            // The payer has already been prompted; this row must be reconciled by hand.
            tracing::error!(
                error = %e,
                checkout_reference = %ack.checkout_request_id,
                merchant_reference = %ack.merchant_request_id,
                amount,
                phone = %masked_phone,
                "Failed to record initiated onramp after successful push"
            );
            e
        })?;

        tracing::info!(
            transaction_id = %transaction.id,
            checkout_reference = %ack.checkout_request_id,
            amount,
            amount_settlement = %transaction.amount_settlement,
            exchange_rate = %transaction.exchange_rate,
            "Onramp initiated"
        );

        Ok(OnrampReceipt {
            transaction,
            gateway_ack: ack,
        })
    }
}
