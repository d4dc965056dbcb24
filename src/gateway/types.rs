//! Daraja wire formats: credential exchange, STK push, and the asynchronous callback.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

pub const ACCEPTED_RESPONSE_CODE: &str = "0";
pub const RECEIPT_ITEM: &str = "MpesaReceiptNumber";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationResponse {
    pub access_token: String,
    /// Seconds, sent as a string by Daraja.
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
}

impl AuthorizationResponse {
    pub fn expires_in_secs(&self) -> u64 {
        match &self.expires_in {
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: u64,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,
    pub amount: u64,
    pub party_a: u64,
    pub party_b: u64,
    pub phone_number: u64,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Synchronous acknowledgment of a push. `ResponseCode == "0"` only means the
/// prompt was sent to the payer's handset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PushAck {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    pub response_code: String,
    #[serde(default)]
    pub response_description: String,
    #[serde(default)]
    pub customer_message: String,
}

impl PushAck {
    pub fn is_accepted(&self) -> bool {
        self.response_code.trim() == ACCEPTED_RESPONSE_CODE
    }
}

/// Error body Daraja returns instead of an ack, e.g. for an invalid phone number.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayErrorBody {
    #[serde(default)]
    pub request_id: String,
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
}

impl GatewayErrorBody {
    /// Daraja reports an expired or revoked bearer token under `404.001.*`.
    pub fn is_invalid_token(&self) -> bool {
        self.error_code.starts_with("404.001")
    }

    pub fn into_ack(self) -> PushAck {
        PushAck {
            merchant_request_id: String::new(),
            checkout_request_id: String::new(),
            response_code: self.error_code,
            response_description: self.error_message,
            customer_message: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: String,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl CallbackMetadata {
    /// Items keyed by name. Items without a value are dropped.
    pub fn by_name(&self) -> HashMap<&str, &serde_json::Value> {
        self.items
            .iter()
            .filter_map(|item| item.value.as_ref().map(|v| (item.name.as_str(), v)))
            .collect()
    }

    /// Reads a named item as text; numeric values are rendered without quotes.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.by_name().get(name)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.text(RECEIPT_ITEM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_request_uses_daraja_field_names() {
        let request = StkPushRequest {
            business_short_code: 174379,
            password: "cGFzcw==".to_string(),
            timestamp: "20240101120000".to_string(),
            transaction_type: "CustomerPayBillOnline",
            amount: 1000,
            party_a: 254712345678,
            party_b: 174379,
            phone_number: 254712345678,
            callback_url: "https://example.com/webhooks/mpesa".to_string(),
            account_reference: "NHXWALLET".to_string(),
            transaction_desc: "USDC Purchase".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["BusinessShortCode"], 174379);
        assert_eq!(value["PartyA"], 254712345678u64);
        assert_eq!(value["CallBackURL"], "https://example.com/webhooks/mpesa");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
    }

    #[test]
    fn test_metadata_receipt_read_by_name_not_position() {
        let metadata: CallbackMetadata = serde_json::from_value(json!({
            "Item": [
                {"Name": "Amount", "Value": 1000},
                {"Name": "TransactionDate", "Value": 20191219102115u64},
                {"Name": "Balance"},
                {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                {"Name": "PhoneNumber", "Value": 254708374149u64}
            ]
        }))
        .unwrap();

        assert_eq!(metadata.receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(metadata.text("Amount").as_deref(), Some("1000"));
        assert_eq!(metadata.text("Balance"), None);
    }

    #[test]
    fn test_missing_receipt_is_none() {
        let metadata: CallbackMetadata =
            serde_json::from_value(json!({"Item": [{"Name": "Amount", "Value": 1}]})).unwrap();
        assert_eq!(metadata.receipt_number(), None);
    }

    #[test]
    fn test_expires_in_accepts_string_or_number() {
        let as_string: AuthorizationResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": "3599"})).unwrap();
        let as_number: AuthorizationResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": 3599})).unwrap();
        let absent: AuthorizationResponse =
            serde_json::from_value(json!({"access_token": "t"})).unwrap();
        assert_eq!(as_string.expires_in_secs(), 3599);
        assert_eq!(as_number.expires_in_secs(), 3599);
        assert_eq!(absent.expires_in_secs(), 0);
    }

    #[test]
    fn test_error_body_becomes_rejected_ack() {
        let body: GatewayErrorBody = serde_json::from_value(json!({
            "requestId": "1234-5678",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        }))
        .unwrap();
        assert!(!body.is_invalid_token());
        let ack = body.into_ack();
        assert!(!ack.is_accepted());
        assert_eq!(ack.response_code, "400.002.02");
    }
}
