mod common;

use std::sync::Arc;

use common::{failure_callback, success_callback, Harness, StubGateway, CHECKOUT_REFERENCE};
use onramp_core::domain::{Transaction, TransactionStatus};
use onramp_core::ports::TransactionRepository;
use onramp_core::services::{OnrampRequest, ReconcileError, ReconcileOutcome};

async fn initiated(harness: &Harness) -> Transaction {
    harness
        .onramp
        .initiate(OnrampRequest {
            phone: "0712345678".to_string(),
            amount_source: 1000.0,
            destination_account: "0.0.4515756".to_string(),
        })
        .await
        .unwrap()
        .transaction
}

fn bytes(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

#[tokio::test]
async fn test_success_callback_confirms_with_receipt() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    let outcome = harness
        .reconciler
        .handle_callback(&bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV")))
        .await
        .unwrap();

    match outcome {
        ReconcileOutcome::Confirmed(confirmed) => {
            assert_eq!(confirmed.id, tx.id);
            assert_eq!(confirmed.status, TransactionStatus::Confirmed);
            assert_eq!(confirmed.mpesa_receipt_number.as_deref(), Some("NLJ7RT61SV"));
            assert!(confirmed.failure_reason.is_none());
        }
        other => panic!("expected Confirmed, got {:?}", other),
    }

    let stored = harness.transactions.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Confirmed);
}

#[tokio::test]
async fn test_cancelled_callback_fails_with_description() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    let outcome = harness
        .reconciler
        .handle_callback(&bytes(failure_callback(
            CHECKOUT_REFERENCE,
            1032,
            "Request cancelled by user",
        )))
        .await
        .unwrap();

    assert_eq!(outcome.status_code().as_u16(), 400);
    match outcome {
        ReconcileOutcome::Failed {
            transaction,
            description,
        } => {
            assert_eq!(transaction.id, tx.id);
            assert_eq!(transaction.status, TransactionStatus::Failed);
            assert!(transaction.mpesa_receipt_number.is_none());
            assert_eq!(
                transaction.failure_reason.as_deref(),
                Some("Request cancelled by user")
            );
            assert_eq!(description, "Request cancelled by user");
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redelivered_callback_is_acknowledged_without_mutation() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    initiated(&harness).await;
    let payload = bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV"));

    let first = harness.reconciler.handle_callback(&payload).await.unwrap();
    let second = harness.reconciler.handle_callback(&payload).await.unwrap();

    let confirmed = match first {
        ReconcileOutcome::Confirmed(tx) => tx,
        other => panic!("expected Confirmed, got {:?}", other),
    };
    match second {
        ReconcileOutcome::Duplicate(tx) => assert_eq!(tx, confirmed),
        other => panic!("expected Duplicate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_terminal_callback_wins() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    harness
        .reconciler
        .handle_callback(&bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV")))
        .await
        .unwrap();
    let late_failure = harness
        .reconciler
        .handle_callback(&bytes(failure_callback(CHECKOUT_REFERENCE, 1, "Insufficient funds")))
        .await
        .unwrap();

    assert!(matches!(late_failure, ReconcileOutcome::Duplicate(_)));
    let stored = harness.transactions.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Confirmed);
    assert_eq!(stored.mpesa_receipt_number.as_deref(), Some("NLJ7RT61SV"));
    assert!(stored.failure_reason.is_none());
}

#[tokio::test]
async fn test_failure_then_success_keeps_failed() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;
    let mut settlements = harness.reconciler.subscribe();

    let first = harness
        .reconciler
        .handle_callback(&bytes(failure_callback(
            CHECKOUT_REFERENCE,
            1032,
            "Request cancelled by user",
        )))
        .await
        .unwrap();
    let late_success = harness
        .reconciler
        .handle_callback(&bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV")))
        .await
        .unwrap();

    assert!(matches!(first, ReconcileOutcome::Failed { .. }));
    match late_success {
        ReconcileOutcome::Duplicate(tx) => assert_eq!(tx.status, TransactionStatus::Failed),
        other => panic!("expected Duplicate, got {:?}", other),
    }

    let stored = harness.transactions.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("Request cancelled by user"));
    assert!(stored.mpesa_receipt_number.is_none());
    assert!(settlements.try_recv().is_err());
}

#[tokio::test]
async fn test_padded_reference_is_audited_trimmed() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    let padded = format!("  {}\n", CHECKOUT_REFERENCE);
    let outcome = harness
        .reconciler
        .handle_callback(&bytes(success_callback(&padded, "NLJ7RT61SV")))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Confirmed(_)));
    let events = harness.webhooks.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].checkout_reference.as_deref(), Some(CHECKOUT_REFERENCE));
    assert_eq!(events[0].transaction_id, Some(tx.id));
}

#[tokio::test]
async fn test_unknown_reference_is_acknowledged() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));

    let outcome = harness
        .reconciler
        .handle_callback(&bytes(success_callback("ws_CO_unknown", "NLJ7RT61SV")))
        .await
        .unwrap();

    assert_eq!(outcome.status_code().as_u16(), 200);
    assert_eq!(
        outcome,
        ReconcileOutcome::UnknownReference {
            checkout_reference: "ws_CO_unknown".to_string()
        }
    );
}

#[tokio::test]
async fn test_success_without_receipt_leaves_ledger_untouched() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    let mut payload = success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV");
    payload["Body"]["stkCallback"]["CallbackMetadata"]["Item"]
        .as_array_mut()
        .unwrap()
        .retain(|item| item["Name"] != "MpesaReceiptNumber");

    let err = harness
        .reconciler
        .handle_callback(&bytes(payload))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingMetadata("MpesaReceiptNumber")));
    let stored = harness.transactions.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Initiated);
}

#[tokio::test]
async fn test_malformed_callback_is_rejected() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    for raw in [&b"not json"[..], br#"{"Body":{}}"#, br#"{"Body":{"stkCallback":{"CheckoutRequestID":"   ","ResultCode":0}}}"#] {
        let err = harness.reconciler.handle_callback(raw).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Malformed(_)), "got {:?}", err);
        assert_eq!(err.status_code().as_u16(), 400);
    }

    let stored = harness.transactions.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Initiated);
}

#[tokio::test]
async fn test_every_delivery_is_audited() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;

    harness
        .reconciler
        .handle_callback(&bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV")))
        .await
        .unwrap();
    harness
        .reconciler
        .handle_callback(&bytes(success_callback("ws_CO_unknown", "ABC123")))
        .await
        .unwrap();
    let _ = harness.reconciler.handle_callback(b"garbage").await;

    let events = harness.webhooks.events().await;
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].transaction_id, Some(tx.id));
    assert_eq!(events[0].checkout_reference.as_deref(), Some(CHECKOUT_REFERENCE));
    assert_eq!(events[0].status_code, 200);
    assert!(events[0].processed);

    assert_eq!(events[1].transaction_id, None);
    assert_eq!(events[1].checkout_reference.as_deref(), Some("ws_CO_unknown"));
    assert!(!events[1].processed);

    assert_eq!(events[2].status_code, 400);
    assert_eq!(events[2].payload, serde_json::Value::String("garbage".to_string()));
}

#[tokio::test]
async fn test_confirmation_requests_settlement_once() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    let tx = initiated(&harness).await;
    let mut settlements = harness.reconciler.subscribe();
    let payload = bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV"));

    harness.reconciler.handle_callback(&payload).await.unwrap();
    harness.reconciler.handle_callback(&payload).await.unwrap();

    let request = settlements.try_recv().unwrap();
    assert_eq!(request.transaction_id, tx.id);
    assert_eq!(request.destination_account, "0.0.4515756");
    assert_eq!(request.amount_settlement, tx.amount_settlement);
    assert_eq!(request.mpesa_receipt_number.as_deref(), Some("NLJ7RT61SV"));
    assert!(settlements.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_payment_requests_no_settlement() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    initiated(&harness).await;
    let mut settlements = harness.reconciler.subscribe();

    harness
        .reconciler
        .handle_callback(&bytes(failure_callback(CHECKOUT_REFERENCE, 2001, "Wrong PIN")))
        .await
        .unwrap();

    assert!(settlements.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_confirm_exactly_once() {
    let harness = Harness::new(StubGateway::accepting(CHECKOUT_REFERENCE));
    initiated(&harness).await;
    let payload = Arc::new(bytes(success_callback(CHECKOUT_REFERENCE, "NLJ7RT61SV")));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let reconciler = harness.reconciler.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move {
            reconciler.handle_callback(&payload).await
        }));
    }

    let mut confirmed = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ReconcileOutcome::Confirmed(_) => confirmed += 1,
            ReconcileOutcome::Duplicate(_) => duplicates += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(duplicates, 15);
}
