//! Integration tests for the payment event pump

use std::sync::Arc;

use invoice_events::backend::{WebhookRequest, WebhookWallet};
use invoice_events::payments::NewPayment;
use invoice_events::pump::SkipReason;
use invoice_events::{
    ListenerRegistry, Notifier, PaymentEventPump, PumpOutcome, PumpSummary, WebhookRelay,
};
use tokio::sync::mpsc;

mod common;

use common::{
    assert_quiet, recv_n, setup_test_stores, BrokenSqlListener, FailingListener, PanickingListener,
    RecordingListener, ScriptedBackend, TestStores,
};

fn recording(
    listeners: &ListenerRegistry,
    extension_ids: &[&str],
) -> mpsc::UnboundedReceiver<(String, invoice_events::Payment)> {
    let (tx, rx) = mpsc::unbounded_channel();
    for id in extension_ids {
        listeners.register(
            *id,
            Arc::new(RecordingListener {
                extension_id: id.to_string(),
                deliveries: tx.clone(),
            }),
        );
    }
    rx
}

fn pump_for(
    stores: &TestStores,
    ids: &[&str],
    listeners: Arc<ListenerRegistry>,
) -> PaymentEventPump {
    let notifier = Notifier::new(listeners, stores.connections.clone());
    PaymentEventPump::new(
        Arc::new(ScriptedBackend::new(ids)),
        stores.connections.clone(),
        notifier,
    )
}

#[tokio::test]
async fn test_settlement_notifies_every_listener_once() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("abc123", "wallet1", 50_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp", "withdraw", "tipjar"]);

    let summary = pump_for(&stores, &["abc123"], listeners).run().await.unwrap();
    assert_eq!(summary.settled, 1);

    let mut deliveries = recv_n(&mut rx, 3).await;
    deliveries.sort_by(|a, b| a.0.cmp(&b.0));
    let extensions: Vec<&str> = deliveries.iter().map(|(ext, _)| ext.as_str()).collect();
    assert_eq!(extensions, vec!["lnurlp", "tipjar", "withdraw"]);

    for (_, payment) in &deliveries {
        assert_eq!(payment.checking_id, "abc123");
        assert_eq!(payment.amount_msat, 50_000);
        assert!(!payment.pending);
    }
    assert_quiet(&mut rx).await;

    assert!(!stores.payment("abc123").await.unwrap().pending);
    assert_eq!(stores.received_count("lnurlp").await, 1);
    assert_eq!(stores.received_count("withdraw").await, 1);
    assert_eq!(stores.received_count("tipjar").await, 1);
}

#[tokio::test]
async fn test_redelivered_checking_id_is_noop() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("abc123", "wallet1", 50_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp", "withdraw"]);

    let summary = pump_for(&stores, &["abc123", "abc123"], listeners)
        .run()
        .await
        .unwrap();

    assert_eq!(
        summary,
        PumpSummary {
            received: 2,
            settled: 1,
            skipped: 1,
            failed: 0,
        }
    );

    recv_n(&mut rx, 2).await;
    assert_quiet(&mut rx).await;
    assert_eq!(stores.received_count("lnurlp").await, 1);
}

#[tokio::test]
async fn test_unknown_checking_id_does_not_stop_the_pump() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("known", "wallet1", 1_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp"]);

    let summary = pump_for(&stores, &["ghost", "known"], listeners)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.received, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.settled, 1);

    let deliveries = recv_n(&mut rx, 1).await;
    assert_eq!(deliveries[0].1.checking_id, "known");
}

#[tokio::test]
async fn test_outgoing_payment_is_not_announced() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("paid-out", "wallet1", -7_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp"]);
    let pump = pump_for(&stores, &[], listeners);

    let outcome = pump.process("paid-out").await.unwrap();
    assert!(matches!(outcome, PumpOutcome::Skipped(SkipReason::Outgoing)));

    // Outgoing payments keep their pending flag; settling them is another path's job
    assert!(stores.payment("paid-out").await.unwrap().pending);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_failing_listeners_do_not_affect_siblings_or_pump() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("first", "wallet1", 1_000)).await;
    stores.seed(NewPayment::new("second", "wallet1", 2_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    listeners.register("down", Arc::new(FailingListener));
    listeners.register("buggy", Arc::new(PanickingListener));
    let mut rx = recording(&listeners, &["healthy"]);

    let notifier = Notifier::new(listeners, stores.connections.clone());
    let mut failures = notifier.subscribe_failures();
    let pump = PaymentEventPump::new(
        Arc::new(ScriptedBackend::new(&["first", "second"])),
        stores.connections.clone(),
        notifier,
    );

    let summary = pump.run().await.unwrap();
    assert_eq!(summary.settled, 2);
    assert_eq!(summary.failed, 0);

    let mut delivered: Vec<String> = recv_n(&mut rx, 2)
        .await
        .into_iter()
        .map(|(_, payment)| payment.checking_id)
        .collect();
    delivered.sort();
    assert_eq!(delivered, vec!["first".to_string(), "second".to_string()]);

    let mut reported = Vec::new();
    for _ in 0..4 {
        let failure = tokio::time::timeout(std::time::Duration::from_secs(5), failures.recv())
            .await
            .unwrap()
            .unwrap();
        reported.push((failure.extension_id, failure.panicked));
    }
    reported.sort();
    assert_eq!(
        reported,
        vec![
            ("buggy".to_string(), true),
            ("buggy".to_string(), true),
            ("down".to_string(), false),
            ("down".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_statement_error_in_listener_leaves_no_partial_writes() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("abc123", "wallet1", 1_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    listeners.register("broken", Arc::new(BrokenSqlListener));
    let pump = pump_for(&stores, &[], listeners);

    let dispatch = match pump.process("abc123").await.unwrap() {
        PumpOutcome::Settled { dispatch, .. } => dispatch,
        other => panic!("expected settlement, got {:?}", other),
    };

    let report = dispatch.wait().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].message.contains("no_such_table"));

    assert_eq!(stores.received_count("broken").await, 0);
    // The main-store transition is independent of listener outcomes
    assert!(!stores.payment("abc123").await.unwrap().pending);
}

#[tokio::test]
async fn test_concurrent_pumps_settle_once() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("abc123", "wallet1", 1_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp"]);

    let first = pump_for(&stores, &[], listeners.clone());
    let second = pump_for(&stores, &[], listeners);

    let (a, b) = tokio::join!(first.process("abc123"), second.process("abc123"));
    let settled = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|outcome| matches!(outcome, PumpOutcome::Settled { .. }))
        .count();

    assert_eq!(settled, 1);
    recv_n(&mut rx, 1).await;
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_webhook_driven_backend_end_to_end() {
    let stores = setup_test_stores().await;
    stores.seed(NewPayment::new("live-1", "wallet1", 3_000)).await;

    let listeners = Arc::new(ListenerRegistry::new());
    let mut rx = recording(&listeners, &["lnurlp"]);

    let wallet = Arc::new(WebhookWallet::new());
    let relay = WebhookRelay::new(wallet.clone());
    let notifier = Notifier::new(listeners, stores.connections.clone());
    let pump = PaymentEventPump::new(wallet, stores.connections.clone(), notifier).start();

    // Buffered in the wallet's channel until the pump takes the stream
    relay
        .relay(WebhookRequest::new(br#"{"checking_id":"live-1"}"#.to_vec()))
        .await
        .unwrap();

    let deliveries = recv_n(&mut rx, 1).await;
    assert_eq!(deliveries[0].1.checking_id, "live-1");
    assert!(!pump.is_finished());

    pump.abort();
}
