use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::*;
use crate::test_utils::FakeLedger;
use crate::ResourceCounters;
use crate::RetryPolicies;
use crate::RpcError;
use crate::Watermark;

fn sig(
    signature: &str,
    slot: u64,
) -> SignatureInfo {
    SignatureInfo {
        signature: signature.to_string(),
        slot,
        failed: false,
        block_time: None,
    }
}

fn adapter(client: Arc<dyn LedgerClient>) -> RetryingRpcAdapter {
    RetryingRpcAdapter::new(client, Arc::new(ResourceCounters::new()), RetryPolicies::default(), 20)
}

#[tokio::test(start_paused = true)]
async fn test_registration_retries_twice_then_succeeds() {
    let start = Instant::now();
    let attempts_at = Arc::new(Mutex::new(Vec::new()));

    let mut client = MockLedgerClient::new();
    let attempts = attempts_at.clone();
    client
        .expect_get_signatures_since()
        .times(3)
        .returning(move |_, until, limit| {
            assert!(until.is_none());
            assert_eq!(limit, 1);
            let mut attempts = attempts.lock();
            attempts.push(start.elapsed());
            if attempts.len() < 3 {
                Err(RpcError::Transport("connection reset".to_string()))
            } else {
                Ok(vec![sig("s7", 70)])
            }
        });
    client.expect_get_balance().times(1).returning(|_| Ok(500));

    let adapter = adapter(Arc::new(client));
    let snapshot = adapter.registration_snapshot("addr1").await.unwrap();

    assert_eq!(snapshot.watermark, Watermark::tx("s7", 70));
    assert_eq!(snapshot.balance, 500);
    assert_eq!(
        *attempts_at.lock(),
        vec![
            Duration::from_secs(0),
            Duration::from_secs(2),
            Duration::from_secs(6)
        ]
    );
    assert_eq!(adapter.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_registration_gives_up_after_three_attempts() {
    let mut client = MockLedgerClient::new();
    client
        .expect_get_signatures_since()
        .times(3)
        .returning(|_, _, _| Err(RpcError::Transport("down".to_string())));
    client.expect_get_balance().never();

    let adapter = adapter(Arc::new(client));
    match adapter.registration_snapshot("addr1").await {
        Err(RpcError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(adapter.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_registrations_leave_no_live_timers() {
    let mut client = MockLedgerClient::new();
    client
        .expect_get_signatures_since()
        .times(10)
        .returning(|_, _, _| Ok(vec![]));
    client.expect_get_balance().times(10).returning(|_| Ok(0));

    let adapter = adapter(Arc::new(client));
    let addresses: Vec<String> = (0..10).map(|i| format!("addr{i}")).collect();
    let results = join_all(addresses.iter().map(|a| adapter.registration_snapshot(a))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(adapter.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timer_is_live_only_while_call_is_in_flight() {
    let ledger = FakeLedger::new();
    ledger.set_latency(Duration::from_secs(1));
    let adapter = Arc::new(adapter(ledger.clone()));

    let in_flight = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.fetch_balance("addr1").await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(adapter.live_timers(), 1);

    in_flight.await.unwrap().unwrap();
    assert_eq!(adapter.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_call_times_out_once_without_retry() {
    let ledger = FakeLedger::new();
    ledger.set_latency(Duration::from_secs(60));
    let adapter = adapter(ledger.clone());

    let err = adapter
        .fetch_new_transactions("addr1", &Watermark::Empty)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(ledger.signature_calls(), 1);
    assert_eq!(adapter.live_timers(), 0);
}

#[tokio::test]
async fn test_fetch_new_transactions_from_watermark() {
    let ledger = FakeLedger::new();
    ledger.push_tx("addr1", "s1", 10);
    ledger.push_tx("addr1", "s2", 11);
    ledger.push_tx("addr1", "s3", 12);
    let adapter = adapter(ledger.clone());

    let (txs, watermark) = adapter
        .fetch_new_transactions("addr1", &Watermark::tx("s1", 10))
        .await
        .unwrap();

    let sigs: Vec<_> = txs.iter().map(|t| t.signature.as_str()).collect();
    assert_eq!(sigs, vec!["s3", "s2"]);
    assert_eq!(watermark, Watermark::tx("s3", 12));
}

#[tokio::test]
async fn test_fetch_new_transactions_without_news_keeps_watermark() {
    let ledger = FakeLedger::new();
    ledger.push_tx("addr1", "s1", 10);
    let adapter = adapter(ledger.clone());

    let since = Watermark::tx("s1", 10);
    let (txs, watermark) = adapter.fetch_new_transactions("addr1", &since).await.unwrap();
    assert!(txs.is_empty());
    assert_eq!(watermark, since);

    let (txs, watermark) = adapter
        .fetch_new_transactions("quiet", &Watermark::Empty)
        .await
        .unwrap();
    assert!(txs.is_empty());
    assert_eq!(watermark, Watermark::Empty);
}

#[tokio::test]
async fn test_fetch_new_transactions_drops_stale_entries() {
    let mut client = MockLedgerClient::new();
    client
        .expect_get_signatures_since()
        .returning(|_, _, _| Ok(vec![sig("s9", 90), sig("s5", 50), sig("s4", 40)]));

    let adapter = adapter(Arc::new(client));
    let (txs, watermark) = adapter
        .fetch_new_transactions("addr1", &Watermark::tx("s5", 50))
        .await
        .unwrap();

    assert_eq!(txs, vec![sig("s9", 90)]);
    assert_eq!(watermark, Watermark::tx("s9", 90));
}

#[tokio::test]
async fn test_latest_watermark_of_empty_account_is_empty() {
    let ledger = FakeLedger::new();
    let adapter = adapter(ledger.clone());
    assert_eq!(
        adapter.fetch_latest_watermark("fresh").await.unwrap(),
        Watermark::Empty
    );
}

#[tokio::test]
async fn test_rpc_requests_are_counted() {
    let ledger = FakeLedger::new();
    let counters = Arc::new(ResourceCounters::new());
    let adapter =
        RetryingRpcAdapter::new(ledger.clone(), counters.clone(), RetryPolicies::default(), 20);

    adapter.fetch_balance("addr1").await.unwrap();
    adapter.registration_snapshot("addr1").await.unwrap();

    assert_eq!(counters.rpc_per_minute(), 3);
}
