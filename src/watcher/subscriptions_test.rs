use std::sync::Arc;

use super::*;
use crate::AccountEntry;
use crate::CursorStore;
use crate::ScanConfig;

#[test]
fn test_first_subscriber_starts_watching() {
    let registry = SubscriberRegistry::new();

    assert!(registry.subscribe("addr1", "u1"));
    assert!(!registry.subscribe("addr1", "u2"));
    assert!(!registry.subscribe("addr1", "u1"));

    assert_eq!(registry.address_count(), 1);
    assert_eq!(registry.subscribers("addr1"), vec!["u1", "u2"]);
}

#[test]
fn test_last_subscriber_stops_watching() {
    let registry = SubscriberRegistry::new();
    registry.subscribe("addr1", "u1");
    registry.subscribe("addr1", "u2");

    assert_eq!(registry.unsubscribe("addr1", "u1"), Unsubscribed::Shared);
    assert!(!registry.is_subscribed("addr1", "u1"));
    assert!(registry.is_subscribed("addr1", "u2"));

    assert_eq!(registry.unsubscribe("addr1", "u2"), Unsubscribed::Last);
    assert_eq!(registry.address_count(), 0);
    assert!(registry.subscribers("addr1").is_empty());
}

#[test]
fn test_unknown_pair_is_not_registered() {
    let registry = SubscriberRegistry::new();
    assert_eq!(registry.unsubscribe("addr1", "u1"), Unsubscribed::NotRegistered);

    registry.subscribe("addr1", "u1");
    assert_eq!(registry.unsubscribe("addr1", "u9"), Unsubscribed::NotRegistered);
    assert_eq!(registry.address_count(), 1);
}

#[test]
fn test_entries_flatten_pairs() {
    let registry = SubscriberRegistry::new();
    registry.subscribe("a", "u1");
    registry.subscribe("a", "u2");
    registry.subscribe("b", "u1");

    let mut entries = registry.entries();
    entries.sort_by(|x, y| (&x.address, &x.subscriber_id).cmp(&(&y.address, &y.subscriber_id)));
    assert_eq!(
        entries,
        vec![
            AccountEntry {
                address: "a".into(),
                subscriber_id: "u1".into()
            },
            AccountEntry {
                address: "a".into(),
                subscriber_id: "u2".into()
            },
            AccountEntry {
                address: "b".into(),
                subscriber_id: "u1".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_static_subscriptions_return_configured_pairs() {
    let entries = vec![AccountEntry {
        address: "a".into(),
        subscriber_id: "u1".into(),
    }];
    let source = StaticSubscriptions::new(entries.clone());
    assert_eq!(source.load().await.unwrap(), entries);
}

#[test]
fn test_hooks_run_on_first_and_last_subscriber_only() {
    let registry = SubscriberRegistry::new();
    let mut firsts = 0;
    let mut lasts = 0;

    registry.subscribe_with("addr1", "u1", || firsts += 1);
    registry.subscribe_with("addr1", "u2", || firsts += 1);
    assert_eq!(registry.unsubscribe_with("addr1", "u1", || lasts += 1), Unsubscribed::Shared);
    assert_eq!(registry.unsubscribe_with("addr1", "u9", || lasts += 1), Unsubscribed::NotRegistered);
    assert_eq!(registry.unsubscribe_with("addr1", "u2", || lasts += 1), Unsubscribed::Last);

    assert_eq!(firsts, 1);
    assert_eq!(lasts, 1);
}

#[test]
fn test_cursor_follows_subscribers_under_contention() {
    let registry = Arc::new(SubscriberRegistry::new());
    let cursors = Arc::new(CursorStore::new(ScanConfig::default()));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let registry = registry.clone();
            let cursors = cursors.clone();
            std::thread::spawn(move || {
                let subscriber = format!("u{i}");
                for _ in 0..1_000 {
                    registry.subscribe_with("addr1", &subscriber, || {
                        cursors.track("addr1");
                    });
                    registry.unsubscribe_with("addr1", &subscriber, || {
                        cursors.remove("addr1");
                    });
                }
                registry.subscribe_with("addr1", &subscriber, || {
                    cursors.track("addr1");
                });
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.subscribers("addr1").len(), 4);
    assert!(cursors.contains("addr1"));
}
