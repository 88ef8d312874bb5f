use std::time::Duration;

use super::*;

const DAY: Duration = Duration::from_secs(86_400);

#[tokio::test(start_paused = true)]
async fn test_mark_seen_is_idempotent_within_ttl() {
    let cache = NotificationDedupCache::new(100);
    assert!(!cache.has_seen("sig1:transfer"));

    cache.mark_seen("sig1:transfer", DAY);
    cache.mark_seen("sig1:transfer", DAY);

    assert!(cache.has_seen("sig1:transfer"));
    assert_eq!(cache.len(), 1);

    tokio::time::advance(Duration::from_secs(23 * 3_600)).await;
    assert!(cache.has_seen("sig1:transfer"));
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = NotificationDedupCache::new(100);
    cache.mark_seen("sig1:transfer", DAY);

    tokio::time::advance(DAY + Duration::from_secs(1)).await;

    assert!(!cache.has_seen("sig1:transfer"));
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remark_refreshes_ttl() {
    let cache = NotificationDedupCache::new(100);
    cache.mark_seen("a", Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(8)).await;
    cache.mark_seen("a", Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(cache.has_seen("a"));
    assert_eq!(cache.sweep(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_only_expired_entries() {
    let cache = NotificationDedupCache::new(100);
    cache.mark_seen("short-1", Duration::from_secs(5));
    cache.mark_seen("short-2", Duration::from_secs(5));
    cache.mark_seen("long", Duration::from_secs(60));

    tokio::time::advance(Duration::from_secs(6)).await;

    assert_eq!(cache.sweep(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.has_seen("long"));
    assert_eq!(cache.sweep(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_max_entries_evicts_soonest_expiring() {
    let cache = NotificationDedupCache::new(2);
    cache.mark_seen("first", Duration::from_secs(10));
    cache.mark_seen("second", Duration::from_secs(20));
    cache.mark_seen("third", Duration::from_secs(30));

    assert_eq!(cache.len(), 2);
    assert!(!cache.has_seen("first"));
    assert!(cache.has_seen("second"));
    assert!(cache.has_seen("third"));
}

#[tokio::test(start_paused = true)]
async fn test_remark_at_capacity_does_not_evict_others() {
    let cache = NotificationDedupCache::new(2);
    cache.mark_seen("a", Duration::from_secs(10));
    cache.mark_seen("b", Duration::from_secs(20));

    cache.mark_seen("a", Duration::from_secs(30));

    assert_eq!(cache.len(), 2);
    assert!(cache.has_seen("a"));
    assert!(cache.has_seen("b"));
}
