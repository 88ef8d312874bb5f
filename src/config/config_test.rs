use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_watcher_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("WATCHER__") || key == CONFIG_PATH_ENV {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = WatcherConfig::default();

    assert_eq!(config.scan.poll_interval_ms, 15_000);
    assert_eq!(config.scan.concurrency, 3);
    assert_eq!(config.retry.rpc.max_retries, 3);
    assert_eq!(config.retry.rpc.base_delay_ms, 1_000);
    assert_eq!(config.retry.registration.base_delay_ms, 2_000);
    assert_eq!(config.dedup.ttl_secs, 86_400);
    assert_eq!(config.monitor.check_interval_ms, 30_000);
    assert_eq!(config.monitor.alert_cooldown_ms, 900_000);
    assert!(!config.exporter.enabled);
    assert!(config.accounts.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_watcher_env_vars();
    with_vars(
        vec![
            ("WATCHER__SCAN__CONCURRENCY", Some("7")),
            ("WATCHER__RETRY__RPC__MAX_RETRIES", Some("5")),
        ],
        || {
            let config = WatcherConfig::new().unwrap();

            assert_eq!(config.scan.concurrency, 7);
            assert_eq!(config.retry.rpc.max_retries, 5);
            // untouched fields keep their defaults
            assert_eq!(config.scan.poll_interval_ms, 15_000);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_watcher_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");

    std::fs::write(
        &config_path,
        r#"
        [scan]
        poll_interval_ms = 20000

        [dedup]
        ttl_secs = 3600

        [[accounts]]
        address = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"
        subscriber_id = "chat-1"
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = WatcherConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .expect("override applies");

        assert_eq!(config.scan.poll_interval_ms, 20_000);
        assert_eq!(config.dedup.ttl_secs, 3_600);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].subscriber_id, "chat-1");
        assert_eq!(config.scan.concurrency, 3);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_watcher_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("watcher.toml");
    std::fs::write(
        &config_path,
        r#"
        [scan]
        poll_interval_ms = 30000
        concurrency = 2
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            (CONFIG_PATH_ENV, Some(config_path.to_str().unwrap())),
            ("WATCHER__SCAN__CONCURRENCY", Some("9")),
        ],
        || {
            let config = WatcherConfig::new().unwrap();

            assert_eq!(config.scan.poll_interval_ms, 30_000);
            assert_eq!(config.scan.concurrency, 9);
        },
    );
}

#[test]
#[serial]
fn missing_config_file_should_return_error() {
    cleanup_all_watcher_env_vars();
    with_vars(
        vec![(CONFIG_PATH_ENV, Some("/nonexistent/watcher-config.toml"))],
        || {
            assert!(WatcherConfig::new().is_err());
        },
    );
}

#[test]
fn validation_should_reject_out_of_range_values() {
    let mut config = WatcherConfig::default();
    config.scan.poll_interval_ms = 4_999;
    assert!(config.validate().is_err());

    let mut config = WatcherConfig::default();
    config.scan.concurrency = 21;
    assert!(config.validate().is_err());

    let mut config = WatcherConfig::default();
    config.retry.registration.max_retries = 0;
    assert!(config.validate().is_err());

    let mut config = WatcherConfig::default();
    config.dedup.ttl_secs = 0;
    assert!(config.validate().is_err());

    let mut config = WatcherConfig::default();
    config.rpc.endpoint = "ws://localhost:8900".to_string();
    assert!(config.validate().is_err());

    let mut config = WatcherConfig::default();
    config.exporter.enabled = true;
    config.exporter.port = 80;
    assert!(config.validate().is_err());
}

#[test]
fn backoff_policy_should_double_and_cap_delays() {
    let policy = RetryPolicies::default().registration;

    assert_eq!(policy.delay_after(1), std::time::Duration::from_secs(2));
    assert_eq!(policy.delay_after(2), std::time::Duration::from_secs(4));
    assert_eq!(policy.delay_after(3), std::time::Duration::from_secs(6));
    assert_eq!(policy.delay_after(10), std::time::Duration::from_secs(6));
}
