use super::dedup::DedupConfig;
use super::resource::ResourceMonitorConfig;

#[test]
fn test_default_monitor_config() {
    let config = ResourceMonitorConfig::default();
    assert_eq!(config.check_interval_ms, 30_000);
    assert_eq!(config.warning_percent, 70.0);
    assert_eq!(config.critical_percent, 90.0);
    assert_eq!(config.alert_cooldown().as_secs(), 15 * 60);
    assert!(config.validate().is_ok());
}

#[test]
fn test_thresholds_must_be_ordered() {
    let config = ResourceMonitorConfig {
        warning_percent: 90.0,
        critical_percent: 70.0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = ResourceMonitorConfig {
        critical_percent: 101.0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_maximum_rejected() {
    let config = ResourceMonitorConfig {
        max_stored_records: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_check_interval_range() {
    let mut config = ResourceMonitorConfig::default();

    config.check_interval_ms = 999;
    assert!(config.validate().is_err());

    config.check_interval_ms = 3_600_001;
    assert!(config.validate().is_err());

    config.check_interval_ms = 1_000;
    assert!(config.validate().is_ok());
}

#[test]
fn test_dedup_config_ranges() {
    let mut config = DedupConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.ttl().as_secs(), 86_400);

    config.sweep_interval_ms = 999;
    assert!(config.validate().is_err());

    config.sweep_interval_ms = 1_000;
    config.max_entries = 0;
    assert!(config.validate().is_err());
}
