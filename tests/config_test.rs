// ==========================================
// 配置层集成测试
// ==========================================
// 测试目标: 验证默认值、JSON 覆写、config_kv 覆写与校验
// ==========================================

use service_grading::config::{config_keys, ConfigError, ConfigManager, GradingConfig};
use service_grading::domain::types::{ServiceCategory, Shift};
use service_grading::repository::SqlitePatternStore;
use tempfile::TempDir;

// ==========================================
// 测试辅助函数
// ==========================================

fn create_test_manager() -> (TempDir, ConfigManager) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.db");
    let manager = ConfigManager::new(path.to_str().unwrap()).unwrap();
    (dir, manager)
}

// ==========================================
// 测试用例
// ==========================================

#[test]
fn test_defaults_without_overrides() {
    let (_dir, manager) = create_test_manager();
    let config = manager.load_grading_config().unwrap();
    assert_eq!(config, GradingConfig::default());

    assert_eq!(config.service_standards.target_for(ServiceCategory::Lobby), 15.0);
    assert_eq!(config.service_standards.target_for(ServiceCategory::DriveThru), 8.0);
    assert_eq!(config.service_standards.target_for(ServiceCategory::ToGo), 10.0);
    assert_eq!(config.windowing.slots_per_shift(Shift::Morning), 32);
    assert_eq!(config.peak_bands.len(), 2);
    assert_eq!(config.capacity.max_orders_per_slot, 20);
}

#[test]
fn test_overrides_applied() {
    let (_dir, manager) = create_test_manager();
    manager.set_value(config_keys::STANDARD_DRIVE_THRU_MINUTES, "6.5").unwrap();
    manager.set_value(config_keys::INTERVAL_MINUTES, "30").unwrap();
    manager.set_value(config_keys::STREAK_HOT_PCT, "90").unwrap();
    manager.set_value(config_keys::MAX_ORDERS_PER_SLOT, "30").unwrap();
    manager
        .set_value(
            config_keys::PEAK_BANDS,
            r#"[{"name":"breakfast","start":"07:00","end":"09:00"}]"#,
        )
        .unwrap();

    let config = manager.load_grading_config().unwrap();
    assert_eq!(config.service_standards.drive_thru_minutes, 6.5);
    assert_eq!(config.windowing.interval_minutes, 30);
    assert_eq!(config.windowing.slots_per_shift(Shift::Evening), 16);
    assert_eq!(config.streak.hot_pct, 90.0);
    assert_eq!(config.capacity.max_orders_per_slot, 30);
    assert_eq!(config.peak_bands.len(), 1);
    assert_eq!(config.peak_bands[0].name, "breakfast");
}

#[test]
fn test_set_value_overwrites() {
    let (_dir, manager) = create_test_manager();
    manager.set_value(config_keys::STREAK_COLD_PCT, "60").unwrap();
    manager.set_value(config_keys::STREAK_COLD_PCT, "65").unwrap();
    assert_eq!(
        manager.get_global_config_value(config_keys::STREAK_COLD_PCT).unwrap(),
        Some("65".to_string())
    );
}

#[test]
fn test_unparsable_value_falls_back_to_default() {
    let (_dir, manager) = create_test_manager();
    manager.set_value(config_keys::STANDARD_LOBBY_MINUTES, "fifteen").unwrap();
    manager.set_value(config_keys::PEAK_BANDS, "not json").unwrap();

    let config = manager.load_grading_config().unwrap();
    assert_eq!(config.service_standards.lobby_minutes, 15.0);
    assert_eq!(config.peak_bands.len(), 2);
}

#[test]
fn test_invalid_override_rejected() {
    let (_dir, manager) = create_test_manager();
    manager.set_value(config_keys::INTERVAL_MINUTES, "7").unwrap();
    assert!(matches!(
        manager.load_grading_config(),
        Err(ConfigError::InvalidValue { .. })
    ));

    manager.set_value(config_keys::INTERVAL_MINUTES, "15").unwrap();
    manager.set_value(config_keys::STREAK_COLD_PCT, "95").unwrap();
    assert!(manager.load_grading_config().is_err());
}

#[test]
fn test_config_snapshot_is_json() {
    let (_dir, manager) = create_test_manager();
    manager.set_value(config_keys::STRESS_THRESHOLD, "0.9").unwrap();
    let snapshot = manager.get_config_snapshot().unwrap();
    let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(value[config_keys::STRESS_THRESHOLD], "0.9");
}

#[test]
fn test_shared_connection_with_pattern_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let store = SqlitePatternStore::open(path.to_str().unwrap(), &Default::default()).unwrap();
    let manager = ConfigManager::from_connection(store.connection()).unwrap();
    manager.set_value(config_keys::CONFIDENCE_CAP, "0.9").unwrap();
    assert_eq!(manager.load_grading_config().unwrap().learning.confidence_cap, 0.9);
}

#[test]
fn test_json_config_validation() {
    assert!(GradingConfig::from_json_str("{}").is_ok());
    assert!(GradingConfig::from_json_str(r#"{"learning": {"early_alpha": 1.5}}"#).is_err());
    assert!(GradingConfig::from_json_str(
        r#"{"peak_bands": [{"name": "bad", "start": "13:00", "end": "11:00"}]}"#
    )
    .is_err());
    assert!(matches!(
        GradingConfig::from_json_str("{not json"),
        Err(ConfigError::Parse(_))
    ));
}
