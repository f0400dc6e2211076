// ==========================================
// GradingPipeline 端到端测试
// ==========================================
// 测试目标: 分桶 → 评级 → 产能 → 学习 全流程
// 覆盖范围: 多周学习后基线生效 / 存储故障不影响评级 / SQLite 持久化
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};
use service_grading::config::{ConfigError, GradingConfig, LearningConfig, StoreConfig};
use service_grading::domain::order::OrderRecord;
use service_grading::domain::pattern::{
    ClearScope, MatchSource, Pattern, PatternFilter, PatternRecord, TimeslotPattern,
};
use service_grading::domain::types::{DataCompleteness, ServiceCategory, Shift, SlotOutcome};
use service_grading::engine::{GradingPipeline, PatternManager};
use service_grading::repository::{
    InMemoryPatternStore, PatternStore, RepositoryError, RepositoryResult, SqlitePatternStore,
};
use std::sync::Arc;

// ==========================================
// 测试辅助函数
// ==========================================

fn monday(week: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + Duration::weeks(week)
}

/// 一天的典型订单: 早班午高峰 + 晚班晚高峰
fn create_day_orders(date: NaiveDate) -> Vec<OrderRecord> {
    let at = |h: u32, m: u32| -> NaiveDateTime { date.and_hms_opt(h, m, 0).unwrap() };
    let mut orders = Vec::new();
    for i in 0..6 {
        orders.push(OrderRecord::new("R001", ServiceCategory::Lobby, 12.0, at(12, i * 2)));
        orders.push(OrderRecord::new("R001", ServiceCategory::DriveThru, 6.0, at(12, i * 2 + 1)));
    }
    for i in 0..4 {
        orders.push(OrderRecord::new("R001", ServiceCategory::ToGo, 9.0, at(18, i * 3)));
    }
    // 班次外
    orders.push(OrderRecord::new("R001", ServiceCategory::Lobby, 5.0, at(23, 0)));
    orders
}

fn create_in_memory_pipeline() -> GradingPipeline {
    let config = GradingConfig::default();
    let manager = PatternManager::new(
        Arc::new(InMemoryPatternStore::<Pattern>::new()),
        Arc::new(InMemoryPatternStore::<TimeslotPattern>::new()),
        config.learning.clone(),
        config.store.clone(),
    );
    GradingPipeline::new(config, Arc::new(manager)).unwrap()
}

struct DownStore;

impl<P: PatternRecord> PatternStore<P> for DownStore {
    fn get(&self, _key: &P::Key) -> RepositoryResult<Option<P>> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn save(&self, _pattern: &P) -> RepositoryResult<()> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn update(&self, _pattern: &P) -> RepositoryResult<()> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn upsert(&self, _pattern: &P) -> RepositoryResult<()> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn delete(&self, _key: &P::Key) -> RepositoryResult<bool> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn list(&self, _filter: &PatternFilter) -> RepositoryResult<Vec<P>> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
    fn clear(&self, _scope: &ClearScope) -> RepositoryResult<usize> {
        Err(RepositoryError::Unavailable("down".to_string()))
    }
}

// ==========================================
// 测试用例
// ==========================================

#[test]
fn test_single_day_pipeline() {
    println!("\n=== 测试: 单日全流程 ===");
    let pipeline = create_in_memory_pipeline();
    let date = monday(0);
    let outcome = pipeline.run_day("R001", date, &create_day_orders(date)).unwrap();

    let report = &outcome.report;
    assert_eq!(report.completeness, DataCompleteness::Complete);
    assert_eq!(report.diagnostics.assigned, 16);
    assert_eq!(report.diagnostics.dropped_outside_shift_hours, 1);
    assert_eq!(report.shifts.iter().map(|s| s.total_slots).sum::<usize>(), 64);

    let morning = report.shift(Shift::Morning).unwrap();
    let noon = &morning.slots[24];
    assert_eq!(noon.outcome, SlotOutcome::Passed);
    assert!(noon.is_peak);
    assert_eq!(noon.record.total_orders, 12);
    // 首日无基线
    assert!(noon.category_stats.values().all(|g| g.baseline.is_none()));

    assert_eq!(outcome.capacity.shifts.len(), 2);
    // 时段级 3 条 + 小时级 3 条
    assert_eq!(outcome.learning.learned, 6);
    assert_eq!(outcome.learning.skipped, 0);
}

#[test]
fn test_baseline_becomes_reliable_after_four_weeks() {
    println!("\n=== 测试: 多周学习 ===");
    let pipeline = create_in_memory_pipeline();

    for week in 0..4 {
        let date = monday(week);
        let outcome = pipeline.run_day("R001", date, &create_day_orders(date)).unwrap();
        let noon = &outcome.report.shift(Shift::Morning).unwrap().slots[24];
        assert!(noon.category_stats[&ServiceCategory::Lobby].baseline.is_none());
    }

    let date = monday(4);
    let outcome = pipeline.run_day("R001", date, &create_day_orders(date)).unwrap();
    let noon = &outcome.report.shift(Shift::Morning).unwrap().slots[24];
    let lobby = noon.category_stats[&ServiceCategory::Lobby].baseline.as_ref().unwrap();
    assert_eq!(lobby.source, MatchSource::Exact);
    assert!((lobby.expected_minutes - 12.0).abs() < 1e-9);
    assert!(lobby.delta_minutes.abs() < 1e-9);
    assert!((lobby.confidence - 0.8).abs() < 1e-9);

    // 周二同一时段借用周一基线
    let tuesday = monday(4) + Duration::days(1);
    let outcome = pipeline.run_day("R001", tuesday, &create_day_orders(tuesday)).unwrap();
    let noon = &outcome.report.shift(Shift::Morning).unwrap().slots[24];
    let lobby = noon.category_stats[&ServiceCategory::Lobby].baseline.as_ref().unwrap();
    assert_eq!(lobby.source, MatchSource::CrossDayAverage { days_averaged: 1 });
}

#[test]
fn test_pipeline_survives_store_outage() {
    let config = GradingConfig::default();
    let manager = PatternManager::new(
        Arc::new(DownStore),
        Arc::new(DownStore),
        LearningConfig::default(),
        StoreConfig::default(),
    );
    let pipeline = GradingPipeline::new(config, Arc::new(manager)).unwrap();
    let date = monday(0);
    let outcome = pipeline.run_day("R001", date, &create_day_orders(date)).unwrap();

    assert_eq!(outcome.report.completeness, DataCompleteness::Complete);
    assert_eq!(outcome.learning.learned, 0);
    assert_eq!(outcome.learning.skipped, 6);
}

#[test]
fn test_pipeline_without_learning() {
    let pipeline = create_in_memory_pipeline().without_learning();
    let date = monday(0);
    let outcome = pipeline.run_day("R001", date, &create_day_orders(date)).unwrap();
    assert_eq!(outcome.learning.learned, 0);
    assert!(pipeline
        .patterns()
        .get_all_for_service("R001", ServiceCategory::Lobby)
        .unwrap()
        .is_empty());
}

#[test]
fn test_empty_day_reports_no_categorized_orders() {
    let pipeline = create_in_memory_pipeline();
    let outcome = pipeline.run_day("R001", monday(0), &[]).unwrap();
    assert_eq!(outcome.report.completeness, DataCompleteness::NoCategorizedOrders);
    assert_eq!(outcome.learning.learned, 0);
    assert_eq!(outcome.report.shifts.iter().map(|s| s.slots.len()).sum::<usize>(), 64);
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = GradingConfig::default();
    config.windowing.interval_minutes = 0;
    let manager = PatternManager::new(
        Arc::new(InMemoryPatternStore::<Pattern>::new()),
        Arc::new(InMemoryPatternStore::<TimeslotPattern>::new()),
        LearningConfig::default(),
        StoreConfig::default(),
    );
    assert!(GradingPipeline::new(config, Arc::new(manager)).is_err());
}

#[test]
fn test_learning_config_mismatch_rejected() {
    let mut config = GradingConfig::default();
    config.learning.mature_alpha = 0.1;
    let manager = PatternManager::new(
        Arc::new(InMemoryPatternStore::<Pattern>::new()),
        Arc::new(InMemoryPatternStore::<TimeslotPattern>::new()),
        LearningConfig::default(),
        StoreConfig::default(),
    );
    assert!(matches!(
        GradingPipeline::new(config.clone(), Arc::new(manager)),
        Err(ConfigError::InvalidValue { .. })
    ));

    // 按同一份配置构建则通过
    let manager = PatternManager::new(
        Arc::new(InMemoryPatternStore::<Pattern>::new()),
        Arc::new(InMemoryPatternStore::<TimeslotPattern>::new()),
        config.learning.clone(),
        config.store.clone(),
    );
    let pipeline = GradingPipeline::new(config, Arc::new(manager)).unwrap();
    assert_eq!(pipeline.patterns().learning_config().mature_alpha, 0.1);
}

#[test]
fn test_pipeline_with_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patterns.db");
    let config = GradingConfig::default();
    let store = Arc::new(SqlitePatternStore::open(path.to_str().unwrap(), &config.store).unwrap());
    let manager = PatternManager::new(
        store.clone(),
        store.clone(),
        config.learning.clone(),
        config.store.clone(),
    );
    let pipeline = GradingPipeline::new(config, Arc::new(manager)).unwrap();

    let first = pipeline.run_day("R001", monday(0), &create_day_orders(monday(0))).unwrap();
    let second = pipeline.run_day("R001", monday(1), &create_day_orders(monday(1))).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.learning.learned, 6);

    let hourly = PatternStore::<Pattern>::list(store.as_ref(), &PatternFilter::default()).unwrap();
    assert_eq!(hourly.len(), 3);
    assert!(hourly.iter().all(|p| p.stats.observation_count() == 2));

    let json = serde_json::to_string(&second).unwrap();
    assert!(json.contains("\"run_id\""));
}
