// ==========================================
// TimeslotGrader 引擎集成测试
// ==========================================
// 测试目标: 验证时段达标判定、通过率、连胜、高峰与基线对比
// 覆盖范围: 严格 AND / 空时段 / 记录校验 / 班次汇总 / 日报
// ==========================================

use chrono::{NaiveDate, NaiveTime};
use service_grading::config::{default_peak_bands, WindowingConfig};
use service_grading::domain::order::OrderRecord;
use service_grading::domain::pattern::{MatchSource, PatternMatch, PatternStats, TimeslotPatternKey};
use service_grading::domain::timeslot::{CategorySlotMetrics, TimeslotRecord};
use service_grading::domain::types::{DataCompleteness, ServiceCategory, Shift, SlotOutcome, StreakState};
use service_grading::engine::{
    BaselineSource, GraderConfig, GradingError, TimeslotGrader, TimeslotWindower,
};
use std::collections::BTreeMap;

// ==========================================
// 测试辅助函数
// ==========================================

fn grader() -> TimeslotGrader {
    TimeslotGrader::new(GraderConfig {
        peak_bands: default_peak_bands(),
        ..GraderConfig::default()
    })
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// 创建测试用时段记录（15 分钟宽度）
fn create_test_record(
    shift: Shift,
    slot_index: usize,
    start: NaiveTime,
    categories: Vec<(ServiceCategory, Vec<f64>)>,
) -> TimeslotRecord {
    let categories: BTreeMap<ServiceCategory, CategorySlotMetrics> = categories
        .into_iter()
        .map(|(c, d)| (c, CategorySlotMetrics::from_durations(d)))
        .collect();
    let total_orders = categories.values().map(|m| m.order_count).sum();
    TimeslotRecord {
        restaurant_code: "R001".to_string(),
        shift,
        slot_index,
        start,
        end: start + chrono::Duration::minutes(15),
        categories,
        total_orders,
    }
}

struct FixedBaseline {
    expected: f64,
}

impl BaselineSource for FixedBaseline {
    fn baseline_for(&self, key: &TimeslotPatternKey) -> Option<PatternMatch> {
        if key.base.service_type != ServiceCategory::Lobby {
            return None;
        }
        let updated = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        Some(PatternMatch {
            stats: PatternStats::observed(self.expected, 4, 0.95, updated),
            source: MatchSource::Exact,
        })
    }
}

// ==========================================
// 测试用例 1: 严格 AND
// ==========================================

#[test]
fn test_strict_and_one_failing_category_fails_slot() {
    println!("\n=== 测试: 严格 AND ===");
    let record = create_test_record(
        Shift::Morning,
        24,
        hm(12, 0),
        vec![
            (ServiceCategory::Lobby, vec![12.0, 14.0]),         // 均值 13 <= 15
            (ServiceCategory::DriveThru, vec![6.0, 7.0, 15.0]), // 均值 9.33 > 8
        ],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Failed);
    assert_eq!(graded.passed(), Some(false));
    assert!(graded.category_stats[&ServiceCategory::Lobby].meets_standard);
    assert!(!graded.category_stats[&ServiceCategory::DriveThru].meets_standard);

    let drive = &graded.category_stats[&ServiceCategory::DriveThru];
    assert_eq!((drive.total, drive.passed, drive.failed), (3, 2, 1));
    // 订单级通过率 4/5
    assert_eq!(graded.pass_rate, Some(80.0));
    assert_eq!(graded.streak, StreakState::None);
}

#[test]
fn test_absent_category_is_vacuously_satisfied() {
    let record = create_test_record(
        Shift::Morning,
        8,
        hm(8, 0),
        vec![(ServiceCategory::ToGo, vec![4.0, 6.0])],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Passed);
    assert_eq!(graded.category_stats.len(), 1);
    assert_eq!(graded.pass_rate, Some(100.0));
    assert_eq!(graded.streak, StreakState::Hot);
}

// ==========================================
// 测试用例 2: 通过率与连胜
// ==========================================

#[test]
fn test_eight_of_nine_orders_is_hot() {
    println!("\n=== 测试: 8/9 订单达标 ===");
    let record = create_test_record(
        Shift::Evening,
        4,
        hm(15, 0),
        vec![
            (ServiceCategory::Lobby, vec![10.0, 10.0, 10.0, 10.0, 10.0]),
            (ServiceCategory::ToGo, vec![5.0, 5.0, 5.0, 20.0]), // 均值 8.75 <= 10
        ],
    );
    let graded = grader().grade_slot(&record, None, 1).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Passed);
    assert_eq!(graded.pass_rate, Some(88.9));
    assert_eq!(graded.streak, StreakState::Hot);
}

#[test]
fn test_failed_slot_can_still_be_hot() {
    println!("\n=== 测试: 得来速超标但整体通过率高 ===");
    let record = create_test_record(
        Shift::Morning,
        24,
        hm(12, 0),
        vec![
            (ServiceCategory::Lobby, vec![10.0, 10.0, 10.0, 10.0, 10.0]),
            (ServiceCategory::DriveThru, vec![5.0, 6.0, 20.0]), // 均值 10.33 > 8
            (ServiceCategory::ToGo, vec![5.0]),
        ],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Failed);
    assert_eq!(graded.pass_rate, Some(88.9));
    assert_eq!(graded.streak, StreakState::Hot);

    let counts = |c: ServiceCategory| {
        let g = &graded.category_stats[&c];
        (g.total, g.passed, g.failed)
    };
    assert_eq!(counts(ServiceCategory::Lobby), (5, 5, 0));
    assert_eq!(counts(ServiceCategory::DriveThru), (3, 2, 1));
    assert_eq!(counts(ServiceCategory::ToGo), (1, 1, 0));
    assert!(!graded.category_stats[&ServiceCategory::DriveThru].meets_standard);
}

#[test]
fn test_category_with_failed_order_passes_on_average() {
    // 同样的 2/1 计数,均值 7.67 <= 8 时渠道仍达标
    let record = create_test_record(
        Shift::Morning,
        24,
        hm(12, 0),
        vec![
            (ServiceCategory::Lobby, vec![10.0, 10.0, 10.0, 10.0, 10.0]),
            (ServiceCategory::DriveThru, vec![5.0, 6.0, 12.0]),
            (ServiceCategory::ToGo, vec![5.0]),
        ],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Passed);
    assert_eq!(graded.pass_rate, Some(88.9));
    assert_eq!(graded.streak, StreakState::Hot);
    let drive_thru = &graded.category_stats[&ServiceCategory::DriveThru];
    assert_eq!((drive_thru.passed, drive_thru.failed), (2, 1));
    assert!(drive_thru.meets_standard);
}

#[test]
fn test_low_pass_rate_is_cold() {
    let record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![20.0, 20.0, 10.0])],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::Failed);
    assert_eq!(graded.pass_rate, Some(33.3));
    assert_eq!(graded.streak, StreakState::Cold);
}

#[test]
fn test_order_at_target_passes() {
    let record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::DriveThru, vec![8.0])],
    );
    let graded = grader().grade_slot(&record, None, 0).unwrap();
    assert_eq!(graded.outcome, SlotOutcome::Passed);
    assert_eq!(graded.pass_rate, Some(100.0));
}

// ==========================================
// 测试用例 3: 空时段
// ==========================================

#[test]
fn test_empty_slot_has_no_outcome() {
    let record = create_test_record(Shift::Morning, 0, hm(6, 0), vec![]);
    let graded = grader().grade_slot(&record, None, 0).unwrap();

    assert_eq!(graded.outcome, SlotOutcome::NoOrders);
    assert_eq!(graded.passed(), None);
    assert_eq!(graded.pass_rate, None);
    assert_eq!(graded.streak, StreakState::None);
    assert!(graded.category_stats.is_empty());
}

// ==========================================
// 测试用例 4: 高峰标记
// ==========================================

#[test]
fn test_peak_band_intersection() {
    let g = grader();
    let inside = create_test_record(Shift::Morning, 22, hm(11, 30), vec![]);
    let before = create_test_record(Shift::Morning, 21, hm(11, 15), vec![]);
    let after = create_test_record(Shift::Morning, 28, hm(13, 0), vec![]);
    let dinner = create_test_record(Shift::Evening, 21, hm(19, 15), vec![]);

    let inside = g.grade_slot(&inside, None, 0).unwrap();
    assert!(inside.is_peak);
    assert_eq!(inside.peak_band.as_deref(), Some("lunch"));

    assert!(!g.grade_slot(&before, None, 0).unwrap().is_peak);
    assert!(!g.grade_slot(&after, None, 0).unwrap().is_peak);

    let dinner = g.grade_slot(&dinner, None, 0).unwrap();
    assert_eq!(dinner.peak_band.as_deref(), Some("dinner"));
}

// ==========================================
// 测试用例 5: 记录校验
// ==========================================

#[test]
fn test_negative_duration_rejected() {
    let record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![5.0, -1.0])],
    );
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::InvalidDuration { .. }));
}

#[test]
fn test_non_finite_duration_rejected() {
    let mut record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![5.0])],
    );
    let metrics = record.categories.get_mut(&ServiceCategory::Lobby).unwrap();
    metrics.fulfillment_minutes = vec![f64::NAN];
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::InvalidDuration { .. }));
}

#[test]
fn test_count_mismatch_rejected() {
    let mut record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![5.0, 6.0])],
    );
    record.categories.get_mut(&ServiceCategory::Lobby).unwrap().order_count = 3;
    record.total_orders = 3;
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::CountMismatch { count: 3, durations: 2, .. }));
}

#[test]
fn test_total_mismatch_rejected() {
    let mut record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![5.0, 6.0])],
    );
    record.total_orders = 5;
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::TotalMismatch { total: 5, sum: 2, .. }));
}

#[test]
fn test_average_mismatch_rejected() {
    let mut record = create_test_record(
        Shift::Morning,
        0,
        hm(6, 0),
        vec![(ServiceCategory::Lobby, vec![5.0, 6.0])],
    );
    record.categories.get_mut(&ServiceCategory::Lobby).unwrap().avg_fulfillment_minutes = 9.0;
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::AverageMismatch { .. }));
}

#[test]
fn test_inverted_interval_rejected() {
    let mut record = create_test_record(Shift::Morning, 0, hm(6, 0), vec![]);
    record.end = hm(5, 45);
    let err = grader().grade_slot(&record, None, 0).unwrap_err();
    assert!(matches!(err, GradingError::InvalidInterval { .. }));
}

// ==========================================
// 测试用例 6: 基线对比
// ==========================================

#[test]
fn test_baseline_comparison_does_not_change_outcome() {
    let record = create_test_record(
        Shift::Morning,
        24,
        hm(12, 0),
        vec![
            (ServiceCategory::Lobby, vec![12.0, 14.0]),
            (ServiceCategory::ToGo, vec![6.0]),
        ],
    );
    let source = FixedBaseline { expected: 10.0 };
    let g = grader();

    let with = g.grade_slot(&record, Some(&source as &dyn BaselineSource), 0).unwrap();
    let without = g.grade_slot(&record, None, 0).unwrap();

    assert_eq!(with.outcome, without.outcome);
    assert_eq!(with.pass_rate, without.pass_rate);

    let lobby = with.category_stats[&ServiceCategory::Lobby].baseline.as_ref().unwrap();
    assert_eq!(lobby.expected_minutes, 10.0);
    assert!((lobby.delta_minutes - 3.0).abs() < 1e-9);
    assert_eq!(lobby.source, MatchSource::Exact);
    assert!(with.category_stats[&ServiceCategory::ToGo].baseline.is_none());
    assert!(without.category_stats[&ServiceCategory::Lobby].baseline.is_none());
}

// ==========================================
// 测试用例 7: 班次汇总与日报
// ==========================================

#[test]
fn test_grade_day_summary() {
    println!("\n=== 测试: 单日评级汇总 ===");
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(); // 周一
    let at = |h: u32, m: u32| date.and_hms_opt(h, m, 0).unwrap();
    let orders = vec![
        // 06:00 时段: 通过
        OrderRecord::new("R001", ServiceCategory::Lobby, 10.0, at(6, 5)),
        OrderRecord::new("R001", ServiceCategory::DriveThru, 5.0, at(6, 10)),
        // 12:00 时段: Drive-Thru 均值超标
        OrderRecord::new("R001", ServiceCategory::DriveThru, 12.0, at(12, 1)),
        OrderRecord::new("R001", ServiceCategory::DriveThru, 7.0, at(12, 2)),
        // 18:00 时段: 通过
        OrderRecord::new("R001", ServiceCategory::ToGo, 9.0, at(18, 0)),
    ];
    let windower = TimeslotWindower::new(WindowingConfig::default()).unwrap();
    let day = windower.window_day("R001", date, &orders);
    let report = grader().grade_day(&day, None, date).unwrap();

    assert_eq!(report.day_of_week, 0);
    assert_eq!(report.completeness, DataCompleteness::Complete);
    assert_eq!(report.shifts.len(), 2);

    let morning = report.shift(Shift::Morning).unwrap();
    assert_eq!(morning.total_slots, 32);
    assert_eq!(morning.non_empty_slots, 2);
    assert_eq!(morning.passed_slots, 1);
    assert_eq!(morning.failed_slots, 1);
    assert_eq!(morning.slot_pass_rate, Some(50.0));
    assert_eq!(morning.total_orders, 4);

    let drive = morning.category_totals[&ServiceCategory::DriveThru];
    assert_eq!((drive.total, drive.passed, drive.failed), (3, 2, 1));

    let evening = report.shift(Shift::Evening).unwrap();
    assert_eq!(evening.slot_pass_rate, Some(100.0));
    assert_eq!(evening.hot_slots, 1);
}

#[test]
fn test_grade_day_without_orders_flags_completeness() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap(); // 周六
    let windower = TimeslotWindower::new(WindowingConfig::default()).unwrap();
    let day = windower.window_day("R001", date, &[]);
    let report = grader().grade_day(&day, None, date).unwrap();

    assert_eq!(report.day_of_week, 5);
    assert_eq!(report.completeness, DataCompleteness::NoCategorizedOrders);
    for shift in &report.shifts {
        assert_eq!(shift.total_slots, 32);
        assert_eq!(shift.non_empty_slots, 0);
        assert_eq!(shift.slot_pass_rate, None);
    }
}

#[test]
fn test_grading_deterministic() {
    let record = create_test_record(
        Shift::Evening,
        14,
        hm(17, 30),
        vec![
            (ServiceCategory::Lobby, vec![9.0, 16.0, 18.0]),
            (ServiceCategory::DriveThru, vec![4.0, 8.5]),
        ],
    );
    let g = grader();
    assert_eq!(g.grade_slot(&record, None, 3).unwrap(), g.grade_slot(&record, None, 3).unwrap());
}
