// ==========================================
// 门店服务评级系统 - 时段评级引擎
// ==========================================
// 职责: 时段达标判定（严格 AND）+ 订单级统计 + 连胜状态 + 高峰标记
// 输入: TimeslotRecord + 服务标准 + 可选历史基线
// 输出: GradedTimeslot / ShiftGradeSummary / DayGradeReport
// 红线: 基线只做对比,不改变达标结论
// ==========================================

use crate::config::{GradingConfig, PeakBand, ServiceStandards, StreakThresholds};
use crate::domain::pattern::{PatternKey, PatternMatch, TimeslotPatternKey};
use crate::domain::timeslot::{
    BaselineComparison, CategoryGrade, CategorySlotMetrics, CategoryTotals, DayGradeReport,
    GradedTimeslot, ShiftGradeSummary, TimeslotRecord,
};
use crate::domain::types::{DataCompleteness, ServiceCategory, Shift, SlotOutcome, StreakState};
use crate::engine::error::GradingError;
use crate::engine::windower::{slot_end_minutes, time_to_minutes, WindowedDay, WindowedShift};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// 平均值一致性容差（分钟）
const AVERAGE_TOLERANCE: f64 = 0.01;

/// 一位小数
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ==========================================
// BaselineSource - 历史基线来源
// ==========================================
/// 评级只读基线；查询失败由实现方自行降级为 None
pub trait BaselineSource: Send + Sync {
    fn baseline_for(&self, key: &TimeslotPatternKey) -> Option<PatternMatch>;
}

// ==========================================
// GraderConfig - 评级参数
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct GraderConfig {
    pub standards: ServiceStandards,
    pub peak_bands: Vec<PeakBand>,
    pub streak: StreakThresholds,
}

impl From<&GradingConfig> for GraderConfig {
    fn from(config: &GradingConfig) -> Self {
        Self {
            standards: config.service_standards.clone(),
            peak_bands: config.peak_bands.clone(),
            streak: config.streak.clone(),
        }
    }
}

// ==========================================
// TimeslotGrader - 时段评级引擎
// ==========================================
pub struct TimeslotGrader {
    config: GraderConfig,
}

impl TimeslotGrader {
    pub fn new(config: GraderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 单时段评级
    ///
    /// # 规则
    /// 1. 先校验记录（非法记录直接报错,不做修补）
    /// 2. 无订单 → NoOrders,不计入通过率
    /// 3. 每个出现的渠道均值 <= 目标 → Passed,否则 Failed
    /// 4. 通过率 = 达标订单 / 总订单；连胜按通过率划分
    pub fn grade_slot(
        &self,
        record: &TimeslotRecord,
        baselines: Option<&dyn BaselineSource>,
        day_of_week: u8,
    ) -> Result<GradedTimeslot, GradingError> {
        validate_record(record)?;

        let (is_peak, peak_band) = self.peak_flag(record);

        // 1. 渠道级统计
        let mut category_stats = BTreeMap::new();
        for (category, metrics) in &record.categories {
            if metrics.order_count == 0 {
                continue;
            }
            let mut grade = self.grade_category(*category, metrics);
            if let Some(source) = baselines {
                grade.baseline = lookup_baseline(source, record, *category, day_of_week, grade.avg_fulfillment_minutes);
            }
            category_stats.insert(*category, grade);
        }

        // 2. 无订单时段
        if record.is_empty() {
            return Ok(GradedTimeslot {
                record: record.clone(),
                outcome: SlotOutcome::NoOrders,
                pass_rate: None,
                streak: StreakState::None,
                category_stats,
                is_peak,
                peak_band,
            });
        }

        // 3. 严格 AND
        let all_met = category_stats.values().all(|g| g.meets_standard);
        let outcome = if all_met {
            SlotOutcome::Passed
        } else {
            SlotOutcome::Failed
        };

        // 4. 通过率 + 连胜
        let passed_orders: u32 = category_stats.values().map(|g| g.passed).sum();
        let pass_rate = round1(passed_orders as f64 / record.total_orders as f64 * 100.0);
        let streak = self.classify_streak(pass_rate);

        debug!(
            shift = %record.shift,
            slot = record.slot_index,
            outcome = ?outcome,
            pass_rate,
            "时段评级完成"
        );

        Ok(GradedTimeslot {
            record: record.clone(),
            outcome,
            pass_rate: Some(pass_rate),
            streak,
            category_stats,
            is_peak,
            peak_band,
        })
    }

    /// 单班次评级 + 汇总
    pub fn grade_shift(
        &self,
        windowed: &WindowedShift,
        baselines: Option<&dyn BaselineSource>,
        day_of_week: u8,
    ) -> Result<ShiftGradeSummary, GradingError> {
        let slots = windowed
            .records
            .iter()
            .map(|record| self.grade_slot(record, baselines, day_of_week))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summarize_shift(windowed.shift, slots))
    }

    /// 单日评级
    #[instrument(skip(self, day, baselines), fields(restaurant_code = %day.restaurant_code, business_date = %business_date))]
    pub fn grade_day(
        &self,
        day: &WindowedDay,
        baselines: Option<&dyn BaselineSource>,
        business_date: NaiveDate,
    ) -> Result<DayGradeReport, GradingError> {
        let day_of_week = business_date.weekday().num_days_from_monday() as u8;

        let mut shifts = Vec::with_capacity(day.shifts.len());
        for windowed in &day.shifts {
            for record in &windowed.records {
                if record.restaurant_code != day.restaurant_code {
                    return Err(GradingError::RestaurantMismatch {
                        expected: day.restaurant_code.clone(),
                        actual: record.restaurant_code.clone(),
                    });
                }
            }
            shifts.push(self.grade_shift(windowed, baselines, day_of_week)?);
        }

        let completeness = if day.diagnostics.assigned == 0 {
            warn!(
                total_input = day.diagnostics.total_input,
                "当日无已归类订单"
            );
            DataCompleteness::NoCategorizedOrders
        } else {
            DataCompleteness::Complete
        };

        Ok(DayGradeReport {
            restaurant_code: day.restaurant_code.clone(),
            business_date,
            day_of_week,
            shifts,
            diagnostics: day.diagnostics,
            completeness,
        })
    }

    /// 连胜状态
    pub fn classify_streak(&self, pass_rate: f64) -> StreakState {
        if pass_rate >= self.config.streak.hot_pct {
            StreakState::Hot
        } else if pass_rate < self.config.streak.cold_pct {
            StreakState::Cold
        } else {
            StreakState::None
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn grade_category(&self, category: ServiceCategory, metrics: &CategorySlotMetrics) -> CategoryGrade {
        let target = self.config.standards.target_for(category);
        let passed = metrics
            .fulfillment_minutes
            .iter()
            .filter(|&&m| m <= target)
            .count() as u32;
        CategoryGrade {
            total: metrics.order_count,
            passed,
            failed: metrics.order_count - passed,
            avg_fulfillment_minutes: metrics.avg_fulfillment_minutes,
            target_minutes: target,
            meets_standard: metrics.avg_fulfillment_minutes <= target,
            baseline: None,
        }
    }

    fn peak_flag(&self, record: &TimeslotRecord) -> (bool, Option<String>) {
        let start = time_to_minutes(record.start);
        let end = slot_end_minutes(record.start, record.end);
        match self
            .config
            .peak_bands
            .iter()
            .find(|band| band.intersects(start, end))
        {
            Some(band) => (true, Some(band.name.clone())),
            None => (false, None),
        }
    }
}

fn lookup_baseline(
    source: &dyn BaselineSource,
    record: &TimeslotRecord,
    category: ServiceCategory,
    day_of_week: u8,
    actual_avg: f64,
) -> Option<BaselineComparison> {
    let base = PatternKey::new(
        record.restaurant_code.clone(),
        category,
        record.hour(),
        day_of_week,
    );
    let key = TimeslotPatternKey::new(base, record.shift, record.timeslot_id());
    source.baseline_for(&key).map(|m| BaselineComparison {
        expected_minutes: m.stats.expected_value(),
        confidence: m.stats.confidence(),
        source: m.source,
        delta_minutes: actual_avg - m.stats.expected_value(),
    })
}

/// 记录契约校验
fn validate_record(record: &TimeslotRecord) -> Result<(), GradingError> {
    let start = time_to_minutes(record.start);
    let end = slot_end_minutes(record.start, record.end);
    if start >= end {
        return Err(GradingError::InvalidInterval {
            shift: record.shift,
            slot_index: record.slot_index,
            start: record.start.format("%H:%M").to_string(),
            end: record.end.format("%H:%M").to_string(),
        });
    }

    let mut sum = 0u32;
    for (category, metrics) in &record.categories {
        if metrics.fulfillment_minutes.len() != metrics.order_count as usize {
            return Err(GradingError::CountMismatch {
                shift: record.shift,
                slot_index: record.slot_index,
                category: *category,
                count: metrics.order_count,
                durations: metrics.fulfillment_minutes.len(),
            });
        }
        if let Some(bad) = metrics
            .fulfillment_minutes
            .iter()
            .find(|m| !m.is_finite() || **m < 0.0)
        {
            return Err(GradingError::InvalidDuration {
                shift: record.shift,
                slot_index: record.slot_index,
                category: *category,
                value: *bad,
            });
        }
        if metrics.order_count > 0 {
            let expected =
                metrics.fulfillment_minutes.iter().sum::<f64>() / metrics.order_count as f64;
            if (expected - metrics.avg_fulfillment_minutes).abs() > AVERAGE_TOLERANCE {
                return Err(GradingError::AverageMismatch {
                    shift: record.shift,
                    slot_index: record.slot_index,
                    category: *category,
                    avg: metrics.avg_fulfillment_minutes,
                    expected,
                });
            }
        }
        sum += metrics.order_count;
    }

    if sum != record.total_orders {
        return Err(GradingError::TotalMismatch {
            shift: record.shift,
            slot_index: record.slot_index,
            total: record.total_orders,
            sum,
        });
    }
    Ok(())
}

/// 班次汇总
fn summarize_shift(shift: Shift, slots: Vec<GradedTimeslot>) -> ShiftGradeSummary {
    let mut non_empty_slots = 0;
    let mut passed_slots = 0;
    let mut failed_slots = 0;
    let mut hot_slots = 0;
    let mut cold_slots = 0;
    let mut total_orders = 0u32;
    let mut category_totals: BTreeMap<ServiceCategory, CategoryTotals> = BTreeMap::new();

    for slot in &slots {
        match slot.outcome {
            SlotOutcome::Passed => passed_slots += 1,
            SlotOutcome::Failed => failed_slots += 1,
            SlotOutcome::NoOrders => continue,
        }
        non_empty_slots += 1;
        match slot.streak {
            StreakState::Hot => hot_slots += 1,
            StreakState::Cold => cold_slots += 1,
            StreakState::None => {}
        }
        total_orders += slot.record.total_orders;
        for (category, grade) in &slot.category_stats {
            let totals = category_totals.entry(*category).or_default();
            totals.total += grade.total;
            totals.passed += grade.passed;
            totals.failed += grade.failed;
        }
    }

    let slot_pass_rate = if non_empty_slots == 0 {
        None
    } else {
        Some(round1(passed_slots as f64 / non_empty_slots as f64 * 100.0))
    };

    ShiftGradeSummary {
        shift,
        total_slots: slots.len(),
        slots,
        non_empty_slots,
        passed_slots,
        failed_slots,
        hot_slots,
        cold_slots,
        slot_pass_rate,
        total_orders,
        category_totals,
    }
}
