// ==========================================
// 门店服务评级系统 - 时段领域模型
// ==========================================
// 职责: 时段汇总记录、评级结果、班次/日汇总
// 红线: TimeslotRecord 生成后只读,派生数据一律复制
// ==========================================

use crate::domain::pattern::MatchSource;
use crate::domain::types::{DataCompleteness, ServiceCategory, Shift, SlotOutcome, StreakState};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HH:MM 序列化
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// 格式化时段标识: "HH:MM-HH:MM"
pub fn format_timeslot_id(start: NaiveTime, end: NaiveTime) -> String {
    format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
}

// ==========================================
// CategorySlotMetrics - 单渠道时段指标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySlotMetrics {
    pub order_count: u32,              // 订单数
    pub avg_fulfillment_minutes: f64,  // 平均出餐时长
    pub fulfillment_minutes: Vec<f64>, // 各订单出餐时长（按输入顺序）
}

impl CategorySlotMetrics {
    /// 由订单时长列表构造
    pub fn from_durations(durations: Vec<f64>) -> Self {
        let order_count = durations.len() as u32;
        let avg_fulfillment_minutes = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        Self {
            order_count,
            avg_fulfillment_minutes,
            fulfillment_minutes: durations,
        }
    }
}

// ==========================================
// TimeslotRecord - 时段汇总记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeslotRecord {
    pub restaurant_code: String,
    pub shift: Shift,
    pub slot_index: usize, // 班次内序号 (从0开始)
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub categories: BTreeMap<ServiceCategory, CategorySlotMetrics>,
    pub total_orders: u32,
}

impl TimeslotRecord {
    pub fn timeslot_id(&self) -> String {
        format_timeslot_id(self.start, self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.total_orders == 0
    }

    /// 时段起始小时（基线键使用）
    pub fn hour(&self) -> u8 {
        use chrono::Timelike;
        self.start.hour() as u8
    }
}

// ==========================================
// BaselineComparison - 历史基线对比
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub expected_minutes: f64,
    pub confidence: f64,
    pub source: MatchSource,
    pub delta_minutes: f64, // 实际均值 - 基线值 (正数 = 慢于基线)
}

// ==========================================
// CategoryGrade - 单渠道评级
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGrade {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub avg_fulfillment_minutes: f64,
    pub target_minutes: f64,
    pub meets_standard: bool, // 均值 <= 目标
    pub baseline: Option<BaselineComparison>,
}

// ==========================================
// GradedTimeslot - 时段评级结果
// ==========================================
// 红线: 当日生成后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedTimeslot {
    pub record: TimeslotRecord,
    pub outcome: SlotOutcome,
    pub pass_rate: Option<f64>, // 0-100, 一位小数；无订单为 None
    pub streak: StreakState,
    pub category_stats: BTreeMap<ServiceCategory, CategoryGrade>,
    pub is_peak: bool,
    pub peak_band: Option<String>,
}

impl GradedTimeslot {
    pub fn passed(&self) -> Option<bool> {
        self.outcome.passed()
    }
}

// ==========================================
// CategoryTotals - 渠道汇总
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl CategoryTotals {
    /// 订单达标率 (0-100)；无订单为 None
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.passed as f64 / self.total as f64 * 100.0)
    }
}

// ==========================================
// ShiftGradeSummary - 班次评级汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftGradeSummary {
    pub shift: Shift,
    pub slots: Vec<GradedTimeslot>,
    pub total_slots: usize,
    pub non_empty_slots: usize,
    pub passed_slots: usize,
    pub failed_slots: usize,
    pub hot_slots: usize,
    pub cold_slots: usize,
    pub slot_pass_rate: Option<f64>, // 通过时段 / 非空时段 × 100
    pub total_orders: u32,
    pub category_totals: BTreeMap<ServiceCategory, CategoryTotals>,
}

// ==========================================
// WindowDiagnostics - 分桶诊断
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDiagnostics {
    pub total_input: usize,
    pub assigned: usize,
    pub dropped_outside_shift_hours: usize,
    pub dropped_other_restaurant: usize,
    pub dropped_other_date: usize,
}

impl WindowDiagnostics {
    pub fn dropped(&self) -> usize {
        self.dropped_outside_shift_hours + self.dropped_other_restaurant + self.dropped_other_date
    }
}

// ==========================================
// DayGradeReport - 日评级报告
// ==========================================
// 下游 JSON 导出 / 驾驶舱的唯一输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayGradeReport {
    pub restaurant_code: String,
    pub business_date: NaiveDate,
    pub day_of_week: u8, // 0 = 周一
    pub shifts: Vec<ShiftGradeSummary>,
    pub diagnostics: WindowDiagnostics,
    pub completeness: DataCompleteness,
}

impl DayGradeReport {
    pub fn shift(&self, shift: Shift) -> Option<&ShiftGradeSummary> {
        self.shifts.iter().find(|s| s.shift == shift)
    }
}
