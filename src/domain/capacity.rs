// ==========================================
// 门店服务评级系统 - 产能压力领域模型
// ==========================================
// 用途: 时段压力、班次压力等级、渠道表现等级
// 红线: 只读派生数据,不回写时段记录
// ==========================================

use crate::domain::timeslot::hhmm;
use crate::domain::types::{ChannelTier, ServiceCategory, Shift, StressStatus};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// SlotStress - 单时段压力
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStress {
    pub slot_index: usize,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub total_orders: u32,
    pub stress: f64,       // total_orders / max_orders_per_slot
    pub is_stressed: bool, // stress > stress_threshold
}

// ==========================================
// ShiftCapacityReport - 班次压力报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftCapacityReport {
    pub shift: Shift,
    pub slots: Vec<SlotStress>,
    pub stressed_slots: usize,
    pub total_slots: usize,
    pub stress_pct: f64, // stressed / total × 100, 一位小数
    pub status: StressStatus,
    pub peak_stress: f64,
    pub busiest_slot: Option<usize>, // 订单最多的时段序号（并列取最早）
}

// ==========================================
// ChannelPerformance - 渠道表现
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPerformance {
    pub category: ServiceCategory,
    pub total_orders: u32,
    pub success_rate: f64, // 达标订单 / 总订单 × 100, 一位小数
    pub tier: ChannelTier,
}

// ==========================================
// DayCapacityReport - 日产能报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCapacityReport {
    pub restaurant_code: String,
    pub business_date: NaiveDate,
    pub shifts: Vec<ShiftCapacityReport>,
    pub channels: Vec<(Shift, Vec<ChannelPerformance>)>,
}

impl DayCapacityReport {
    pub fn shift(&self, shift: Shift) -> Option<&ShiftCapacityReport> {
        self.shifts.iter().find(|s| s.shift == shift)
    }

    /// 全天最严重的压力等级
    pub fn worst_status(&self) -> StressStatus {
        self.shifts
            .iter()
            .map(|s| s.status)
            .max()
            .unwrap_or(StressStatus::Good)
    }
}
