// ==========================================
// 门店服务评级系统 - 产能压力分析引擎
// ==========================================
// 职责: 时段压力、班次压力等级、渠道表现分层
// 输入: TimeslotRecord / ShiftGradeSummary
// 输出: ShiftCapacityReport / ChannelPerformance / DayCapacityReport
// 红线: 纯计算,不读写存储
// ==========================================

use crate::config::{CapacityConfig, ChannelTierConfig, GradingConfig};
use crate::domain::capacity::{ChannelPerformance, DayCapacityReport, ShiftCapacityReport, SlotStress};
use crate::domain::timeslot::{DayGradeReport, ShiftGradeSummary, TimeslotRecord};
use crate::domain::types::{ChannelTier, Shift, StressStatus};
use crate::engine::grader::round1;
use crate::engine::windower::WindowedDay;
use tracing::debug;

// ==========================================
// CapacityAnalyzer - 产能压力分析引擎
// ==========================================
pub struct CapacityAnalyzer {
    capacity: CapacityConfig,
    tiers: ChannelTierConfig,
}

impl CapacityAnalyzer {
    pub fn new(capacity: CapacityConfig, tiers: ChannelTierConfig) -> Self {
        Self { capacity, tiers }
    }

    pub fn from_config(config: &GradingConfig) -> Self {
        Self::new(config.capacity.clone(), config.channel_tiers.clone())
    }

    /// 单时段压力 = 订单数 / 时段产能
    pub fn slot_stress(&self, record: &TimeslotRecord) -> SlotStress {
        let max = self.capacity.max_orders_per_slot.max(1) as f64;
        let stress = record.total_orders as f64 / max;
        SlotStress {
            slot_index: record.slot_index,
            start: record.start,
            end: record.end,
            total_orders: record.total_orders,
            stress,
            is_stressed: stress > self.capacity.stress_threshold,
        }
    }

    /// 班次压力报告
    pub fn analyze_shift(&self, shift: Shift, records: &[TimeslotRecord]) -> ShiftCapacityReport {
        let slots: Vec<SlotStress> = records.iter().map(|r| self.slot_stress(r)).collect();

        let total_slots = slots.len();
        let stressed_slots = slots.iter().filter(|s| s.is_stressed).count();
        let stress_pct = if total_slots == 0 {
            0.0
        } else {
            round1(stressed_slots as f64 / total_slots as f64 * 100.0)
        };
        let peak_stress = slots.iter().map(|s| s.stress).fold(0.0, f64::max);

        // 并列取最早时段；全部为空时无最忙时段
        let mut busiest_slot: Option<(usize, u32)> = None;
        for slot in &slots {
            if slot.total_orders == 0 {
                continue;
            }
            match busiest_slot {
                Some((_, best)) if best >= slot.total_orders => {}
                _ => busiest_slot = Some((slot.slot_index, slot.total_orders)),
            }
        }

        let status = self.classify_status(stress_pct);
        debug!(shift = %shift, stressed_slots, total_slots, stress_pct, status = ?status, "班次压力分析完成");

        ShiftCapacityReport {
            shift,
            slots,
            stressed_slots,
            total_slots,
            stress_pct,
            status,
            peak_stress,
            busiest_slot: busiest_slot.map(|(idx, _)| idx),
        }
    }

    /// 压力等级
    pub fn classify_status(&self, stress_pct: f64) -> StressStatus {
        if stress_pct <= self.capacity.good_max_pct {
            StressStatus::Good
        } else if stress_pct <= self.capacity.warning_max_pct {
            StressStatus::Warning
        } else {
            StressStatus::Critical
        }
    }

    /// 渠道表现分层
    pub fn classify_channel(&self, success_rate: f64) -> ChannelTier {
        if success_rate >= self.tiers.excellent_min_pct {
            ChannelTier::Excellent
        } else if success_rate >= self.tiers.acceptable_min_pct {
            ChannelTier::Acceptable
        } else {
            ChannelTier::Poor
        }
    }

    /// 班次内各渠道表现（仅统计有订单的渠道）
    pub fn channel_performance(&self, summary: &ShiftGradeSummary) -> Vec<ChannelPerformance> {
        summary
            .category_totals
            .iter()
            .filter_map(|(category, totals)| {
                totals.success_rate().map(|rate| {
                    let success_rate = round1(rate);
                    ChannelPerformance {
                        category: *category,
                        total_orders: totals.total,
                        success_rate,
                        tier: self.classify_channel(success_rate),
                    }
                })
            })
            .collect()
    }

    /// 单日产能报告
    pub fn analyze_day(&self, day: &WindowedDay, report: &DayGradeReport) -> DayCapacityReport {
        let shifts = day
            .shifts
            .iter()
            .map(|windowed| self.analyze_shift(windowed.shift, &windowed.records))
            .collect();

        let channels = report
            .shifts
            .iter()
            .map(|summary| (summary.shift, self.channel_performance(summary)))
            .collect();

        DayCapacityReport {
            restaurant_code: report.restaurant_code.clone(),
            business_date: report.business_date,
            shifts,
            channels,
        }
    }
}
