// ==========================================
// 门店服务评级系统 - 时段分桶引擎
// ==========================================
// 职责: 将单日已归类订单按班次切分为固定宽度时段
// 输入: OrderRecord 列表 + 分桶配置
// 输出: TimeslotRecord（每时段一条,空时段同样输出）
// 红线: 固定基数输出; 同输入同配置必得同输出
// ==========================================

use crate::config::{ConfigError, WindowingConfig};
use crate::domain::order::OrderRecord;
use crate::domain::timeslot::{CategorySlotMetrics, TimeslotRecord, WindowDiagnostics};
use crate::domain::types::{ServiceCategory, Shift};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// 当日分钟数 → NaiveTime（24:00 表示为 00:00）
pub(crate) fn minutes_to_time(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt((minutes / 60) % 24, minutes % 60, 0).unwrap_or_default()
}

/// NaiveTime → 当日分钟数
pub(crate) fn time_to_minutes(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

/// 时段结束分钟数；结束于 00:00 且起点非 00:00 时视为 24:00
pub(crate) fn slot_end_minutes(start: NaiveTime, end: NaiveTime) -> u32 {
    let end_min = time_to_minutes(end);
    if end_min == 0 && time_to_minutes(start) != 0 {
        24 * 60
    } else {
        end_min
    }
}

// ==========================================
// 分桶结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedShift {
    pub shift: Shift,
    pub records: Vec<TimeslotRecord>,
    pub dropped_outside_hours: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedDay {
    pub restaurant_code: String,
    pub business_date: NaiveDate,
    pub shifts: Vec<WindowedShift>, // 固定顺序: Morning, Evening
    pub diagnostics: WindowDiagnostics,
}

impl WindowedDay {
    pub fn shift(&self, shift: Shift) -> Option<&WindowedShift> {
        self.shifts.iter().find(|s| s.shift == shift)
    }

    pub fn total_slots(&self) -> usize {
        self.shifts.iter().map(|s| s.records.len()).sum()
    }
}

type SlotBucket = BTreeMap<ServiceCategory, Vec<f64>>;

// ==========================================
// TimeslotWindower - 时段分桶引擎
// ==========================================
pub struct TimeslotWindower {
    config: WindowingConfig,
}

impl TimeslotWindower {
    /// 构造函数（配置先校验）
    pub fn new(config: WindowingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WindowingConfig {
        &self.config
    }

    /// 班次内各时段的 [start, end) 分钟区间
    fn slot_minutes(&self, shift: Shift) -> Vec<(u32, u32)> {
        let hours = self.config.hours_for(shift);
        let width = self.config.interval_minutes;
        let shift_start = hours.start_hour as u32 * 60;
        (0..self.config.slots_per_shift(shift) as u32)
            .map(|i| (shift_start + i * width, shift_start + (i + 1) * width))
            .collect()
    }

    /// 班次内各时段的起止时间
    pub fn slot_bounds(&self, shift: Shift) -> Vec<(NaiveTime, NaiveTime)> {
        self.slot_minutes(shift)
            .into_iter()
            .map(|(s, e)| (minutes_to_time(s), minutes_to_time(e)))
            .collect()
    }

    /// 定位完成时刻所属 (班次, 时段序号)
    pub fn locate(&self, time: NaiveTime) -> Option<(Shift, usize)> {
        let minute = time_to_minutes(time);
        Shift::ALL.into_iter().find_map(|shift| {
            self.slot_index_in(shift, minute).map(|idx| (shift, idx))
        })
    }

    fn slot_index_in(&self, shift: Shift, minute: u32) -> Option<usize> {
        let hours = self.config.hours_for(shift);
        let start = hours.start_hour as u32 * 60;
        let end = hours.end_hour as u32 * 60;
        if minute < start || minute >= end {
            return None;
        }
        Some(((minute - start) / self.config.interval_minutes) as usize)
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 单班次分桶
    ///
    /// 班次小时范围以外的订单丢弃并计数（不是错误）
    #[instrument(skip(self, orders), fields(restaurant_code = %restaurant_code, shift = %shift, orders = orders.len()))]
    pub fn window_shift(
        &self,
        restaurant_code: &str,
        shift: Shift,
        orders: &[OrderRecord],
    ) -> WindowedShift {
        let mut buckets: Vec<SlotBucket> = vec![SlotBucket::new(); self.config.slots_per_shift(shift)];
        let mut dropped = 0usize;

        for order in orders {
            let minute = time_to_minutes(order.completion_time());
            match self.slot_index_in(shift, minute) {
                Some(idx) => buckets[idx]
                    .entry(order.category)
                    .or_default()
                    .push(order.fulfillment_minutes),
                None => dropped += 1,
            }
        }

        debug!(dropped_outside_hours = dropped, "班次分桶完成");

        WindowedShift {
            shift,
            records: self.build_records(restaurant_code, shift, buckets),
            dropped_outside_hours: dropped,
        }
    }

    /// 单日分桶（早班 + 晚班）
    ///
    /// 丢弃规则:
    /// - 门店代码不一致 → dropped_other_restaurant
    /// - 完成日期不是营业日 → dropped_other_date
    /// - 不在任何班次小时范围内 → dropped_outside_shift_hours
    #[instrument(skip(self, orders), fields(restaurant_code = %restaurant_code, business_date = %business_date, orders = orders.len()))]
    pub fn window_day(
        &self,
        restaurant_code: &str,
        business_date: NaiveDate,
        orders: &[OrderRecord],
    ) -> WindowedDay {
        let mut diagnostics = WindowDiagnostics {
            total_input: orders.len(),
            ..WindowDiagnostics::default()
        };

        let mut buckets: BTreeMap<Shift, Vec<SlotBucket>> = Shift::ALL
            .into_iter()
            .map(|shift| (shift, vec![SlotBucket::new(); self.config.slots_per_shift(shift)]))
            .collect();

        for order in orders {
            if order.restaurant_code != restaurant_code {
                diagnostics.dropped_other_restaurant += 1;
                continue;
            }
            if order.business_date() != business_date {
                diagnostics.dropped_other_date += 1;
                continue;
            }
            match self.locate(order.completion_time()) {
                Some((shift, idx)) => {
                    if let Some(slot) = buckets.get_mut(&shift).and_then(|b| b.get_mut(idx)) {
                        slot.entry(order.category)
                            .or_default()
                            .push(order.fulfillment_minutes);
                        diagnostics.assigned += 1;
                    }
                }
                None => diagnostics.dropped_outside_shift_hours += 1,
            }
        }

        if diagnostics.dropped() > 0 {
            info!(
                dropped_outside_shift_hours = diagnostics.dropped_outside_shift_hours,
                dropped_other_restaurant = diagnostics.dropped_other_restaurant,
                dropped_other_date = diagnostics.dropped_other_date,
                "部分订单未进入时段"
            );
        }

        let shifts = Shift::ALL
            .into_iter()
            .map(|shift| {
                let shift_buckets = buckets.remove(&shift).unwrap_or_default();
                WindowedShift {
                    shift,
                    records: self.build_records(restaurant_code, shift, shift_buckets),
                    dropped_outside_hours: 0,
                }
            })
            .collect();

        WindowedDay {
            restaurant_code: restaurant_code.to_string(),
            business_date,
            shifts,
            diagnostics,
        }
    }

    fn build_records(
        &self,
        restaurant_code: &str,
        shift: Shift,
        buckets: Vec<SlotBucket>,
    ) -> Vec<TimeslotRecord> {
        self.slot_minutes(shift)
            .into_iter()
            .zip(buckets)
            .enumerate()
            .map(|(slot_index, ((start, end), bucket))| {
                let categories: BTreeMap<ServiceCategory, CategorySlotMetrics> = bucket
                    .into_iter()
                    .map(|(category, durations)| (category, CategorySlotMetrics::from_durations(durations)))
                    .collect();
                let total_orders = categories.values().map(|m| m.order_count).sum();
                TimeslotRecord {
                    restaurant_code: restaurant_code.to_string(),
                    shift,
                    slot_index,
                    start: minutes_to_time(start),
                    end: minutes_to_time(end),
                    categories,
                    total_orders,
                }
            })
            .collect()
    }
}
