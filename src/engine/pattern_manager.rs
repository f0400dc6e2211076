// ==========================================
// 门店服务评级系统 - 历史基线学习引擎
// ==========================================
// 职责: EMA 学习、可靠性门槛、跨星期降级查询
// 存储: 小时级 / 时段级两个 PatternStore
// 红线: 存储故障不得中断评级流程（learn → Skipped, get → None）
// 红线: 写入经单一写锁串行化,同一键不存在并发写
// ==========================================

use crate::config::{LearningConfig, StoreConfig};
use crate::domain::error::ValidationError;
use crate::domain::pattern::{
    ClearScope, MatchSource, Pattern, PatternFilter, PatternKey, PatternKeyFields, PatternMatch,
    PatternRecord, PatternStats, TimeslotPattern, TimeslotPatternKey,
};
use crate::domain::timeslot::DayGradeReport;
use crate::domain::types::{ServiceCategory, SlotOutcome};
use crate::engine::error::PatternError;
use crate::engine::grader::BaselineSource;
use crate::perf::StoreCallGuard;
use crate::repository::pattern_store::PatternStore;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub use crate::domain::pattern::asymptotic_confidence;

// ==========================================
// 学习结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome<P = Pattern> {
    Learned(P),
    Skipped { reason: String },
}

impl<P> LearnOutcome<P> {
    pub fn is_learned(&self) -> bool {
        matches!(self, LearnOutcome::Learned(_))
    }

    pub fn learned(&self) -> Option<&P> {
        match self {
            LearnOutcome::Learned(p) => Some(p),
            LearnOutcome::Skipped { .. } => None,
        }
    }
}

/// 日报批量学习汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSummary {
    pub learned: usize,
    pub skipped: usize,  // 存储故障
    pub rejected: usize, // 校验失败
}

impl LearningSummary {
    fn record<P>(&mut self, result: Result<LearnOutcome<P>, PatternError>) {
        match result {
            Ok(LearnOutcome::Learned(_)) => self.learned += 1,
            Ok(LearnOutcome::Skipped { .. }) => self.skipped += 1,
            Err(_) => self.rejected += 1,
        }
    }
}

// ==========================================
// PatternManager - 基线学习引擎
// ==========================================
pub struct PatternManager {
    hourly: Arc<dyn PatternStore<Pattern>>,
    timeslot: Arc<dyn PatternStore<TimeslotPattern>>,
    learning: LearningConfig,
    latency_target: Duration,
    learn_lock: Mutex<()>,
}

impl PatternManager {
    pub fn new(
        hourly: Arc<dyn PatternStore<Pattern>>,
        timeslot: Arc<dyn PatternStore<TimeslotPattern>>,
        learning: LearningConfig,
        store: StoreConfig,
    ) -> Self {
        Self {
            hourly,
            timeslot,
            learning,
            latency_target: Duration::from_millis(store.latency_target_ms),
            learn_lock: Mutex::new(()),
        }
    }

    pub fn learning_config(&self) -> &LearningConfig {
        &self.learning
    }

    // ==========================================
    // 学习
    // ==========================================

    pub fn learn(&self, key: &PatternKey, observed: f64) -> Result<LearnOutcome, PatternError> {
        self.learn_at(key, observed, Utc::now().naive_utc())
    }

    pub fn learn_at(
        &self,
        key: &PatternKey,
        observed: f64,
        now: NaiveDateTime,
    ) -> Result<LearnOutcome, PatternError> {
        self.learn_in(self.hourly.as_ref(), key, observed, now)
    }

    pub fn learn_timeslot(
        &self,
        key: &TimeslotPatternKey,
        observed: f64,
    ) -> Result<LearnOutcome<TimeslotPattern>, PatternError> {
        self.learn_timeslot_at(key, observed, Utc::now().naive_utc())
    }

    pub fn learn_timeslot_at(
        &self,
        key: &TimeslotPatternKey,
        observed: f64,
        now: NaiveDateTime,
    ) -> Result<LearnOutcome<TimeslotPattern>, PatternError> {
        self.learn_in(self.timeslot.as_ref(), key, observed, now)
    }

    /// 下一版统计值
    ///
    /// 首次观测: value = observed, n = 1
    /// 后续: α 按已有观测次数取 early / mature, value = (1-α)·old + α·observed
    pub fn next_stats(&self, existing: Option<&PatternStats>, observed: f64, now: NaiveDateTime) -> PatternStats {
        let cap = self.learning.confidence_cap;
        match existing {
            None => PatternStats::observed(observed, 1, cap, now),
            Some(old) => {
                let alpha = if old.observation_count() < self.learning.maturity_observations {
                    self.learning.early_alpha
                } else {
                    self.learning.mature_alpha
                };
                let count = old.observation_count().saturating_add(1);
                PatternStats::observed(
                    (1.0 - alpha) * old.expected_value() + alpha * observed,
                    count,
                    cap,
                    now,
                )
            }
        }
    }

    fn learn_in<P: PatternRecord>(
        &self,
        store: &dyn PatternStore<P>,
        key: &P::Key,
        observed: f64,
        now: NaiveDateTime,
    ) -> Result<LearnOutcome<P>, PatternError> {
        key.validate()?;
        if !observed.is_finite() || observed < 0.0 {
            return Err(ValidationError::InvalidObservation {
                field: "observed".to_string(),
                value: observed,
            }
            .into());
        }

        // 读-改-写在写锁内完成
        let _guard = self.learn_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _perf = StoreCallGuard::new("pattern_manager.learn", self.latency_target);

        let existing = match store.get(key) {
            Ok(existing) => existing,
            Err(e) => return Ok(skipped(key, "读取失败", &e)),
        };

        let stats = self.next_stats(existing.as_ref().map(|p| p.stats()), observed, now);
        let pattern = P::from_parts(key.clone(), stats);

        if let Err(e) = store.upsert(&pattern) {
            return Ok(skipped(key, "写入失败", &e));
        }

        debug!(
            key = %key,
            observed,
            expected = pattern.stats().expected_value(),
            count = pattern.stats().observation_count(),
            "基线已更新"
        );
        Ok(LearnOutcome::Learned(pattern))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 小时级基线: 精确可靠 → 同小时跨星期均值 → None
    pub fn get(&self, key: &PatternKey) -> Result<Option<PatternMatch>, PatternError> {
        key.validate()?;
        Ok(self.get_in(self.hourly.as_ref(), key))
    }

    /// 时段级基线: 精确可靠 → 同班次同时段跨星期均值 → 小时级查询
    pub fn get_timeslot(&self, key: &TimeslotPatternKey) -> Result<Option<PatternMatch>, PatternError> {
        key.validate()?;
        if let Some(found) = self.get_in(self.timeslot.as_ref(), key) {
            return Ok(Some(found));
        }
        Ok(self.get_in(self.hourly.as_ref(), &key.base).map(|m| PatternMatch {
            stats: m.stats,
            source: MatchSource::HourlyFallback,
        }))
    }

    fn get_in<P: PatternRecord>(&self, store: &dyn PatternStore<P>, key: &P::Key) -> Option<PatternMatch> {
        let _perf = StoreCallGuard::new("pattern_manager.get", self.latency_target);
        let min_conf = self.learning.min_confidence;
        let min_obs = self.learning.min_observations;

        // 1. 精确键
        match store.get(key) {
            Ok(Some(p)) if p.stats().is_reliable(min_conf, min_obs) => {
                return Some(PatternMatch {
                    stats: p.stats().clone(),
                    source: MatchSource::Exact,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "基线读取失败,按无基线处理");
                return None;
            }
        }

        // 2. 同小时其它星期
        let filter = PatternFilter {
            restaurant_code: Some(key.restaurant_code().to_string()),
            service_type: Some(key.service_type()),
            hour: Some(key.hour()),
            day_of_week: None,
            shift: key.shift(),
            timeslot_id: key.timeslot_id().map(str::to_string),
        };
        let candidates = match store.list(&filter) {
            Ok(list) => list,
            Err(e) => {
                warn!(key = %key, error = %e, "跨星期基线读取失败,按无基线处理");
                return None;
            }
        };

        let reliable: Vec<&PatternStats> = candidates
            .iter()
            .filter(|p| p.key().day_of_week() != key.day_of_week())
            .map(|p| p.stats())
            .filter(|s| s.is_reliable(min_conf, min_obs))
            .collect();

        cross_day_average(&reliable)
    }

    // ==========================================
    // 管理操作
    // ==========================================

    pub fn get_all_for_service(
        &self,
        restaurant_code: &str,
        service_type: ServiceCategory,
    ) -> Result<Vec<Pattern>, PatternError> {
        Ok(self.hourly.list(&PatternFilter::for_service(restaurant_code, service_type))?)
    }

    pub fn get_all_timeslot_for_service(
        &self,
        restaurant_code: &str,
        service_type: ServiceCategory,
    ) -> Result<Vec<TimeslotPattern>, PatternError> {
        Ok(self.timeslot.list(&PatternFilter::for_service(restaurant_code, service_type))?)
    }

    /// 清空门店全部基线（两级存储）,返回删除条数
    pub fn clear_all(&self, restaurant_code: &str) -> Result<usize, PatternError> {
        let scope = ClearScope::Restaurant {
            restaurant_code: restaurant_code.to_string(),
        };
        let _guard = self.learn_lock.lock().unwrap_or_else(|e| e.into_inner());
        let hourly = self.hourly.clear(&scope)?;
        let timeslot = self.timeslot.clear(&scope)?;
        info!(restaurant_code, hourly, timeslot, "门店基线已清空");
        Ok(hourly + timeslot)
    }

    // ==========================================
    // 日报批量学习
    // ==========================================

    pub fn learn_from_report(&self, report: &DayGradeReport) -> LearningSummary {
        self.learn_from_report_at(report, Utc::now().naive_utc())
    }

    /// 从日报学习
    ///
    /// - 时段级: 每个有订单时段的各渠道均值
    /// - 小时级: 每 (小时, 渠道) 一次,取该小时各时段均值的订单数加权平均
    #[instrument(skip(self, report), fields(restaurant_code = %report.restaurant_code, business_date = %report.business_date))]
    pub fn learn_from_report_at(&self, report: &DayGradeReport, now: NaiveDateTime) -> LearningSummary {
        let mut summary = LearningSummary::default();
        let mut hourly: BTreeMap<(u8, ServiceCategory), (f64, u32)> = BTreeMap::new();

        for shift in &report.shifts {
            for slot in &shift.slots {
                if slot.outcome == SlotOutcome::NoOrders {
                    continue;
                }
                let hour = slot.record.hour();
                for (category, grade) in &slot.category_stats {
                    let base = PatternKey::new(
                        report.restaurant_code.clone(),
                        *category,
                        hour,
                        report.day_of_week,
                    );
                    let key = TimeslotPatternKey::new(base, shift.shift, slot.record.timeslot_id());
                    summary.record(self.learn_timeslot_at(&key, grade.avg_fulfillment_minutes, now));

                    let entry = hourly.entry((hour, *category)).or_insert((0.0, 0));
                    entry.0 += grade.avg_fulfillment_minutes * grade.total as f64;
                    entry.1 += grade.total;
                }
            }
        }

        for ((hour, category), (weighted_sum, orders)) in hourly {
            if orders == 0 {
                continue;
            }
            let key = PatternKey::new(report.restaurant_code.clone(), category, hour, report.day_of_week);
            summary.record(self.learn_at(&key, weighted_sum / orders as f64, now));
        }

        if summary.skipped > 0 || summary.rejected > 0 {
            warn!(
                learned = summary.learned,
                skipped = summary.skipped,
                rejected = summary.rejected,
                "部分基线未能学习"
            );
        } else {
            info!(learned = summary.learned, "日报基线学习完成");
        }
        summary
    }
}

impl BaselineSource for PatternManager {
    fn baseline_for(&self, key: &TimeslotPatternKey) -> Option<PatternMatch> {
        match self.get_timeslot(key) {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "基线键无效");
                None
            }
        }
    }
}

fn skipped<P, K: std::fmt::Display>(key: &K, stage: &str, error: &dyn std::fmt::Display) -> LearnOutcome<P> {
    warn!(key = %key, error = %error, "基线{},本次观测跳过", stage);
    LearnOutcome::Skipped {
        reason: format!("{}: {}", stage, error),
    }
}

/// 跨星期均值
fn cross_day_average(patterns: &[&PatternStats]) -> Option<PatternMatch> {
    Some(PatternMatch {
        stats: PatternStats::aggregate(patterns)?,
        source: MatchSource::CrossDayAverage {
            days_averaged: patterns.len(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asymptotic_confidence() {
        assert_eq!(asymptotic_confidence(1, 0.95), 0.5);
        assert!((asymptotic_confidence(2, 0.95) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(asymptotic_confidence(4, 0.95), 0.8);
        assert_eq!(asymptotic_confidence(100, 0.95), 0.95);
    }

    #[test]
    fn test_confidence_monotonic() {
        let mut prev = 0.0;
        for n in 1..50 {
            let c = asymptotic_confidence(n, 0.95);
            assert!(c >= prev);
            assert!(c <= 0.95);
            prev = c;
        }
    }

    #[test]
    fn test_cross_day_average_empty() {
        assert!(cross_day_average(&[]).is_none());
    }
}
