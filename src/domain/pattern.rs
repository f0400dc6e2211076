// ==========================================
// 门店服务评级系统 - 基线模式领域模型
// ==========================================
// 职责: 基线键、基线统计值、查询过滤条件
// 红线: confidence 只能由观测次数推导,禁止直接赋值
// 红线: 更新时构造新值,不原地修改
// ==========================================

use crate::domain::error::ValidationError;
use crate::domain::types::{ServiceCategory, Shift};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// PatternKeyFields - 键字段访问
// ==========================================
// 用途: 过滤 / 清理范围判断对两类键统一处理
pub trait PatternKeyFields {
    fn restaurant_code(&self) -> &str;
    fn service_type(&self) -> ServiceCategory;
    fn hour(&self) -> u8;
    fn day_of_week(&self) -> u8;

    fn shift(&self) -> Option<Shift> {
        None
    }

    fn timeslot_id(&self) -> Option<&str> {
        None
    }

    /// 校验键字段
    fn validate(&self) -> Result<(), ValidationError>;
}

// ==========================================
// PatternKey - 小时级基线键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternKey {
    pub restaurant_code: String,
    pub service_type: ServiceCategory,
    pub hour: u8,        // 0-23
    pub day_of_week: u8, // 0-6, 0 = 周一
}

impl PatternKey {
    pub fn new(
        restaurant_code: impl Into<String>,
        service_type: ServiceCategory,
        hour: u8,
        day_of_week: u8,
    ) -> Self {
        Self {
            restaurant_code: restaurant_code.into(),
            service_type,
            hour,
            day_of_week,
        }
    }
}

impl PatternKeyFields for PatternKey {
    fn restaurant_code(&self) -> &str {
        &self.restaurant_code
    }

    fn service_type(&self) -> ServiceCategory {
        self.service_type
    }

    fn hour(&self) -> u8 {
        self.hour
    }

    fn day_of_week(&self) -> u8 {
        self.day_of_week
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.restaurant_code.trim().is_empty() {
            return Err(ValidationError::EmptyRestaurantCode);
        }
        if self.hour > 23 {
            return Err(ValidationError::HourOutOfRange(self.hour));
        }
        if self.day_of_week > 6 {
            return Err(ValidationError::DayOfWeekOutOfRange(self.day_of_week));
        }
        Ok(())
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/h{:02}/d{}",
            self.restaurant_code, self.service_type, self.hour, self.day_of_week
        )
    }
}

// ==========================================
// TimeslotPatternKey - 15分钟时段级基线键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeslotPatternKey {
    pub base: PatternKey,
    pub shift: Shift,
    pub timeslot_id: String, // "HH:MM-HH:MM"
}

impl TimeslotPatternKey {
    pub fn new(base: PatternKey, shift: Shift, timeslot_id: impl Into<String>) -> Self {
        Self {
            base,
            shift,
            timeslot_id: timeslot_id.into(),
        }
    }
}

impl PatternKeyFields for TimeslotPatternKey {
    fn restaurant_code(&self) -> &str {
        &self.base.restaurant_code
    }

    fn service_type(&self) -> ServiceCategory {
        self.base.service_type
    }

    fn hour(&self) -> u8 {
        self.base.hour
    }

    fn day_of_week(&self) -> u8 {
        self.base.day_of_week
    }

    fn shift(&self) -> Option<Shift> {
        Some(self.shift)
    }

    fn timeslot_id(&self) -> Option<&str> {
        Some(&self.timeslot_id)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.base.validate()?;
        if self.timeslot_id.trim().is_empty() {
            return Err(ValidationError::EmptyTimeslotId);
        }
        Ok(())
    }
}

impl fmt::Display for TimeslotPatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.base, self.shift, self.timeslot_id)
    }
}

/// 渐近置信度: min(cap, 1 - 1/(n+1))
pub fn asymptotic_confidence(observation_count: u32, cap: f64) -> f64 {
    (1.0 - 1.0 / (observation_count as f64 + 1.0)).min(cap)
}

// ==========================================
// PatternStats - 基线统计值（不可变值对象）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    expected_value: f64,
    confidence: f64,
    observation_count: u32,
    last_updated: NaiveDateTime,
}

impl PatternStats {
    /// 按观测次数推导置信度
    pub fn observed(
        expected_value: f64,
        observation_count: u32,
        confidence_cap: f64,
        last_updated: NaiveDateTime,
    ) -> Self {
        Self {
            expected_value,
            confidence: asymptotic_confidence(observation_count, confidence_cap),
            observation_count,
            last_updated,
        }
    }

    /// 由持久化字段原样还原（仓储层读取）
    pub(crate) fn restored(
        expected_value: f64,
        confidence: f64,
        observation_count: u32,
        last_updated: NaiveDateTime,
    ) -> Self {
        Self {
            expected_value,
            confidence,
            observation_count,
            last_updated,
        }
    }

    /// 多条基线聚合: 值与置信度取均值,观测次数求和,更新时间取最新
    pub(crate) fn aggregate(stats: &[&PatternStats]) -> Option<Self> {
        let last_updated = stats.iter().map(|s| s.last_updated).max()?;
        let n = stats.len() as f64;
        Some(Self {
            expected_value: stats.iter().map(|s| s.expected_value).sum::<f64>() / n,
            confidence: stats.iter().map(|s| s.confidence).sum::<f64>() / n,
            observation_count: stats.iter().map(|s| s.observation_count).sum(),
            last_updated,
        })
    }

    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn observation_count(&self) -> u32 {
        self.observation_count
    }

    pub fn last_updated(&self) -> NaiveDateTime {
        self.last_updated
    }

    /// 可靠性判定: 置信度与观测次数同时达标
    pub fn is_reliable(&self, min_confidence: f64, min_observations: u32) -> bool {
        self.confidence >= min_confidence && self.observation_count >= min_observations
    }
}

// ==========================================
// PatternRecord - 可存储的基线记录
// ==========================================
pub trait PatternRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Ord + fmt::Debug + fmt::Display + PatternKeyFields + Send + Sync + 'static;

    fn from_parts(key: Self::Key, stats: PatternStats) -> Self;

    fn key(&self) -> &Self::Key;

    fn stats(&self) -> &PatternStats;
}

/// 小时级基线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub key: PatternKey,
    pub stats: PatternStats,
}

impl PatternRecord for Pattern {
    type Key = PatternKey;

    fn from_parts(key: PatternKey, stats: PatternStats) -> Self {
        Self { key, stats }
    }

    fn key(&self) -> &PatternKey {
        &self.key
    }

    fn stats(&self) -> &PatternStats {
        &self.stats
    }
}

/// 时段级基线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeslotPattern {
    pub key: TimeslotPatternKey,
    pub stats: PatternStats,
}

impl PatternRecord for TimeslotPattern {
    type Key = TimeslotPatternKey;

    fn from_parts(key: TimeslotPatternKey, stats: PatternStats) -> Self {
        Self { key, stats }
    }

    fn key(&self) -> &TimeslotPatternKey {
        &self.key
    }

    fn stats(&self) -> &PatternStats {
        &self.stats
    }
}

// ==========================================
// PatternFilter / ClearScope - 查询与清理范围
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternFilter {
    pub restaurant_code: Option<String>,
    pub service_type: Option<ServiceCategory>,
    pub hour: Option<u8>,
    pub day_of_week: Option<u8>,
    pub shift: Option<Shift>,
    pub timeslot_id: Option<String>,
}

impl PatternFilter {
    /// 按门店 + 渠道过滤
    pub fn for_service(restaurant_code: &str, service_type: ServiceCategory) -> Self {
        Self {
            restaurant_code: Some(restaurant_code.to_string()),
            service_type: Some(service_type),
            ..Self::default()
        }
    }

    pub fn matches<K: PatternKeyFields>(&self, key: &K) -> bool {
        if let Some(code) = &self.restaurant_code {
            if key.restaurant_code() != code {
                return false;
            }
        }
        if let Some(service) = self.service_type {
            if key.service_type() != service {
                return false;
            }
        }
        if let Some(hour) = self.hour {
            if key.hour() != hour {
                return false;
            }
        }
        if let Some(dow) = self.day_of_week {
            if key.day_of_week() != dow {
                return false;
            }
        }
        // 小时级键没有班次/时段字段,带该条件时视为不匹配
        if let Some(shift) = self.shift {
            if key.shift() != Some(shift) {
                return false;
            }
        }
        if let Some(slot) = &self.timeslot_id {
            if key.timeslot_id() != Some(slot.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Restaurant {
        restaurant_code: String,
    },
    Service {
        restaurant_code: String,
        service_type: ServiceCategory,
    },
}

impl ClearScope {
    pub fn contains<K: PatternKeyFields>(&self, key: &K) -> bool {
        match self {
            ClearScope::All => true,
            ClearScope::Restaurant { restaurant_code } => key.restaurant_code() == restaurant_code,
            ClearScope::Service {
                restaurant_code,
                service_type,
            } => key.restaurant_code() == restaurant_code && key.service_type() == *service_type,
        }
    }
}

// ==========================================
// PatternMatch - 基线查询结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    Exact,                                   // 精确键
    CrossDayAverage { days_averaged: usize }, // 同小时跨星期均值
    HourlyFallback,                          // 时段级降级到小时级
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub stats: PatternStats,
    pub source: MatchSource,
}

impl PatternMatch {
    pub fn is_fallback(&self) -> bool {
        !matches!(self.source, MatchSource::Exact)
    }

    /// 跨星期均值使用的天数（非降级为 None）
    pub fn days_averaged(&self) -> Option<usize> {
        match self.source {
            MatchSource::CrossDayAverage { days_averaged } => Some(days_averaged),
            _ => None,
        }
    }
}
