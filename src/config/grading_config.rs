// ==========================================
// 门店服务评级系统 - 评级配置
// ==========================================
// 职责: 汇总评级核心所需的全部数值阈值
// 说明: 只定义取值与校验,加载机制见 ConfigManager
// ==========================================

use crate::domain::timeslot::hhmm;
use crate::domain::types::{ServiceCategory, Shift};
use crate::repository::error::RepositoryError;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置值无效 (key={key}): {message}")]
    InvalidValue { key: String, message: String },

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置读取失败: {0}")]
    Storage(#[from] RepositoryError),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

// ==========================================
// ServiceStandards - 渠道服务时长目标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceStandards {
    pub lobby_minutes: f64,
    pub drive_thru_minutes: f64,
    pub to_go_minutes: f64,
}

impl Default for ServiceStandards {
    fn default() -> Self {
        Self {
            lobby_minutes: 15.0,
            drive_thru_minutes: 8.0,
            to_go_minutes: 10.0,
        }
    }
}

impl ServiceStandards {
    pub fn target_for(&self, category: ServiceCategory) -> f64 {
        match category {
            ServiceCategory::Lobby => self.lobby_minutes,
            ServiceCategory::DriveThru => self.drive_thru_minutes,
            ServiceCategory::ToGo => self.to_go_minutes,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for category in ServiceCategory::ALL {
            let target = self.target_for(category);
            if !target.is_finite() || target <= 0.0 {
                return Err(ConfigError::invalid(
                    "service_standards",
                    format!("{} 目标时长必须为正数: {}", category, target),
                ));
            }
        }
        Ok(())
    }
}

// ==========================================
// WindowingConfig - 时段分桶配置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftHours {
    pub start_hour: u8,
    pub end_hour: u8, // 不含, 最大 24
}

impl ShiftHours {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn minutes(&self) -> u32 {
        (self.end_hour.saturating_sub(self.start_hour)) as u32 * 60
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingConfig {
    pub interval_minutes: u32,
    pub morning: ShiftHours,
    pub evening: ShiftHours,
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            morning: ShiftHours::new(6, 14),
            evening: ShiftHours::new(14, 22),
        }
    }
}

impl WindowingConfig {
    pub fn hours_for(&self, shift: Shift) -> ShiftHours {
        match shift {
            Shift::Morning => self.morning,
            Shift::Evening => self.evening,
        }
    }

    /// 单班次时段数 = 班次分钟数 / 时段宽度
    pub fn slots_per_shift(&self, shift: Shift) -> usize {
        if self.interval_minutes == 0 {
            return 0;
        }
        (self.hours_for(shift).minutes() / self.interval_minutes) as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 || self.interval_minutes > 60 || 60 % self.interval_minutes != 0 {
            return Err(ConfigError::invalid(
                "interval_minutes",
                format!("时段宽度必须整除60分钟: {}", self.interval_minutes),
            ));
        }
        for shift in Shift::ALL {
            let hours = self.hours_for(shift);
            if hours.start_hour >= hours.end_hour || hours.end_hour > 24 {
                return Err(ConfigError::invalid(
                    "shift_hours",
                    format!(
                        "{} 班次小时范围无效: {}-{}",
                        shift, hours.start_hour, hours.end_hour
                    ),
                ));
            }
        }
        if self.morning.end_hour > self.evening.start_hour {
            return Err(ConfigError::invalid(
                "shift_hours",
                format!(
                    "早晚班重叠: 早班结束 {} > 晚班开始 {}",
                    self.morning.end_hour, self.evening.start_hour
                ),
            ));
        }
        Ok(())
    }
}

// ==========================================
// PeakBand - 高峰时段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakBand {
    pub name: String,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl PeakBand {
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// 与 [start_min, end_min) 是否相交（单位: 当日分钟数）
    pub fn intersects(&self, start_min: u32, end_min: u32) -> bool {
        let band_start = self.start.num_seconds_from_midnight() / 60;
        let band_end = self.end.num_seconds_from_midnight() / 60;
        start_min < band_end && band_start < end_min
    }
}

pub fn default_peak_bands() -> Vec<PeakBand> {
    let at = |h: u32, m: u32| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
    vec![
        PeakBand::new("lunch", at(11, 30), at(13, 0)),
        PeakBand::new("dinner", at(17, 30), at(19, 30)),
    ]
}

// ==========================================
// StreakThresholds - 连胜阈值 (%)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakThresholds {
    pub hot_pct: f64,
    pub cold_pct: f64,
}

impl Default for StreakThresholds {
    fn default() -> Self {
        Self {
            hot_pct: 85.0,
            cold_pct: 70.0,
        }
    }
}

// ==========================================
// LearningConfig - 基线学习参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub early_alpha: f64,            // 观测次数 < maturity_observations 时
    pub mature_alpha: f64,           // 成熟后
    pub maturity_observations: u32,
    pub min_confidence: f64,         // 可靠性: 置信度下限
    pub min_observations: u32,       // 可靠性: 观测次数下限
    pub confidence_cap: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            early_alpha: 0.3,
            mature_alpha: 0.2,
            maturity_observations: 5,
            min_confidence: 0.6,
            min_observations: 4,
            confidence_cap: 0.95,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, alpha) in [("early_alpha", self.early_alpha), ("mature_alpha", self.mature_alpha)] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::invalid(key, format!("学习率必须在 (0, 1] 内: {}", alpha)));
            }
        }
        if !(self.confidence_cap > 0.0 && self.confidence_cap < 1.0) {
            return Err(ConfigError::invalid(
                "confidence_cap",
                format!("置信度上限必须在 (0, 1) 内: {}", self.confidence_cap),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::invalid(
                "min_confidence",
                format!("置信度下限必须在 [0, 1] 内: {}", self.min_confidence),
            ));
        }
        Ok(())
    }
}

// ==========================================
// CapacityConfig - 产能压力阈值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub max_orders_per_slot: u32,
    pub stress_threshold: f64,
    pub good_max_pct: f64,
    pub warning_max_pct: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            max_orders_per_slot: 20,
            stress_threshold: 0.85,
            good_max_pct: 20.0,
            warning_max_pct: 30.0,
        }
    }
}

// ==========================================
// ChannelTierConfig - 渠道表现分层 (%)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTierConfig {
    pub excellent_min_pct: f64,
    pub acceptable_min_pct: f64,
}

impl Default for ChannelTierConfig {
    fn default() -> Self {
        Self {
            excellent_min_pct: 80.0,
            acceptable_min_pct: 60.0,
        }
    }
}

// ==========================================
// StoreConfig - 持久化存储参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub latency_target_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            latency_target_ms: 100,
        }
    }
}

// ==========================================
// GradingConfig - 评级核心配置全集
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub service_standards: ServiceStandards,
    pub windowing: WindowingConfig,
    pub peak_bands: Vec<PeakBand>,
    pub streak: StreakThresholds,
    pub learning: LearningConfig,
    pub capacity: CapacityConfig,
    pub channel_tiers: ChannelTierConfig,
    pub store: StoreConfig,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            service_standards: ServiceStandards::default(),
            windowing: WindowingConfig::default(),
            peak_bands: default_peak_bands(),
            streak: StreakThresholds::default(),
            learning: LearningConfig::default(),
            capacity: CapacityConfig::default(),
            channel_tiers: ChannelTierConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl GradingConfig {
    /// 从 JSON 解析并校验
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GradingConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service_standards.validate()?;
        self.windowing.validate()?;
        self.learning.validate()?;

        for band in &self.peak_bands {
            if band.start >= band.end {
                return Err(ConfigError::invalid(
                    "peak_bands",
                    format!("高峰时段起止无效: {} {}-{}", band.name, band.start, band.end),
                ));
            }
        }

        if self.streak.cold_pct > self.streak.hot_pct {
            return Err(ConfigError::invalid(
                "streak",
                format!(
                    "冷阈值不能高于热阈值: cold={} hot={}",
                    self.streak.cold_pct, self.streak.hot_pct
                ),
            ));
        }

        if self.capacity.max_orders_per_slot == 0 {
            return Err(ConfigError::invalid("max_orders_per_slot", "时段产能必须大于0"));
        }
        if self.capacity.good_max_pct > self.capacity.warning_max_pct {
            return Err(ConfigError::invalid(
                "capacity_status",
                format!(
                    "good 上限不能高于 warning 上限: {} > {}",
                    self.capacity.good_max_pct, self.capacity.warning_max_pct
                ),
            ));
        }

        if self.channel_tiers.acceptable_min_pct > self.channel_tiers.excellent_min_pct {
            return Err(ConfigError::invalid(
                "channel_tiers",
                format!(
                    "acceptable 下限不能高于 excellent 下限: {} > {}",
                    self.channel_tiers.acceptable_min_pct, self.channel_tiers.excellent_min_pct
                ),
            ));
        }

        if self.store.latency_target_ms == 0 {
            return Err(ConfigError::invalid("latency_target_ms", "存储延迟目标必须大于0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GradingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.windowing.slots_per_shift(Shift::Morning), 32);
        assert_eq!(config.windowing.slots_per_shift(Shift::Evening), 32);
    }

    #[test]
    fn test_interval_must_divide_hour() {
        let mut config = GradingConfig::default();
        config.windowing.interval_minutes = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GradingConfig::from_json_str(r#"{"streak": {"hot_pct": 90.0}}"#).unwrap();
        assert_eq!(config.streak.hot_pct, 90.0);
        assert_eq!(config.streak.cold_pct, 70.0);
        assert_eq!(config.service_standards.drive_thru_minutes, 8.0);
    }
}
