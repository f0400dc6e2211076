// ==========================================
// 门店服务评级系统 - 配置层
// ==========================================
// 职责: 评级阈值定义、校验、覆写加载
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod grading_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use grading_config::{
    default_peak_bands, ChannelTierConfig, CapacityConfig, ConfigError, GradingConfig, LearningConfig, PeakBand,
    ServiceStandards, ShiftHours, StoreConfig, StreakThresholds, WindowingConfig,
};
