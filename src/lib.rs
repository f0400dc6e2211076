// ==========================================
// 门店服务评级系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 单日订单 → 时段评级 / 产能压力 / 历史基线
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 基线存储
pub mod repository;

// 引擎层 - 评级规则
pub mod engine;

// 配置层 - 阈值配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 存储性能探针
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ChannelTier, DataCompleteness, ServiceCategory, Shift, SlotOutcome, StreakState, StressStatus,
};

// 领域实体
pub use domain::{
    DayCapacityReport, DayGradeReport, GradedTimeslot, OrderRecord, Pattern, PatternKey,
    PatternMatch, ShiftGradeSummary, TimeslotPattern, TimeslotPatternKey, TimeslotRecord,
};

// 引擎
pub use engine::{
    CapacityAnalyzer, GradingPipeline, PatternManager, PipelineOutcome, TimeslotGrader,
    TimeslotWindower,
};

// 存储
pub use repository::{InMemoryPatternStore, PatternStore, SqlitePatternStore};

// 配置
pub use config::{ConfigManager, GradingConfig};

// ==========================================
// 版本信息
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "门店服务评级系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "门店服务评级系统");
    }
}
