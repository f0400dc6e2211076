// ==========================================
// 门店服务评级系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、校验错误
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod error;
pub mod order;
pub mod pattern;
pub mod timeslot;
pub mod types;

// 重导出核心类型
pub use capacity::{ChannelPerformance, DayCapacityReport, ShiftCapacityReport, SlotStress};
pub use error::ValidationError;
pub use order::OrderRecord;
pub use pattern::{
    ClearScope, MatchSource, Pattern, PatternFilter, PatternKey, PatternKeyFields, PatternMatch,
    PatternRecord, PatternStats, TimeslotPattern, TimeslotPatternKey,
};
pub use timeslot::{
    BaselineComparison, CategoryGrade, CategorySlotMetrics, CategoryTotals, DayGradeReport,
    GradedTimeslot, ShiftGradeSummary, TimeslotRecord, WindowDiagnostics,
};
pub use types::{
    ChannelTier, DataCompleteness, ServiceCategory, Shift, SlotOutcome, StreakState, StressStatus,
};
