// ==========================================
// 门店服务评级系统 - 引擎层
// ==========================================
// 职责: 实现评级规则引擎,不拼 SQL
// 红线: Engine 只经 PatternStore 访问存储
// ==========================================

pub mod capacity_analyzer;
pub mod error;
pub mod grader;
pub mod orchestrator;
pub mod pattern_manager;
pub mod windower;

// 重导出核心引擎
pub use capacity_analyzer::CapacityAnalyzer;
pub use error::{GradingError, PatternError};
pub use grader::{BaselineSource, GraderConfig, TimeslotGrader};
pub use orchestrator::{GradingPipeline, PipelineOutcome};
pub use pattern_manager::{asymptotic_confidence, LearnOutcome, LearningSummary, PatternManager};
pub use windower::{TimeslotWindower, WindowedDay, WindowedShift};
