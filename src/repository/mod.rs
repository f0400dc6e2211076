// ==========================================
// 门店服务评级系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含学习逻辑
// ==========================================
// 职责: 基线存储契约 + 内存 / SQLite 两种实现
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod pattern_repo;
pub mod pattern_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use pattern_repo::SqlitePatternStore;
pub use pattern_store::{InMemoryPatternStore, PatternStore};
