// ==========================================
// 门店服务评级系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 存储错误由 PatternManager 就地降级,不进入评级流水线
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 键约束错误 =====
    #[error("记录未找到: {entity} with key={key}")]
    NotFound { entity: String, key: String },

    #[error("记录已存在: {entity} with key={key}")]
    DuplicateKey { entity: String, key: String },

    // ===== 存储可用性错误 =====
    #[error("存储不可用: {0}")]
    Unavailable(String),

    #[error("存储超时: {0}")]
    Timeout(String),

    #[error("存储锁获取失败: {0}")]
    LockError(String),

    // ===== 数据库错误 =====
    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref msg) => match code.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    RepositoryError::Timeout(err.to_string())
                }
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => {
                    RepositoryError::Unavailable(err.to_string())
                }
                _ => match msg {
                    Some(m) if m.contains("UNIQUE") => {
                        RepositoryError::UniqueConstraintViolation(m.clone())
                    }
                    Some(m) => RepositoryError::DatabaseQueryError(m.clone()),
                    None => RepositoryError::DatabaseQueryError(err.to_string()),
                },
            },
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                key: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
