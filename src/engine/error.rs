// ==========================================
// 门店服务评级系统 - 引擎层错误类型
// ==========================================
// PatternError: 基线学习 / 查询
// GradingError: 时段记录违反上游契约,必须上报调用方
// ==========================================

use crate::domain::error::ValidationError;
use crate::domain::types::{ServiceCategory, Shift};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 基线引擎错误
///
/// learn / get 只会返回 Validation；Storage 仅由批量管理操作返回
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("基线键校验失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("基线存储失败: {0}")]
    Storage(#[from] RepositoryError),
}

/// 评级错误
#[derive(Error, Debug)]
pub enum GradingError {
    #[error("出餐时长无效: shift={shift} slot={slot_index} category={category} value={value}")]
    InvalidDuration {
        shift: Shift,
        slot_index: usize,
        category: ServiceCategory,
        value: f64,
    },

    #[error("订单数与时长记录不一致: shift={shift} slot={slot_index} category={category} count={count} durations={durations}")]
    CountMismatch {
        shift: Shift,
        slot_index: usize,
        category: ServiceCategory,
        count: u32,
        durations: usize,
    },

    #[error("时段总订单数不一致: shift={shift} slot={slot_index} total={total} sum={sum}")]
    TotalMismatch {
        shift: Shift,
        slot_index: usize,
        total: u32,
        sum: u32,
    },

    #[error("平均时长与明细不一致: shift={shift} slot={slot_index} category={category} avg={avg} expected={expected}")]
    AverageMismatch {
        shift: Shift,
        slot_index: usize,
        category: ServiceCategory,
        avg: f64,
        expected: f64,
    },

    #[error("时段区间无效: shift={shift} slot={slot_index} {start}-{end}")]
    InvalidInterval {
        shift: Shift,
        slot_index: usize,
        start: String,
        end: String,
    },

    #[error("时段记录门店不一致: expected={expected} actual={actual}")]
    RestaurantMismatch { expected: String, actual: String },
}
