// ==========================================
// 门店服务评级系统 - 领域校验错误
// ==========================================
// 工具: thiserror 派生宏
// 红线: 校验错误总是上报,不重试
// ==========================================

use thiserror::Error;

/// 基线键 / 输入字段校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("小时超出范围 (0-23): {0}")]
    HourOutOfRange(u8),

    #[error("星期超出范围 (0-6): {0}")]
    DayOfWeekOutOfRange(u8),

    #[error("未知服务渠道: {0}")]
    UnknownCategory(String),

    #[error("未知班次: {0}")]
    UnknownShift(String),

    #[error("门店代码为空")]
    EmptyRestaurantCode,

    #[error("时段标识为空")]
    EmptyTimeslotId,

    #[error("观测值无效 (field={field}): {value}")]
    InvalidObservation { field: String, value: f64 },
}
