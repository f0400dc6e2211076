// ==========================================
// 门店服务评级系统 - 订单领域模型
// ==========================================
// 来源: 上游分类模块输出（已完成渠道归类）
// 红线: 订单创建后不可变
// ==========================================

use crate::domain::types::ServiceCategory;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// OrderRecord - 已归类订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub restaurant_code: String,     // 门店代码
    pub category: ServiceCategory,   // 服务渠道
    pub fulfillment_minutes: f64,    // 出餐时长 (分钟, >= 0)
    pub completed_at: NaiveDateTime, // 完成时间
}

impl OrderRecord {
    pub fn new(
        restaurant_code: impl Into<String>,
        category: ServiceCategory,
        fulfillment_minutes: f64,
        completed_at: NaiveDateTime,
    ) -> Self {
        Self {
            restaurant_code: restaurant_code.into(),
            category,
            fulfillment_minutes,
            completed_at,
        }
    }

    /// 完成时间的时刻部分（用于时段归属）
    pub fn completion_time(&self) -> NaiveTime {
        self.completed_at.time()
    }

    /// 完成时间的日期部分
    pub fn business_date(&self) -> NaiveDate {
        self.completed_at.date()
    }
}
