// ==========================================
// 门店服务评级系统 - 领域类型定义
// ==========================================
// 职责: 服务渠道、班次、连胜状态等枚举
// 序列化格式: 与下游报表 JSON 一致
// ==========================================

use crate::domain::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 服务渠道 (Service Category)
// ==========================================
// 红线: 只有三类渠道,未知渠道必须拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "Lobby")]
    Lobby, // 堂食
    #[serde(rename = "Drive-Thru")]
    DriveThru, // 得来速
    #[serde(rename = "ToGo")]
    ToGo, // 外带
}

impl ServiceCategory {
    /// 固定顺序（报表与聚合统一使用）
    pub const ALL: [ServiceCategory; 3] = [
        ServiceCategory::Lobby,
        ServiceCategory::DriveThru,
        ServiceCategory::ToGo,
    ];

    /// 标准标签
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Lobby => "Lobby",
            ServiceCategory::DriveThru => "Drive-Thru",
            ServiceCategory::ToGo => "ToGo",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lobby" => Ok(ServiceCategory::Lobby),
            "drive-thru" | "drive_thru" | "drivethru" => Ok(ServiceCategory::DriveThru),
            "togo" | "to-go" | "to_go" => Ok(ServiceCategory::ToGo),
            _ => Err(ValidationError::UnknownCategory(s.to_string())),
        }
    }
}

// ==========================================
// 班次 (Shift)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shift {
    Morning, // 早班
    Evening, // 晚班
}

impl Shift {
    pub const ALL: [Shift; 2] = [Shift::Morning, Shift::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "MORNING",
            Shift::Evening => "EVENING",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Shift {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MORNING" => Ok(Shift::Morning),
            "EVENING" => Ok(Shift::Evening),
            _ => Err(ValidationError::UnknownShift(s.to_string())),
        }
    }
}

// ==========================================
// 连胜状态 (Streak State)
// ==========================================
// 由时段通过率决定,与严格 AND 判定结果无关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakState {
    Hot,
    Cold,
    None,
}

impl fmt::Display for StreakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreakState::Hot => write!(f, "hot"),
            StreakState::Cold => write!(f, "cold"),
            StreakState::None => write!(f, "none"),
        }
    }
}

// ==========================================
// 时段判定结果 (Slot Outcome)
// ==========================================
// NoOrders: 无订单时段,不计入通过率分母
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotOutcome {
    Passed,
    Failed,
    NoOrders,
}

impl SlotOutcome {
    /// 通过/未通过；无订单时段返回 None
    pub fn passed(&self) -> Option<bool> {
        match self {
            SlotOutcome::Passed => Some(true),
            SlotOutcome::Failed => Some(false),
            SlotOutcome::NoOrders => None,
        }
    }
}

impl fmt::Display for SlotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotOutcome::Passed => write!(f, "PASSED"),
            SlotOutcome::Failed => write!(f, "FAILED"),
            SlotOutcome::NoOrders => write!(f, "NO_ORDERS"),
        }
    }
}

// ==========================================
// 班次压力等级 (Stress Status)
// ==========================================
// 顺序: Good < Warning < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressStatus {
    Good,
    Warning,
    Critical,
}

impl fmt::Display for StressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StressStatus::Good => write!(f, "good"),
            StressStatus::Warning => write!(f, "warning"),
            StressStatus::Critical => write!(f, "critical"),
        }
    }
}

// ==========================================
// 渠道表现等级 (Channel Tier)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTier {
    Poor,
    Acceptable,
    Excellent,
}

impl fmt::Display for ChannelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelTier::Poor => write!(f, "poor"),
            ChannelTier::Acceptable => write!(f, "acceptable"),
            ChannelTier::Excellent => write!(f, "excellent"),
        }
    }
}

// ==========================================
// 数据完整性 (Data Completeness)
// ==========================================
// 上游分类覆盖不足时为 NoCategorizedOrders（数据问题,不是计算失败）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataCompleteness {
    Complete,
    NoCategorizedOrders,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_labels() {
        assert_eq!("Drive-Thru".parse::<ServiceCategory>().unwrap(), ServiceCategory::DriveThru);
        assert_eq!("lobby".parse::<ServiceCategory>().unwrap(), ServiceCategory::Lobby);
        assert_eq!("TOGO".parse::<ServiceCategory>().unwrap(), ServiceCategory::ToGo);
        assert!("Delivery".parse::<ServiceCategory>().is_err());
    }

    #[test]
    fn test_category_serde_label() {
        let json = serde_json::to_string(&ServiceCategory::DriveThru).unwrap();
        assert_eq!(json, "\"Drive-Thru\"");
    }

    #[test]
    fn test_slot_outcome_passed() {
        assert_eq!(SlotOutcome::Passed.passed(), Some(true));
        assert_eq!(SlotOutcome::Failed.passed(), Some(false));
        assert_eq!(SlotOutcome::NoOrders.passed(), None);
    }
}
