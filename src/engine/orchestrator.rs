// ==========================================
// 门店服务评级系统 - 评级编排器
// ==========================================
// 用途: 协调单日评级主流程
// 流程: 分桶 → 评级（含基线对比）→ 产能分析 → 基线学习
// 红线: 学习失败不影响评级结果,只有 GradingError 上报
// ==========================================

use crate::config::{ConfigError, GradingConfig};
use crate::domain::capacity::DayCapacityReport;
use crate::domain::order::OrderRecord;
use crate::domain::timeslot::DayGradeReport;
use crate::engine::error::GradingError;
use crate::engine::{
    BaselineSource, CapacityAnalyzer, GraderConfig, LearningSummary, PatternManager, TimeslotGrader,
    TimeslotWindower,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ==========================================
// PipelineOutcome - 单日评级结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub report: DayGradeReport,
    pub capacity: DayCapacityReport,
    pub learning: LearningSummary,
}

// ==========================================
// GradingPipeline - 评级编排器
// ==========================================
pub struct GradingPipeline {
    windower: TimeslotWindower,
    grader: TimeslotGrader,
    analyzer: CapacityAnalyzer,
    patterns: Arc<PatternManager>,
    learn_enabled: bool,
}

impl GradingPipeline {
    /// 创建编排器（配置先整体校验）
    ///
    /// 基线引擎必须按同一份学习配置构建,否则 config_kv 覆写不会生效
    pub fn new(config: GradingConfig, patterns: Arc<PatternManager>) -> Result<Self, ConfigError> {
        config.validate()?;
        if patterns.learning_config() != &config.learning {
            return Err(ConfigError::InvalidValue {
                key: "learning".to_string(),
                message: "基线引擎学习配置与评级配置不一致".to_string(),
            });
        }
        Ok(Self {
            windower: TimeslotWindower::new(config.windowing.clone())?,
            grader: TimeslotGrader::new(GraderConfig::from(&config)),
            analyzer: CapacityAnalyzer::from_config(&config),
            patterns,
            learn_enabled: true,
        })
    }

    /// 关闭学习（只评级,不回写基线）
    pub fn without_learning(mut self) -> Self {
        self.learn_enabled = false;
        self
    }

    pub fn patterns(&self) -> &Arc<PatternManager> {
        &self.patterns
    }

    /// 执行单日评级
    #[instrument(skip(self, orders), fields(restaurant_code = %restaurant_code, business_date = %business_date, orders = orders.len()))]
    pub fn run_day(
        &self,
        restaurant_code: &str,
        business_date: NaiveDate,
        orders: &[OrderRecord],
    ) -> Result<PipelineOutcome, GradingError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "开始单日评级");

        // 1. 分桶
        let day = self.windower.window_day(restaurant_code, business_date, orders);
        debug!(
            assigned = day.diagnostics.assigned,
            dropped = day.diagnostics.dropped(),
            slots = day.total_slots(),
            "步骤1: 分桶完成"
        );

        // 2. 评级（基线在学习之前读取）
        let report = self
            .grader
            .grade_day(&day, Some(self.patterns.as_ref() as &dyn BaselineSource), business_date)?;
        debug!(completeness = ?report.completeness, "步骤2: 评级完成");

        // 3. 产能分析
        let capacity = self.analyzer.analyze_day(&day, &report);
        debug!(worst_status = ?capacity.worst_status(), "步骤3: 产能分析完成");

        // 4. 基线学习
        let learning = if self.learn_enabled {
            self.patterns.learn_from_report(&report)
        } else {
            LearningSummary::default()
        };
        debug!(learned = learning.learned, "步骤4: 基线学习完成");

        info!(%run_id, learned = learning.learned, skipped = learning.skipped, "单日评级完成");

        Ok(PipelineOutcome {
            run_id,
            report,
            capacity,
            learning,
        })
    }
}
