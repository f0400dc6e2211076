// ==========================================
// 门店服务评级系统 - 配置管理器
// ==========================================
// 职责: 从 config_kv 表加载评级阈值,缺省回退默认值
// 存储: config_kv 表 (scope_id + key + value)
// ==========================================

use crate::config::grading_config::{ConfigError, GradingConfig, PeakBand};
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path, Duration::from_millis(crate::db::DEFAULT_BUSY_TIMEOUT_MS))?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager（与 SqlitePatternStore 共用连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置值（UPSERT）
    pub fn set_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析数值配置；格式错误时告警并使用默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Copy,
    {
        let raw = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::InternalError(e.to_string()))
    }

    // ===== 评级配置 =====

    /// 加载评级配置全集（覆写项 + 默认值）,返回前统一校验
    pub fn load_grading_config(&self) -> Result<GradingConfig, ConfigError> {
        let d = GradingConfig::default();
        let mut config = d.clone();

        // 渠道目标时长
        config.service_standards.lobby_minutes =
            self.get_parsed_or(config_keys::STANDARD_LOBBY_MINUTES, d.service_standards.lobby_minutes)?;
        config.service_standards.drive_thru_minutes = self.get_parsed_or(
            config_keys::STANDARD_DRIVE_THRU_MINUTES,
            d.service_standards.drive_thru_minutes,
        )?;
        config.service_standards.to_go_minutes =
            self.get_parsed_or(config_keys::STANDARD_TO_GO_MINUTES, d.service_standards.to_go_minutes)?;

        // 时段分桶
        config.windowing.interval_minutes =
            self.get_parsed_or(config_keys::INTERVAL_MINUTES, d.windowing.interval_minutes)?;
        config.windowing.morning.start_hour =
            self.get_parsed_or(config_keys::MORNING_START_HOUR, d.windowing.morning.start_hour)?;
        config.windowing.morning.end_hour =
            self.get_parsed_or(config_keys::MORNING_END_HOUR, d.windowing.morning.end_hour)?;
        config.windowing.evening.start_hour =
            self.get_parsed_or(config_keys::EVENING_START_HOUR, d.windowing.evening.start_hour)?;
        config.windowing.evening.end_hour =
            self.get_parsed_or(config_keys::EVENING_END_HOUR, d.windowing.evening.end_hour)?;

        // 高峰时段 (JSON 数组)
        if let Some(raw) = self.get_global_config_value(config_keys::PEAK_BANDS)? {
            match serde_json::from_str::<Vec<PeakBand>>(&raw) {
                Ok(bands) => config.peak_bands = bands,
                Err(e) => tracing::warn!(
                    config_key = config_keys::PEAK_BANDS,
                    raw_value = %raw,
                    error = %e,
                    "高峰时段配置格式错误，使用默认配置"
                ),
            }
        }

        // 连胜阈值
        config.streak.hot_pct = self.get_parsed_or(config_keys::STREAK_HOT_PCT, d.streak.hot_pct)?;
        config.streak.cold_pct = self.get_parsed_or(config_keys::STREAK_COLD_PCT, d.streak.cold_pct)?;

        // 基线学习
        config.learning.early_alpha =
            self.get_parsed_or(config_keys::LEARNING_EARLY_ALPHA, d.learning.early_alpha)?;
        config.learning.mature_alpha =
            self.get_parsed_or(config_keys::LEARNING_MATURE_ALPHA, d.learning.mature_alpha)?;
        config.learning.maturity_observations = self.get_parsed_or(
            config_keys::LEARNING_MATURITY_OBSERVATIONS,
            d.learning.maturity_observations,
        )?;
        config.learning.min_confidence =
            self.get_parsed_or(config_keys::RELIABLE_MIN_CONFIDENCE, d.learning.min_confidence)?;
        config.learning.min_observations =
            self.get_parsed_or(config_keys::RELIABLE_MIN_OBSERVATIONS, d.learning.min_observations)?;
        config.learning.confidence_cap =
            self.get_parsed_or(config_keys::CONFIDENCE_CAP, d.learning.confidence_cap)?;

        // 产能压力
        config.capacity.max_orders_per_slot =
            self.get_parsed_or(config_keys::MAX_ORDERS_PER_SLOT, d.capacity.max_orders_per_slot)?;
        config.capacity.stress_threshold =
            self.get_parsed_or(config_keys::STRESS_THRESHOLD, d.capacity.stress_threshold)?;
        config.capacity.good_max_pct =
            self.get_parsed_or(config_keys::STRESS_GOOD_MAX_PCT, d.capacity.good_max_pct)?;
        config.capacity.warning_max_pct =
            self.get_parsed_or(config_keys::STRESS_WARNING_MAX_PCT, d.capacity.warning_max_pct)?;

        // 渠道表现
        config.channel_tiers.excellent_min_pct = self.get_parsed_or(
            config_keys::CHANNEL_EXCELLENT_MIN_PCT,
            d.channel_tiers.excellent_min_pct,
        )?;
        config.channel_tiers.acceptable_min_pct = self.get_parsed_or(
            config_keys::CHANNEL_ACCEPTABLE_MIN_PCT,
            d.channel_tiers.acceptable_min_pct,
        )?;

        // 存储
        config.store.latency_target_ms =
            self.get_parsed_or(config_keys::STORE_LATENCY_TARGET_MS, d.store.latency_target_ms)?;

        config.validate()?;
        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 渠道目标时长 (分钟)
    pub const STANDARD_LOBBY_MINUTES: &str = "standard_lobby_minutes";
    pub const STANDARD_DRIVE_THRU_MINUTES: &str = "standard_drive_thru_minutes";
    pub const STANDARD_TO_GO_MINUTES: &str = "standard_to_go_minutes";

    // 时段分桶
    pub const INTERVAL_MINUTES: &str = "interval_minutes";
    pub const MORNING_START_HOUR: &str = "morning_start_hour";
    pub const MORNING_END_HOUR: &str = "morning_end_hour";
    pub const EVENING_START_HOUR: &str = "evening_start_hour";
    pub const EVENING_END_HOUR: &str = "evening_end_hour";

    // 高峰时段 (JSON)
    pub const PEAK_BANDS: &str = "peak_bands";

    // 连胜
    pub const STREAK_HOT_PCT: &str = "streak_hot_pct";
    pub const STREAK_COLD_PCT: &str = "streak_cold_pct";

    // 基线学习
    pub const LEARNING_EARLY_ALPHA: &str = "learning_early_alpha";
    pub const LEARNING_MATURE_ALPHA: &str = "learning_mature_alpha";
    pub const LEARNING_MATURITY_OBSERVATIONS: &str = "learning_maturity_observations";
    pub const RELIABLE_MIN_CONFIDENCE: &str = "reliable_min_confidence";
    pub const RELIABLE_MIN_OBSERVATIONS: &str = "reliable_min_observations";
    pub const CONFIDENCE_CAP: &str = "confidence_cap";

    // 产能压力
    pub const MAX_ORDERS_PER_SLOT: &str = "max_orders_per_slot";
    pub const STRESS_THRESHOLD: &str = "stress_threshold";
    pub const STRESS_GOOD_MAX_PCT: &str = "stress_good_max_pct";
    pub const STRESS_WARNING_MAX_PCT: &str = "stress_warning_max_pct";

    // 渠道表现
    pub const CHANNEL_EXCELLENT_MIN_PCT: &str = "channel_excellent_min_pct";
    pub const CHANNEL_ACCEPTABLE_MIN_PCT: &str = "channel_acceptable_min_pct";

    // 存储
    pub const STORE_LATENCY_TARGET_MS: &str = "store_latency_target_ms";
}
