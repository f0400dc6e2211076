// ==========================================
// 门店服务评级系统 - 基线持久化仓储 (SQLite)
// ==========================================
// 表: service_pattern / timeslot_pattern
// 红线: Repository 不含学习逻辑
// 约束: 所有查询使用参数化
// ==========================================

use crate::config::StoreConfig;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::pattern::{
    ClearScope, Pattern, PatternFilter, PatternKey, PatternKeyFields, PatternStats,
    TimeslotPattern, TimeslotPatternKey,
};
use crate::domain::types::{ServiceCategory, Shift};
use crate::perf::StoreCallGuard;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::pattern_store::PatternStore;
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ==========================================
// SqlitePatternStore - 持久化基线仓储
// ==========================================
pub struct SqlitePatternStore {
    conn: Arc<Mutex<Connection>>,
    latency_target: Duration,
}

impl SqlitePatternStore {
    /// 打开数据库文件并建表
    ///
    /// busy_timeout 取存储延迟目标,锁等待超时直接返回 Timeout
    pub fn open(db_path: &str, store_config: &StoreConfig) -> RepositoryResult<Self> {
        let latency_target = Duration::from_millis(store_config.latency_target_ms);
        let mut conn = open_sqlite_connection(db_path, latency_target)
            .map_err(|e| RepositoryError::Unavailable(format!("{}: {}", db_path, e)))?;
        crate::perf::install_sqlite_tracing(&mut conn);
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            latency_target,
        })
    }

    /// 打开默认路径数据库（必要时创建目录）
    pub fn open_default(store_config: &StoreConfig) -> RepositoryResult<Self> {
        let path = crate::db::default_db_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                RepositoryError::Unavailable(format!("无法创建数据目录 {}: {}", dir.display(), e))
            })?;
        }
        let path_str = path.to_string_lossy().to_string();
        Self::open(&path_str, store_config)
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>, store_config: &StoreConfig) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            init_schema(&guard)?;
        }
        Ok(Self {
            conn,
            latency_target: Duration::from_millis(store_config.latency_target_ms),
        })
    }

    /// 共享连接（ConfigManager 复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn guard(&self, op: &'static str) -> StoreCallGuard {
        StoreCallGuard::new(op, self.latency_target)
    }
}

// ==========================================
// 行映射辅助
// ==========================================

/// 原始行（列 → Rust 值），字段解析在闭包外进行
struct RawPatternRow {
    restaurant_code: String,
    service_type: String,
    hour: i64,
    day_of_week: i64,
    shift: Option<String>,
    timeslot_id: Option<String>,
    expected_value: f64,
    confidence: f64,
    observation_count: i64,
    last_updated: String,
}

impl RawPatternRow {
    fn base_key(&self) -> RepositoryResult<PatternKey> {
        let service_type: ServiceCategory =
            self.service_type
                .parse()
                .map_err(|e: crate::domain::ValidationError| RepositoryError::FieldValueError {
                    field: "service_type".to_string(),
                    message: e.to_string(),
                })?;
        let hour = u8::try_from(self.hour).map_err(|_| RepositoryError::FieldValueError {
            field: "hour".to_string(),
            message: self.hour.to_string(),
        })?;
        let day_of_week = u8::try_from(self.day_of_week).map_err(|_| RepositoryError::FieldValueError {
            field: "day_of_week".to_string(),
            message: self.day_of_week.to_string(),
        })?;
        Ok(PatternKey::new(self.restaurant_code.clone(), service_type, hour, day_of_week))
    }

    fn stats(&self) -> RepositoryResult<PatternStats> {
        let last_updated = NaiveDateTime::parse_from_str(&self.last_updated, TS_FORMAT).map_err(|e| {
            RepositoryError::FieldValueError {
                field: "last_updated".to_string(),
                message: e.to_string(),
            }
        })?;
        let observation_count =
            u32::try_from(self.observation_count).map_err(|_| RepositoryError::FieldValueError {
                field: "observation_count".to_string(),
                message: self.observation_count.to_string(),
            })?;
        Ok(PatternStats::restored(
            self.expected_value,
            self.confidence,
            observation_count,
            last_updated,
        ))
    }

    fn into_pattern(self) -> RepositoryResult<Pattern> {
        Ok(Pattern {
            key: self.base_key()?,
            stats: self.stats()?,
        })
    }

    fn into_timeslot_pattern(self) -> RepositoryResult<TimeslotPattern> {
        let shift: Shift = self
            .shift
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|e: crate::domain::ValidationError| RepositoryError::FieldValueError {
                field: "shift".to_string(),
                message: e.to_string(),
            })?;
        let timeslot_id = self.timeslot_id.clone().unwrap_or_default();
        Ok(TimeslotPattern {
            key: TimeslotPatternKey::new(self.base_key()?, shift, timeslot_id),
            stats: self.stats()?,
        })
    }
}

fn read_hourly_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPatternRow> {
    Ok(RawPatternRow {
        restaurant_code: row.get(0)?,
        service_type: row.get(1)?,
        hour: row.get(2)?,
        day_of_week: row.get(3)?,
        shift: None,
        timeslot_id: None,
        expected_value: row.get(4)?,
        confidence: row.get(5)?,
        observation_count: row.get(6)?,
        last_updated: row.get(7)?,
    })
}

fn read_timeslot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPatternRow> {
    Ok(RawPatternRow {
        restaurant_code: row.get(0)?,
        service_type: row.get(1)?,
        hour: row.get(2)?,
        day_of_week: row.get(3)?,
        shift: Some(row.get(4)?),
        timeslot_id: Some(row.get(5)?),
        expected_value: row.get(6)?,
        confidence: row.get(7)?,
        observation_count: row.get(8)?,
        last_updated: row.get(9)?,
    })
}

/// 门店 / 渠道条件下推到 SQL,其余条件在内存中按 PatternFilter 语义过滤
fn prefilter_clause(filter: &PatternFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(code) = &filter.restaurant_code {
        clauses.push(format!("restaurant_code = ?{}", values.len() + 1));
        values.push(Value::Text(code.clone()));
    }
    if let Some(service) = filter.service_type {
        clauses.push(format!("service_type = ?{}", values.len() + 1));
        values.push(Value::Text(service.as_str().to_string()));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

fn scope_clause(scope: &ClearScope) -> (String, Vec<Value>) {
    match scope {
        ClearScope::All => (String::new(), Vec::new()),
        ClearScope::Restaurant { restaurant_code } => (
            "WHERE restaurant_code = ?1".to_string(),
            vec![Value::Text(restaurant_code.clone())],
        ),
        ClearScope::Service {
            restaurant_code,
            service_type,
        } => (
            "WHERE restaurant_code = ?1 AND service_type = ?2".to_string(),
            vec![
                Value::Text(restaurant_code.clone()),
                Value::Text(service_type.as_str().to_string()),
            ],
        ),
    }
}

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn map_insert_error(
    err: rusqlite::Error,
    entity: &str,
    key: &dyn std::fmt::Display,
) -> RepositoryError {
    match RepositoryError::from(err) {
        RepositoryError::UniqueConstraintViolation(_) => RepositoryError::DuplicateKey {
            entity: entity.to_string(),
            key: key.to_string(),
        },
        other => other,
    }
}

// ==========================================
// PatternStore<Pattern> - 小时级基线
// ==========================================
impl PatternStore<Pattern> for SqlitePatternStore {
    fn get(&self, key: &PatternKey) -> RepositoryResult<Option<Pattern>> {
        let _perf = self.guard("service_pattern.get");
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT restaurant_code, service_type, hour, day_of_week,
                       expected_value, confidence, observation_count, last_updated
                FROM service_pattern
                WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3 AND day_of_week = ?4
                "#,
                params![
                    key.restaurant_code,
                    key.service_type.as_str(),
                    key.hour as i64,
                    key.day_of_week as i64
                ],
                read_hourly_row,
            )
            .optional()?;
        raw.map(RawPatternRow::into_pattern).transpose()
    }

    fn save(&self, pattern: &Pattern) -> RepositoryResult<()> {
        let _perf = self.guard("service_pattern.save");
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO service_pattern (
                restaurant_code, service_type, hour, day_of_week,
                expected_value, confidence, observation_count, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                pattern.key.restaurant_code,
                pattern.key.service_type.as_str(),
                pattern.key.hour as i64,
                pattern.key.day_of_week as i64,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )
        .map_err(|e| map_insert_error(e, "Pattern", &pattern.key))?;
        Ok(())
    }

    fn update(&self, pattern: &Pattern) -> RepositoryResult<()> {
        let _perf = self.guard("service_pattern.update");
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE service_pattern
            SET expected_value = ?5, confidence = ?6, observation_count = ?7, last_updated = ?8
            WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3 AND day_of_week = ?4
            "#,
            params![
                pattern.key.restaurant_code,
                pattern.key.service_type.as_str(),
                pattern.key.hour as i64,
                pattern.key.day_of_week as i64,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Pattern".to_string(),
                key: pattern.key.to_string(),
            });
        }
        Ok(())
    }

    fn upsert(&self, pattern: &Pattern) -> RepositoryResult<()> {
        let _perf = self.guard("service_pattern.upsert");
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO service_pattern (
                restaurant_code, service_type, hour, day_of_week,
                expected_value, confidence, observation_count, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                pattern.key.restaurant_code,
                pattern.key.service_type.as_str(),
                pattern.key.hour as i64,
                pattern.key.day_of_week as i64,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &PatternKey) -> RepositoryResult<bool> {
        let _perf = self.guard("service_pattern.delete");
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM service_pattern
             WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3 AND day_of_week = ?4",
            params![
                key.restaurant_code,
                key.service_type.as_str(),
                key.hour as i64,
                key.day_of_week as i64
            ],
        )?;
        Ok(affected > 0)
    }

    fn list(&self, filter: &PatternFilter) -> RepositoryResult<Vec<Pattern>> {
        let _perf = self.guard("service_pattern.list");
        let conn = self.get_conn()?;
        let (where_sql, values) = prefilter_clause(filter);
        let sql = format!(
            r#"
            SELECT restaurant_code, service_type, hour, day_of_week,
                   expected_value, confidence, observation_count, last_updated
            FROM service_pattern
            {}
            "#,
            where_sql
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), read_hourly_row)?
            .collect::<rusqlite::Result<Vec<RawPatternRow>>>()?;

        let mut patterns = rows
            .into_iter()
            .map(RawPatternRow::into_pattern)
            .collect::<RepositoryResult<Vec<Pattern>>>()?;
        patterns.retain(|p| filter.matches(&p.key));
        patterns.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(patterns)
    }

    fn clear(&self, scope: &ClearScope) -> RepositoryResult<usize> {
        let _perf = self.guard("service_pattern.clear");
        let conn = self.get_conn()?;
        let (where_sql, values) = scope_clause(scope);
        let sql = format!("DELETE FROM service_pattern {}", where_sql);
        Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
    }
}

// ==========================================
// PatternStore<TimeslotPattern> - 时段级基线
// ==========================================
impl PatternStore<TimeslotPattern> for SqlitePatternStore {
    fn get(&self, key: &TimeslotPatternKey) -> RepositoryResult<Option<TimeslotPattern>> {
        let _perf = self.guard("timeslot_pattern.get");
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT restaurant_code, service_type, hour, day_of_week, shift, timeslot_id,
                       expected_value, confidence, observation_count, last_updated
                FROM timeslot_pattern
                WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3
                  AND day_of_week = ?4 AND shift = ?5 AND timeslot_id = ?6
                "#,
                params![
                    key.restaurant_code(),
                    key.service_type().as_str(),
                    key.hour() as i64,
                    key.day_of_week() as i64,
                    key.shift.as_str(),
                    key.timeslot_id
                ],
                read_timeslot_row,
            )
            .optional()?;
        raw.map(RawPatternRow::into_timeslot_pattern).transpose()
    }

    fn save(&self, pattern: &TimeslotPattern) -> RepositoryResult<()> {
        let _perf = self.guard("timeslot_pattern.save");
        let conn = self.get_conn()?;
        let key = &pattern.key;
        conn.execute(
            r#"
            INSERT INTO timeslot_pattern (
                restaurant_code, service_type, hour, day_of_week, shift, timeslot_id,
                expected_value, confidence, observation_count, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                key.restaurant_code(),
                key.service_type().as_str(),
                key.hour() as i64,
                key.day_of_week() as i64,
                key.shift.as_str(),
                key.timeslot_id,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )
        .map_err(|e| map_insert_error(e, "TimeslotPattern", key))?;
        Ok(())
    }

    fn update(&self, pattern: &TimeslotPattern) -> RepositoryResult<()> {
        let _perf = self.guard("timeslot_pattern.update");
        let conn = self.get_conn()?;
        let key = &pattern.key;
        let affected = conn.execute(
            r#"
            UPDATE timeslot_pattern
            SET expected_value = ?7, confidence = ?8, observation_count = ?9, last_updated = ?10
            WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3
              AND day_of_week = ?4 AND shift = ?5 AND timeslot_id = ?6
            "#,
            params![
                key.restaurant_code(),
                key.service_type().as_str(),
                key.hour() as i64,
                key.day_of_week() as i64,
                key.shift.as_str(),
                key.timeslot_id,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TimeslotPattern".to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn upsert(&self, pattern: &TimeslotPattern) -> RepositoryResult<()> {
        let _perf = self.guard("timeslot_pattern.upsert");
        let conn = self.get_conn()?;
        let key = &pattern.key;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO timeslot_pattern (
                restaurant_code, service_type, hour, day_of_week, shift, timeslot_id,
                expected_value, confidence, observation_count, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                key.restaurant_code(),
                key.service_type().as_str(),
                key.hour() as i64,
                key.day_of_week() as i64,
                key.shift.as_str(),
                key.timeslot_id,
                pattern.stats.expected_value(),
                pattern.stats.confidence(),
                pattern.stats.observation_count() as i64,
                format_ts(&pattern.stats.last_updated()),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &TimeslotPatternKey) -> RepositoryResult<bool> {
        let _perf = self.guard("timeslot_pattern.delete");
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM timeslot_pattern
             WHERE restaurant_code = ?1 AND service_type = ?2 AND hour = ?3
               AND day_of_week = ?4 AND shift = ?5 AND timeslot_id = ?6",
            params![
                key.restaurant_code(),
                key.service_type().as_str(),
                key.hour() as i64,
                key.day_of_week() as i64,
                key.shift.as_str(),
                key.timeslot_id
            ],
        )?;
        Ok(affected > 0)
    }

    fn list(&self, filter: &PatternFilter) -> RepositoryResult<Vec<TimeslotPattern>> {
        let _perf = self.guard("timeslot_pattern.list");
        let conn = self.get_conn()?;
        let (where_sql, values) = prefilter_clause(filter);
        let sql = format!(
            r#"
            SELECT restaurant_code, service_type, hour, day_of_week, shift, timeslot_id,
                   expected_value, confidence, observation_count, last_updated
            FROM timeslot_pattern
            {}
            "#,
            where_sql
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), read_timeslot_row)?
            .collect::<rusqlite::Result<Vec<RawPatternRow>>>()?;

        let mut patterns = rows
            .into_iter()
            .map(RawPatternRow::into_timeslot_pattern)
            .collect::<RepositoryResult<Vec<TimeslotPattern>>>()?;
        patterns.retain(|p| filter.matches(&p.key));
        patterns.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(patterns)
    }

    fn clear(&self, scope: &ClearScope) -> RepositoryResult<usize> {
        let _perf = self.guard("timeslot_pattern.clear");
        let conn = self.get_conn()?;
        let (where_sql, values) = scope_clause(scope);
        let sql = format!("DELETE FROM timeslot_pattern {}", where_sql);
        Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
    }
}
