// ==========================================
// 门店服务评级系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - busy_timeout 与存储延迟目标对齐: 锁等待超时即按存储不可用降级
// - 基线表 / 配置表幂等建表
// ==========================================

use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）,与存储延迟目标默认值一致
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 100;

/// 默认数据库文件名
pub const DEFAULT_DB_FILE: &str = "patterns.db";

/// 配置 SQLite 连接的统一 PRAGMA
pub fn configure_sqlite_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn, busy_timeout)?;
    Ok(conn)
}

/// 初始化基线表与配置表（可重复执行）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS service_pattern (
            restaurant_code   TEXT    NOT NULL,
            service_type      TEXT    NOT NULL,
            hour              INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            day_of_week       INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
            expected_value    REAL    NOT NULL,
            confidence        REAL    NOT NULL,
            observation_count INTEGER NOT NULL,
            last_updated      TEXT    NOT NULL,
            PRIMARY KEY (restaurant_code, service_type, hour, day_of_week)
        );

        CREATE TABLE IF NOT EXISTS timeslot_pattern (
            restaurant_code   TEXT    NOT NULL,
            service_type      TEXT    NOT NULL,
            hour              INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            day_of_week       INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
            shift             TEXT    NOT NULL,
            timeslot_id       TEXT    NOT NULL,
            expected_value    REAL    NOT NULL,
            confidence        REAL    NOT NULL,
            observation_count INTEGER NOT NULL,
            last_updated      TEXT    NOT NULL,
            PRIMARY KEY (restaurant_code, service_type, hour, day_of_week, shift, timeslot_id)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id   TEXT NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )
}

/// 默认数据库路径: <data_dir>/service-grading/patterns.db
///
/// 系统数据目录不可用时回退到当前目录
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("service-grading"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_FILE)
}
