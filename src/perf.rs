// ==========================================
// 门店服务评级系统 - 存储性能探针
// ==========================================
// - StoreCallGuard: 单次存储调用耗时,超出延迟目标告警
// - install_sqlite_tracing: 慢 SQL 日志
// ==========================================

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    let s = sql.trim().replace('\n', " ");
    if s.chars().count() <= max_len {
        return s;
    }
    let head: String = s.chars().take(max_len).collect();
    format!("{}…", head)
}

/// 安装 SQLite 慢语句 profile
///
/// 开关：
/// - Debug 默认开启；Release 默认关闭
/// - `SERVICE_GRADING_PERF_SQL=1` 强制开启
/// - `SERVICE_GRADING_SLOW_SQL_MS=100` 慢 SQL 阈值（毫秒）
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = match std::env::var("SERVICE_GRADING_PERF_SQL") {
        Ok(v) => is_true(&v),
        Err(_) => cfg!(debug_assertions),
    };

    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("SERVICE_GRADING_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(100);
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.profile(Some(sql_profile_callback));
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 240),
            "slow sql"
        );
    }
}

/// 存储调用耗时 Guard
///
/// 使用方式：
/// ```ignore
/// let _perf = StoreCallGuard::new("service_pattern.get", Duration::from_millis(100));
/// // do work...
/// ```
pub struct StoreCallGuard {
    op: &'static str,
    start: Instant,
    target: Duration,
}

impl StoreCallGuard {
    pub fn new(op: &'static str, target: Duration) -> Self {
        Self {
            op,
            start: Instant::now(),
            target,
        }
    }
}

impl Drop for StoreCallGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed > self.target {
            tracing::warn!(
                target: "store_latency",
                op = self.op,
                elapsed_ms = elapsed.as_millis() as u64,
                target_ms = self.target.as_millis() as u64,
                "存储调用超出延迟目标"
            );
        } else {
            tracing::trace!(
                target: "store_latency",
                op = self.op,
                elapsed_us = elapsed.as_micros() as u64,
                "done"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_sql() {
        assert_eq!(truncate_sql("SELECT 1", 20), "SELECT 1");
        assert_eq!(truncate_sql("SELECT\n1", 20), "SELECT 1");
        assert_eq!(truncate_sql("SELECT * FROM t", 6), "SELECT…");
    }
}
