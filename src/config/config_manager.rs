// ==========================================
// 商业案例计算引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::engine_config_trait::EngineConfigReader;
use crate::db::open_sqlite_connection;
use crate::repository::current_timestamp;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

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
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value, current_timestamp()],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取全部 global 配置（键有序）
    pub fn list_global_config(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
    }

    /// 读取数值配置，缺失或格式错误时使用默认值
    fn get_f64_or_default(&self, key: &str, default: f64) -> RepositoryResult<f64> {
        let value = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %value,
                    default = default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// EngineConfigReader Trait 实现
// ==========================================
impl EngineConfigReader for ConfigManager {
    fn get_assumed_tests_per_hour(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::ASSUMED_TESTS_PER_HOUR, d.assumed_tests_per_hour)
    }

    fn get_working_days_per_month(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::WORKING_DAYS_PER_MONTH, d.working_days_per_month)
    }

    fn get_estimated_hours_per_day(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::ESTIMATED_HOURS_PER_DAY, d.estimated_hours_per_day)
    }

    fn get_fallback_capacity_per_hour(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::FALLBACK_CAPACITY_PER_HOUR, d.fallback_capacity_per_hour)
    }

    fn get_overload_threshold_pct(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::OVERLOAD_THRESHOLD_PCT, d.overload_threshold_pct)
    }

    fn get_underutilized_threshold_pct(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(
            config_keys::UNDERUTILIZED_THRESHOLD_PCT,
            d.underutilized_threshold_pct,
        )
    }

    fn get_high_cost_per_test(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::HIGH_COST_PER_TEST, d.high_cost_per_test)
    }

    fn get_volume_discount_min_monthly_tests(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(
            config_keys::VOLUME_DISCOUNT_MIN_MONTHLY_TESTS,
            d.volume_discount_min_monthly_tests,
        )
    }

    fn get_annual_contract_min_annual_cost(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(
            config_keys::ANNUAL_CONTRACT_MIN_ANNUAL_COST,
            d.annual_contract_min_annual_cost,
        )
    }

    fn get_qc_overhead_max_pct(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::QC_OVERHEAD_MAX_PCT, d.qc_overhead_max_pct)
    }

    fn get_min_weekly_operating_hours(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::MIN_WEEKLY_OPERATING_HOURS, d.min_weekly_operating_hours)
    }

    fn get_high_volume_annual_tests(&self) -> RepositoryResult<f64> {
        let d = EngineConfig::default();
        self.get_f64_or_default(config_keys::HIGH_VOLUME_ANNUAL_TESTS, d.high_volume_annual_tests)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // ===== 产能 =====
    pub const ASSUMED_TESTS_PER_HOUR: &str = "assumed_tests_per_hour";
    pub const WORKING_DAYS_PER_MONTH: &str = "working_days_per_month";
    pub const ESTIMATED_HOURS_PER_DAY: &str = "estimated_hours_per_day";
    pub const FALLBACK_CAPACITY_PER_HOUR: &str = "fallback_capacity_per_hour";

    // ===== 利用率 =====
    pub const OVERLOAD_THRESHOLD_PCT: &str = "overload_threshold_pct";
    pub const UNDERUTILIZED_THRESHOLD_PCT: &str = "underutilized_threshold_pct";

    // ===== 提示与建议 =====
    pub const HIGH_COST_PER_TEST: &str = "high_cost_per_test";
    pub const VOLUME_DISCOUNT_MIN_MONTHLY_TESTS: &str = "volume_discount_min_monthly_tests";
    pub const ANNUAL_CONTRACT_MIN_ANNUAL_COST: &str = "annual_contract_min_annual_cost";

    // ===== 一致性校验 =====
    pub const QC_OVERHEAD_MAX_PCT: &str = "qc_overhead_max_pct";
    pub const MIN_WEEKLY_OPERATING_HOURS: &str = "min_weekly_operating_hours";
    pub const HIGH_VOLUME_ANNUAL_TESTS: &str = "high_volume_annual_tests";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cm = manager();
        let config = EngineConfig::load(&cm).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_override_and_malformed_value() {
        let cm = manager();
        cm.set_global_config_value(config_keys::ASSUMED_TESTS_PER_HOUR, "75")
            .unwrap();
        cm.set_global_config_value(config_keys::OVERLOAD_THRESHOLD_PCT, "abc")
            .unwrap();

        let config = EngineConfig::load(&cm).unwrap();
        assert_eq!(config.assumed_tests_per_hour, 75.0);
        assert_eq!(config.overload_threshold_pct, 90.0);
        assert_eq!(cm.list_global_config().unwrap().len(), 2);
    }
}
