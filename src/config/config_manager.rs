// ==========================================
// 生产派工系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// DispatchSettings - 派工配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// 全局资源时段准入开关 (工序也可单独开启)
    pub check_overlap_for_machines: bool,
    /// 工时/过账时间允许超出当前时间的分钟数
    pub future_time_mins: i64,
    pub default_resource_capacity: u32,
    /// 无源库位工序卡的生产数量下限 (%, 仅短关时生效)
    pub short_close_lower_pct: f64,
    /// 无源库位工序卡的生产数量上限 (%)
    pub over_production_upper_pct: f64,
    /// 拥有放行与报废品去向权限的角色
    pub bypass_role: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            check_overlap_for_machines: false,
            future_time_mins: 0,
            default_resource_capacity: 1,
            short_close_lower_pct: 0.0,
            over_production_upper_pct: 0.0,
            bypass_role: "System Manager".to_string(),
        }
    }
}

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
        crate::db::init_schema(&conn)?;

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

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入 global scope 配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值; 缺失时取默认值, 格式错误时告警并取默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + std::fmt::Debug,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = ?default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 读取布尔配置 ("1"/"0"/"true"/"false")
    fn get_bool_or_default(&self, key: &str, default: bool) -> RepositoryResult<bool> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => {
                tracing::warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 加载派工配置快照
    pub fn load_settings(&self) -> RepositoryResult<DispatchSettings> {
        let defaults = DispatchSettings::default();
        let settings = DispatchSettings {
            check_overlap_for_machines: self
                .get_bool_or_default(config_keys::CHECK_OVERLAP_FOR_MACHINES, defaults.check_overlap_for_machines)?,
            future_time_mins: self.get_parsed_or_default(config_keys::FUTURE_TIME_MINS, defaults.future_time_mins)?,
            default_resource_capacity: self
                .get_parsed_or_default(config_keys::DEFAULT_RESOURCE_CAPACITY, defaults.default_resource_capacity)?,
            short_close_lower_pct: self
                .get_parsed_or_default(config_keys::SHORT_CLOSE_LOWER_PCT, defaults.short_close_lower_pct)?,
            over_production_upper_pct: self
                .get_parsed_or_default(config_keys::OVER_PRODUCTION_UPPER_PCT, defaults.over_production_upper_pct)?,
            bypass_role: self
                .get_global_config_value(config_keys::BYPASS_ROLE)?
                .unwrap_or(defaults.bypass_role),
        };
        tracing::debug!(?settings, "派工配置已加载");
        Ok(settings)
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn snapshot_json(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 资源时段准入
    pub const CHECK_OVERLAP_FOR_MACHINES: &str = "check_overlap_for_machines";
    pub const DEFAULT_RESOURCE_CAPACITY: &str = "default_resource_capacity";

    // 工时
    pub const FUTURE_TIME_MINS: &str = "future_time_mins";

    // 生产数量区间
    pub const SHORT_CLOSE_LOWER_PCT: &str = "short_close_lower_pct";
    pub const OVER_PRODUCTION_UPPER_PCT: &str = "over_production_upper_pct";

    // 权限
    pub const BYPASS_ROLE: &str = "bypass_role";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let cm = manager();
        assert_eq!(cm.load_settings().unwrap(), DispatchSettings::default());
        assert_eq!(cm.snapshot_json().unwrap(), "{}");
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let cm = manager();
        cm.set_global_config_value(config_keys::CHECK_OVERLAP_FOR_MACHINES, "1").unwrap();
        cm.set_global_config_value(config_keys::DEFAULT_RESOURCE_CAPACITY, "3").unwrap();
        cm.set_global_config_value(config_keys::FUTURE_TIME_MINS, "abc").unwrap();
        cm.set_global_config_value(config_keys::BYPASS_ROLE, "Manufacturing Manager").unwrap();

        let s = cm.load_settings().unwrap();
        assert!(s.check_overlap_for_machines);
        assert_eq!(s.default_resource_capacity, 3);
        assert_eq!(s.future_time_mins, 0);
        assert_eq!(s.bypass_role, "Manufacturing Manager");

        let snapshot: BTreeMap<String, String> = serde_json::from_str(&cm.snapshot_json().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 4);
    }
}
