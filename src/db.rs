// ==========================================
// 生产派工系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表 (幂等)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表 (已存在则跳过)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS job_card (
            job_card_id TEXT PRIMARY KEY,
            routing_id TEXT NOT NULL,
            step_id TEXT,
            production_item TEXT NOT NULL,
            operation TEXT NOT NULL,
            sales_order_line TEXT,
            workstation TEXT,
            employee TEXT,
            source_location TEXT,
            target_location TEXT,
            transfer_entry INTEGER NOT NULL DEFAULT 0,
            consumes_rm INTEGER NOT NULL DEFAULT 0,
            final_step INTEGER NOT NULL DEFAULT 0,
            operation_seq_no INTEGER NOT NULL DEFAULT 0,
            for_quantity REAL NOT NULL DEFAULT 0,
            total_qty REAL NOT NULL DEFAULT 0,
            total_completed_qty REAL NOT NULL DEFAULT 0,
            total_rejected_qty REAL NOT NULL DEFAULT 0,
            available_qty REAL NOT NULL DEFAULT 0,
            short_close INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            doc_state TEXT NOT NULL,
            rm_status_pct INTEGER NOT NULL DEFAULT -100,
            rm_shortage REAL NOT NULL DEFAULT 0,
            manual_posting INTEGER NOT NULL DEFAULT 0,
            posting_time TEXT,
            total_time_mins INTEGER NOT NULL DEFAULT 0,
            raw_materials_json TEXT NOT NULL DEFAULT '[]',
            produced_items_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_job_card_item_op
            ON job_card (production_item, operation, doc_state);
        CREATE INDEX IF NOT EXISTS idx_job_card_sales_line
            ON job_card (sales_order_line, doc_state);

        CREATE TABLE IF NOT EXISTS job_card_time_log (
            interval_id TEXT PRIMARY KEY,
            job_card_id TEXT NOT NULL REFERENCES job_card (job_card_id) ON DELETE CASCADE,
            sequence_no INTEGER NOT NULL,
            from_time TEXT,
            to_time TEXT,
            workstation TEXT,
            completed_qty REAL NOT NULL DEFAULT 0,
            rejected_qty REAL NOT NULL DEFAULT 0,
            salvage_qty REAL NOT NULL DEFAULT 0,
            salvage_location TEXT,
            time_in_mins INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_time_log_workstation
            ON job_card_time_log (workstation);
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
