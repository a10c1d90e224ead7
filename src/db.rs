// ==========================================
// 商业案例计算引擎 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - 幂等建表，记录 schema_version
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

/// 初始化全部表结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema_version 高于当前代码版本"
            );
        }
        _ => {}
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 参考数据（只读消费）=====

CREATE TABLE IF NOT EXISTS equipment (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    capacity_per_hour REAL,
    max_daily_capacity REAL,
    base_price REAL,
    default_calculation_formula TEXT
);

CREATE TABLE IF NOT EXISTS catalog_determinations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    volume_per_test REAL,
    reagent_consumption REAL,
    processing_time REAL,
    wash_cycles REAL,
    blank_required INTEGER NOT NULL DEFAULT 0,
    calibration_frequency REAL,
    cost_per_test REAL,
    calculation_formula TEXT
);

CREATE TABLE IF NOT EXISTS calculation_templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT,
    formula TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    is_active INTEGER NOT NULL DEFAULT 1
);

-- ===== 商业案例 =====

CREATE TABLE IF NOT EXISTS bc_master (
    id TEXT PRIMARY KEY,
    client_id TEXT,
    client_name TEXT NOT NULL,
    purchase_type TEXT NOT NULL,
    duration_years INTEGER NOT NULL,
    target_margin_percentage REAL NOT NULL,
    process_code TEXT,
    contract_object TEXT,
    stage TEXT NOT NULL,
    created_by TEXT NOT NULL,
    calculated_roi_percentage REAL,
    calculated_payback_months INTEGER,
    monthly_margin REAL,
    annual_margin REAL,
    monthly_revenue REAL,
    annual_revenue REAL,
    monthly_cost REAL,
    annual_cost REAL,
    total_investment REAL,
    equipment_investment REAL,
    economic_data_complete INTEGER NOT NULL DEFAULT 0,
    operational_data_complete INTEGER NOT NULL DEFAULT 0,
    lis_data_complete INTEGER NOT NULL DEFAULT 0,
    has_inconsistencies INTEGER NOT NULL DEFAULT 0,
    inconsistency_details TEXT,
    risk_level TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_economic_data (
    business_case_id TEXT PRIMARY KEY REFERENCES bc_master(id),
    equipment_id TEXT,
    equipment_name TEXT,
    equipment_cost REAL NOT NULL DEFAULT 0,
    calculation_mode TEXT,
    show_roi INTEGER NOT NULL DEFAULT 1,
    show_margin INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS bc_equipment_selection (
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    equipment_id TEXT NOT NULL REFERENCES equipment(id),
    is_primary INTEGER NOT NULL DEFAULT 1,
    selected_at TEXT NOT NULL,
    PRIMARY KEY (business_case_id, equipment_id)
);

CREATE TABLE IF NOT EXISTS bc_determinations (
    id TEXT PRIMARY KEY,
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    determination_id TEXT NOT NULL REFERENCES catalog_determinations(id),
    monthly_quantity INTEGER NOT NULL,
    annual_quantity INTEGER NOT NULL,
    calculated_consumption REAL,
    calculated_cost REAL,
    calculation_details TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (business_case_id, determination_id)
);

CREATE TABLE IF NOT EXISTS bc_investments (
    id TEXT PRIMARY KEY,
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    concept TEXT NOT NULL,
    amount REAL NOT NULL,
    investment_type TEXT NOT NULL,
    category TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_operational_data (
    business_case_id TEXT PRIMARY KEY REFERENCES bc_master(id),
    work_days_per_week INTEGER NOT NULL,
    shifts_per_day INTEGER NOT NULL,
    hours_per_shift REAL NOT NULL,
    quality_controls_per_shift INTEGER NOT NULL,
    control_levels INTEGER NOT NULL,
    routine_qc_frequency TEXT,
    special_tests TEXT,
    special_qc_frequency TEXT,
    equipment_status TEXT,
    ownership_status TEXT,
    backup_equipment_name TEXT,
    backup_status TEXT,
    backup_manufacture_year INTEGER,
    installation_location TEXT,
    delivery_type TEXT,
    deadline_months INTEGER,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_lis_data (
    business_case_id TEXT PRIMARY KEY REFERENCES bc_master(id),
    includes_lis INTEGER NOT NULL DEFAULT 0,
    lis_provider TEXT,
    includes_hardware INTEGER NOT NULL DEFAULT 0,
    monthly_patients INTEGER,
    current_system_name TEXT,
    current_system_provider TEXT,
    current_system_hardware TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_lis_equipment_interfaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    model TEXT NOT NULL,
    provider TEXT
);

CREATE TABLE IF NOT EXISTS bc_validations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    validation_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_calculations (
    business_case_id TEXT PRIMARY KEY REFERENCES bc_master(id),
    calculation_mode TEXT NOT NULL,
    total_monthly_tests REAL NOT NULL,
    total_annual_tests REAL NOT NULL,
    total_monthly_cost REAL NOT NULL,
    total_annual_cost REAL NOT NULL,
    total_monthly_consumption REAL NOT NULL,
    total_annual_consumption REAL NOT NULL,
    cost_per_test REAL NOT NULL,
    utilization_percentage REAL NOT NULL,
    capacity_exceeded INTEGER NOT NULL,
    roi_percentage REAL NOT NULL,
    payback_months INTEGER,
    utilization_json TEXT NOT NULL,
    rentability_json TEXT NOT NULL,
    warnings_json TEXT NOT NULL,
    recommendations_json TEXT NOT NULL,
    calculated_at TEXT NOT NULL,
    calculation_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bc_workflow_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    business_case_id TEXT NOT NULL REFERENCES bc_master(id),
    from_stage TEXT,
    to_stage TEXT NOT NULL,
    changed_by TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bc_determinations_case ON bc_determinations(business_case_id);
CREATE INDEX IF NOT EXISTS idx_bc_investments_case ON bc_investments(business_case_id);
CREATE INDEX IF NOT EXISTS idx_bc_validations_case ON bc_validations(business_case_id);
CREATE INDEX IF NOT EXISTS idx_bc_workflow_history_case ON bc_workflow_history(business_case_id, id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_on_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
