// ==========================================
// 商业案例计算引擎 - 校验发现仓储
// ==========================================
// 表: bc_validations
// 写入语义: 每次校验先删后插（结果只反映最近一次校验）
// ==========================================

use crate::domain::types::FindingSeverity;
use crate::domain::validation::ValidationFinding;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{current_timestamp, parse_enum_column};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct ValidationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ValidationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_by_case(&self, business_case_id: &str) -> RepositoryResult<Vec<ValidationFinding>> {
        let conn = self.get_conn()?;
        Self::list_by_case_tx(&conn, business_case_id)
    }

    /// 替换案例的全部校验发现
    pub fn replace_findings_tx(
        conn: &Connection,
        business_case_id: &str,
        findings: &[ValidationFinding],
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM bc_validations WHERE business_case_id = ?1",
            params![business_case_id],
        )?;

        let now = current_timestamp();
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO bc_validations (business_case_id, validation_type, severity, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for finding in findings {
            stmt.execute(params![
                business_case_id,
                finding.finding_type,
                finding.severity.as_str(),
                finding.message,
                now,
            ])?;
        }
        Ok(())
    }

    pub fn list_by_case_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Vec<ValidationFinding>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT validation_type, severity, message
            FROM bc_validations WHERE business_case_id = ?1 ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![business_case_id], |row| {
            let severity: String = row.get(1)?;
            Ok(ValidationFinding {
                finding_type: row.get(0)?,
                severity: parse_enum_column(1, &severity, FindingSeverity::parse)?,
                message: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
