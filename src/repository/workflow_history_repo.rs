// ==========================================
// 商业案例计算引擎 - 工作流历史仓储
// ==========================================
// 表: bc_workflow_history（只追加）
// ==========================================

use crate::domain::types::Stage;
use crate::domain::workflow::{NewWorkflowHistoryEntry, WorkflowHistoryEntry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{current_timestamp, parse_enum_column};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct WorkflowHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkflowHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按时间顺序列出案例的全部迁移记录
    pub fn list_by_case(&self, business_case_id: &str) -> RepositoryResult<Vec<WorkflowHistoryEntry>> {
        let conn = self.get_conn()?;
        Self::list_by_case_tx(&conn, business_case_id)
    }

    pub fn append_tx(conn: &Connection, entry: &NewWorkflowHistoryEntry) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO bc_workflow_history (
                business_case_id, from_stage, to_stage, changed_by, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.business_case_id,
                entry.from_stage.map(|s| s.as_str()),
                entry.to_stage.as_str(),
                entry.changed_by,
                entry.notes,
                current_timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_by_case_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Vec<WorkflowHistoryEntry>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, business_case_id, from_stage, to_stage, changed_by, notes, created_at
            FROM bc_workflow_history WHERE business_case_id = ?1 ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![business_case_id], |row| {
            let from_stage: Option<String> = row.get(2)?;
            let to_stage: String = row.get(3)?;
            Ok(WorkflowHistoryEntry {
                id: row.get(0)?,
                business_case_id: row.get(1)?,
                from_stage: match from_stage {
                    Some(raw) => Some(parse_enum_column(2, &raw, Stage::parse)?),
                    None => None,
                },
                to_stage: parse_enum_column(3, &to_stage, Stage::parse)?,
                changed_by: row.get(4)?,
                notes: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
