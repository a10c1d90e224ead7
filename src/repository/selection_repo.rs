// ==========================================
// 商业案例计算引擎 - 设备选型仓储
// ==========================================
// 表: bc_equipment_selection
// 约束: 每个案例至多一个主设备（写入时先清除旧主设备）
// ==========================================

use crate::domain::business_case::EquipmentSelection;
use crate::repository::current_timestamp;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct EquipmentSelectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EquipmentSelectionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_primary(&self, business_case_id: &str) -> RepositoryResult<Vec<EquipmentSelection>> {
        let conn = self.get_conn()?;
        Self::list_primary_tx(&conn, business_case_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 查询案例的主设备选型（正常情况下 0 或 1 条）
    pub fn list_primary_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Vec<EquipmentSelection>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT business_case_id, equipment_id, is_primary, selected_at
            FROM bc_equipment_selection
            WHERE business_case_id = ?1 AND is_primary = 1
            ORDER BY selected_at
            "#,
        )?;
        let rows = stmt.query_map(params![business_case_id], |row| {
            Ok(EquipmentSelection {
                business_case_id: row.get(0)?,
                equipment_id: row.get(1)?,
                is_primary: row.get(2)?,
                selected_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 设置主设备（清除其它主设备标记后 upsert）
    pub fn set_primary_tx(
        conn: &Connection,
        business_case_id: &str,
        equipment_id: &str,
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM bc_equipment_selection WHERE business_case_id = ?1 AND equipment_id <> ?2 AND is_primary = 1",
            params![business_case_id, equipment_id],
        )?;
        conn.execute(
            r#"
            INSERT INTO bc_equipment_selection (business_case_id, equipment_id, is_primary, selected_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(business_case_id, equipment_id) DO UPDATE SET is_primary = 1, selected_at = ?3
            "#,
            params![business_case_id, equipment_id, current_timestamp()],
        )?;
        Ok(())
    }
}
