// ==========================================
// 商业案例计算引擎 - 案例测定项仓储
// ==========================================
// 表: bc_determinations，(business_case_id, determination_id) 唯一
// ==========================================

use crate::domain::determination::{BcDetermination, Quantities};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{current_timestamp, parse_json_column};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, business_case_id, determination_id, monthly_quantity, annual_quantity,
    calculated_consumption, calculated_cost, calculation_details, notes,
    created_at, updated_at
"#;

pub struct BcDeterminationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BcDeterminationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_by_case(&self, business_case_id: &str) -> RepositoryResult<Vec<BcDetermination>> {
        let conn = self.get_conn()?;
        Self::list_by_case_tx(&conn, business_case_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn list_by_case_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Vec<BcDetermination>> {
        let sql = format!(
            "SELECT {} FROM bc_determinations WHERE business_case_id = ?1 ORDER BY created_at, determination_id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![business_case_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn find_tx(
        conn: &Connection,
        business_case_id: &str,
        determination_id: &str,
    ) -> RepositoryResult<Option<BcDetermination>> {
        let sql = format!(
            "SELECT {} FROM bc_determinations WHERE business_case_id = ?1 AND determination_id = ?2",
            SELECT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![business_case_id, determination_id], map_row)
            .optional()?;
        Ok(row)
    }

    /// 新增或覆盖测定项数量（同时写入单行计算结果）
    pub fn upsert_tx(
        conn: &Connection,
        business_case_id: &str,
        determination_id: &str,
        quantities: Quantities,
        calculated: Option<(f64, f64, &serde_json::Value)>,
        notes: Option<&str>,
    ) -> RepositoryResult<()> {
        let now = current_timestamp();
        let (consumption, cost, details) = match calculated {
            Some((consumption, cost, details)) => {
                (Some(consumption), Some(cost), Some(details.to_string()))
            }
            None => (None, None, None),
        };
        conn.execute(
            r#"
            INSERT INTO bc_determinations (
                id, business_case_id, determination_id, monthly_quantity, annual_quantity,
                calculated_consumption, calculated_cost, calculation_details, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(business_case_id, determination_id) DO UPDATE SET
                monthly_quantity = excluded.monthly_quantity,
                annual_quantity = excluded.annual_quantity,
                calculated_consumption = excluded.calculated_consumption,
                calculated_cost = excluded.calculated_cost,
                calculation_details = excluded.calculation_details,
                notes = COALESCE(excluded.notes, bc_determinations.notes),
                updated_at = excluded.updated_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                business_case_id,
                determination_id,
                quantities.monthly,
                quantities.annual,
                consumption,
                cost,
                details,
                notes,
                now,
            ],
        )?;
        Ok(())
    }

    /// 产能约束调整：写入新数量并记录说明
    pub fn update_quantities_tx(
        conn: &Connection,
        business_case_id: &str,
        determination_id: &str,
        quantities: Quantities,
        note: &str,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE bc_determinations
            SET monthly_quantity = ?1, annual_quantity = ?2, notes = ?3, updated_at = ?4
            WHERE business_case_id = ?5 AND determination_id = ?6
            "#,
            params![
                quantities.monthly,
                quantities.annual,
                note,
                current_timestamp(),
                business_case_id,
                determination_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("BcDetermination", determination_id));
        }
        Ok(())
    }

    /// 写入单行计算结果
    pub fn update_calculation_tx(
        conn: &Connection,
        business_case_id: &str,
        determination_id: &str,
        consumption: f64,
        cost: f64,
        details: &serde_json::Value,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE bc_determinations
            SET calculated_consumption = ?1, calculated_cost = ?2,
                calculation_details = ?3, updated_at = ?4
            WHERE business_case_id = ?5 AND determination_id = ?6
            "#,
            params![
                consumption,
                cost,
                details.to_string(),
                current_timestamp(),
                business_case_id,
                determination_id,
            ],
        )?;
        Ok(())
    }

    /// 删除单个测定项
    ///
    /// # 返回
    /// 删除的行数
    pub fn delete_tx(
        conn: &Connection,
        business_case_id: &str,
        determination_id: &str,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM bc_determinations WHERE business_case_id = ?1 AND determination_id = ?2",
            params![business_case_id, determination_id],
        )?;
        Ok(rows)
    }

    pub fn delete_all_for_case_tx(conn: &Connection, business_case_id: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM bc_determinations WHERE business_case_id = ?1",
            params![business_case_id],
        )?;
        Ok(rows)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<BcDetermination> {
    Ok(BcDetermination {
        id: row.get(0)?,
        business_case_id: row.get(1)?,
        determination_id: row.get(2)?,
        monthly_quantity: row.get(3)?,
        annual_quantity: row.get(4)?,
        calculated_consumption: row.get(5)?,
        calculated_cost: row.get(6)?,
        calculation_details: parse_json_column(7, row.get(7)?)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
