// ==========================================
// 商业案例计算引擎 - 附加投资仓储
// ==========================================
// 表: bc_investments
// ==========================================

use crate::domain::investment::{Investment, InvestmentPatch, NewInvestment};
use crate::domain::types::{InvestmentCategory, InvestmentType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{current_timestamp, parse_enum_column};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "id, business_case_id, concept, amount, investment_type, category, notes, created_at";

pub struct InvestmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InvestmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_by_case(&self, business_case_id: &str) -> RepositoryResult<Vec<Investment>> {
        let conn = self.get_conn()?;
        Self::list_by_case_tx(&conn, business_case_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(
        conn: &Connection,
        business_case_id: &str,
        input: &NewInvestment,
    ) -> RepositoryResult<Investment> {
        let investment = Investment {
            id: Uuid::new_v4().to_string(),
            business_case_id: business_case_id.to_string(),
            concept: input.concept.clone(),
            amount: input.amount,
            investment_type: input.investment_type,
            category: input.category,
            notes: input.notes.clone(),
            created_at: current_timestamp(),
        };
        conn.execute(
            r#"
            INSERT INTO bc_investments (
                id, business_case_id, concept, amount, investment_type, category, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                investment.id,
                investment.business_case_id,
                investment.concept,
                investment.amount,
                investment.investment_type.as_str(),
                investment.category.as_str(),
                investment.notes,
                investment.created_at,
            ],
        )?;
        Ok(investment)
    }

    pub fn list_by_case_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Vec<Investment>> {
        let sql = format!(
            "SELECT {} FROM bc_investments WHERE business_case_id = ?1 ORDER BY created_at, id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![business_case_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn find_tx(conn: &Connection, id: &str) -> RepositoryResult<Option<Investment>> {
        let sql = format!("SELECT {} FROM bc_investments WHERE id = ?1", SELECT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], map_row).optional()?)
    }

    /// 部分更新（None 字段保持原值）
    pub fn update_tx(conn: &Connection, id: &str, patch: &InvestmentPatch) -> RepositoryResult<Investment> {
        let rows = conn.execute(
            r#"
            UPDATE bc_investments SET
                concept = COALESCE(?1, concept),
                amount = COALESCE(?2, amount),
                investment_type = COALESCE(?3, investment_type),
                category = COALESCE(?4, category),
                notes = COALESCE(?5, notes)
            WHERE id = ?6
            "#,
            params![
                patch.concept,
                patch.amount,
                patch.investment_type.map(|t| t.as_str()),
                patch.category.map(|c| c.as_str()),
                patch.notes,
                id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Investment", id));
        }
        Self::find_tx(conn, id)?.ok_or_else(|| RepositoryError::not_found("Investment", id))
    }

    /// 删除投资，不存在返回 NotFound
    pub fn delete_tx(conn: &Connection, id: &str) -> RepositoryResult<Investment> {
        let existing = Self::find_tx(conn, id)?.ok_or_else(|| RepositoryError::not_found("Investment", id))?;
        conn.execute("DELETE FROM bc_investments WHERE id = ?1", params![id])?;
        Ok(existing)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<Investment> {
    let investment_type: String = row.get(4)?;
    let category: String = row.get(5)?;
    Ok(Investment {
        id: row.get(0)?,
        business_case_id: row.get(1)?,
        concept: row.get(2)?,
        amount: row.get(3)?,
        investment_type: parse_enum_column(4, &investment_type, InvestmentType::parse)?,
        category: parse_enum_column(5, &category, InvestmentCategory::parse)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}
