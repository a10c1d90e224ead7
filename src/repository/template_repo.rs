// ==========================================
// 商业案例计算引擎 - 计算模板仓储
// ==========================================
// 表: calculation_templates（只读）
// ==========================================

use crate::domain::calculation::CalculationTemplate;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::parse_json_column;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct CalculationTemplateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CalculationTemplateRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 列出启用的模板（可按类别过滤），按名称排序
    pub fn list_active(&self, category: Option<&str>) -> RepositoryResult<Vec<CalculationTemplate>> {
        let conn = self.get_conn()?;
        Self::list_active_tx(&conn, category)
    }

    pub fn list_active_tx(
        conn: &Connection,
        category: Option<&str>,
    ) -> RepositoryResult<Vec<CalculationTemplate>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, category, description, formula, version, is_active
            FROM calculation_templates
            WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
            ORDER BY name, id
            "#,
        )?;
        let rows = stmt.query_map(params![category], |row| {
            Ok(CalculationTemplate {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                description: row.get(3)?,
                formula: parse_json_column(4, row.get(4)?)?.unwrap_or_default(),
                version: row.get(5)?,
                is_active: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    #[test]
    fn test_list_active_filters_and_orders() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO calculation_templates (id, name, category, formula, is_active)
                VALUES ('t1', 'B 成本', 'cost', '{"type":"expression","expression":"a*b"}', 1);
            INSERT INTO calculation_templates (id, name, category, formula, is_active)
                VALUES ('t2', 'A 消耗', 'consumption', '{"type":"expression","expression":"a"}', 1);
            INSERT INTO calculation_templates (id, name, category, formula, is_active)
                VALUES ('t3', 'C 停用', 'cost', '{"type":"expression","expression":"1"}', 0);
            "#,
        )
        .unwrap();

        let all = CalculationTemplateRepository::list_active_tx(&conn, None).unwrap();
        assert_eq!(all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t2", "t1"]);

        let cost = CalculationTemplateRepository::list_active_tx(&conn, Some("cost")).unwrap();
        assert_eq!(cost.len(), 1);
        assert_eq!(cost[0].formula["expression"], "a*b");
    }
}
