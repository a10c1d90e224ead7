// ==========================================
// 商业案例计算引擎 - 参考数据仓储（只读）
// ==========================================
// 表: catalog_determinations / equipment
// 目录维护不在本系统范围内，这里只做点查
// ==========================================

use crate::domain::determination::{CatalogDetermination, Equipment};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::parse_json_column;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct ReferenceDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReferenceDataRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_equipment(&self, id: &str) -> RepositoryResult<Option<Equipment>> {
        let conn = self.get_conn()?;
        Self::find_equipment_tx(&conn, id)
    }

    pub fn find_determination(&self, id: &str) -> RepositoryResult<Option<CatalogDetermination>> {
        let conn = self.get_conn()?;
        Self::find_determination_tx(&conn, id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_determination_tx(
        conn: &Connection,
        id: &str,
    ) -> RepositoryResult<Option<CatalogDetermination>> {
        let det = conn
            .query_row(
                r#"
                SELECT id, name, volume_per_test, reagent_consumption, processing_time,
                       wash_cycles, blank_required, calibration_frequency, cost_per_test,
                       calculation_formula
                FROM catalog_determinations WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(CatalogDetermination {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        volume_per_test: row.get(2)?,
                        reagent_consumption: row.get(3)?,
                        processing_time: row.get(4)?,
                        wash_cycles: row.get(5)?,
                        blank_required: row.get(6)?,
                        calibration_frequency: row.get(7)?,
                        cost_per_test: row.get(8)?,
                        calculation_formula: parse_json_column(9, row.get(9)?)?,
                    })
                },
            )
            .optional()?;
        Ok(det)
    }

    pub fn get_determination_tx(conn: &Connection, id: &str) -> RepositoryResult<CatalogDetermination> {
        Self::find_determination_tx(conn, id)?
            .ok_or_else(|| RepositoryError::not_found("CatalogDetermination", id))
    }

    pub fn find_equipment_tx(conn: &Connection, id: &str) -> RepositoryResult<Option<Equipment>> {
        let equipment = conn
            .query_row(
                r#"
                SELECT id, name, capacity_per_hour, max_daily_capacity, base_price,
                       default_calculation_formula
                FROM equipment WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(Equipment {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        capacity_per_hour: row.get(2)?,
                        max_daily_capacity: row.get(3)?,
                        base_price: row.get(4)?,
                        default_calculation_formula: parse_json_column(5, row.get(5)?)?,
                    })
                },
            )
            .optional()?;
        Ok(equipment)
    }

    pub fn get_equipment_tx(conn: &Connection, id: &str) -> RepositoryResult<Equipment> {
        Self::find_equipment_tx(conn, id)?.ok_or_else(|| RepositoryError::not_found("Equipment", id))
    }
}
