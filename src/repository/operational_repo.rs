// ==========================================
// 商业案例计算引擎 - 运营数据 / LIS 数据仓储
// ==========================================
// 表: bc_operational_data / bc_lis_data / bc_lis_equipment_interfaces
// 写入: upsert；LIS 设备接口整体替换
// ==========================================

use crate::domain::operational::{LisData, LisEquipmentInterface, OperationalData};
use crate::repository::current_timestamp;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct OperationalDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OperationalDataRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_operational(&self, business_case_id: &str) -> RepositoryResult<Option<OperationalData>> {
        let conn = self.get_conn()?;
        Self::find_operational_tx(&conn, business_case_id)
    }

    pub fn find_lis(&self, business_case_id: &str) -> RepositoryResult<Option<LisData>> {
        let conn = self.get_conn()?;
        Self::find_lis_tx(&conn, business_case_id)
    }

    // ==========================================
    // 运营数据
    // ==========================================

    pub fn upsert_operational_tx(
        conn: &Connection,
        business_case_id: &str,
        data: &OperationalData,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO bc_operational_data (
                business_case_id, work_days_per_week, shifts_per_day, hours_per_shift,
                quality_controls_per_shift, control_levels, routine_qc_frequency,
                special_tests, special_qc_frequency, equipment_status, ownership_status,
                backup_equipment_name, backup_status, backup_manufacture_year,
                installation_location, delivery_type, deadline_months, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(business_case_id) DO UPDATE SET
                work_days_per_week = excluded.work_days_per_week,
                shifts_per_day = excluded.shifts_per_day,
                hours_per_shift = excluded.hours_per_shift,
                quality_controls_per_shift = excluded.quality_controls_per_shift,
                control_levels = excluded.control_levels,
                routine_qc_frequency = excluded.routine_qc_frequency,
                special_tests = excluded.special_tests,
                special_qc_frequency = excluded.special_qc_frequency,
                equipment_status = excluded.equipment_status,
                ownership_status = excluded.ownership_status,
                backup_equipment_name = excluded.backup_equipment_name,
                backup_status = excluded.backup_status,
                backup_manufacture_year = excluded.backup_manufacture_year,
                installation_location = excluded.installation_location,
                delivery_type = excluded.delivery_type,
                deadline_months = excluded.deadline_months,
                updated_at = excluded.updated_at
            "#,
            params![
                business_case_id,
                data.work_days_per_week,
                data.shifts_per_day,
                data.hours_per_shift,
                data.quality_controls_per_shift,
                data.control_levels,
                data.routine_qc_frequency,
                data.special_tests,
                data.special_qc_frequency,
                data.equipment_status,
                data.ownership_status,
                data.backup_equipment_name,
                data.backup_status,
                data.backup_manufacture_year,
                data.installation_location,
                data.delivery_type,
                data.deadline_months,
                current_timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn find_operational_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Option<OperationalData>> {
        let data = conn
            .query_row(
                r#"
                SELECT work_days_per_week, shifts_per_day, hours_per_shift,
                       quality_controls_per_shift, control_levels, routine_qc_frequency,
                       special_tests, special_qc_frequency, equipment_status, ownership_status,
                       backup_equipment_name, backup_status, backup_manufacture_year,
                       installation_location, delivery_type, deadline_months
                FROM bc_operational_data WHERE business_case_id = ?1
                "#,
                params![business_case_id],
                |row| {
                    Ok(OperationalData {
                        work_days_per_week: row.get(0)?,
                        shifts_per_day: row.get(1)?,
                        hours_per_shift: row.get(2)?,
                        quality_controls_per_shift: row.get(3)?,
                        control_levels: row.get(4)?,
                        routine_qc_frequency: row.get(5)?,
                        special_tests: row.get(6)?,
                        special_qc_frequency: row.get(7)?,
                        equipment_status: row.get(8)?,
                        ownership_status: row.get(9)?,
                        backup_equipment_name: row.get(10)?,
                        backup_status: row.get(11)?,
                        backup_manufacture_year: row.get(12)?,
                        installation_location: row.get(13)?,
                        delivery_type: row.get(14)?,
                        deadline_months: row.get(15)?,
                    })
                },
            )
            .optional()?;
        Ok(data)
    }

    // ==========================================
    // LIS 数据
    // ==========================================

    pub fn upsert_lis_tx(conn: &Connection, business_case_id: &str, data: &LisData) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO bc_lis_data (
                business_case_id, includes_lis, lis_provider, includes_hardware,
                monthly_patients, current_system_name, current_system_provider,
                current_system_hardware, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(business_case_id) DO UPDATE SET
                includes_lis = excluded.includes_lis,
                lis_provider = excluded.lis_provider,
                includes_hardware = excluded.includes_hardware,
                monthly_patients = excluded.monthly_patients,
                current_system_name = excluded.current_system_name,
                current_system_provider = excluded.current_system_provider,
                current_system_hardware = excluded.current_system_hardware,
                updated_at = excluded.updated_at
            "#,
            params![
                business_case_id,
                data.includes_lis,
                data.lis_provider,
                data.includes_hardware,
                data.monthly_patients,
                data.current_system_name,
                data.current_system_provider,
                data.current_system_hardware,
                current_timestamp(),
            ],
        )?;

        conn.execute(
            "DELETE FROM bc_lis_equipment_interfaces WHERE business_case_id = ?1",
            params![business_case_id],
        )?;
        let mut stmt = conn.prepare(
            "INSERT INTO bc_lis_equipment_interfaces (business_case_id, model, provider) VALUES (?1, ?2, ?3)",
        )?;
        for interface in &data.equipment_interfaces {
            stmt.execute(params![business_case_id, interface.model, interface.provider])?;
        }
        Ok(())
    }

    pub fn find_lis_tx(conn: &Connection, business_case_id: &str) -> RepositoryResult<Option<LisData>> {
        let data = conn
            .query_row(
                r#"
                SELECT includes_lis, lis_provider, includes_hardware, monthly_patients,
                       current_system_name, current_system_provider, current_system_hardware
                FROM bc_lis_data WHERE business_case_id = ?1
                "#,
                params![business_case_id],
                |row| {
                    Ok(LisData {
                        includes_lis: row.get(0)?,
                        lis_provider: row.get(1)?,
                        includes_hardware: row.get(2)?,
                        monthly_patients: row.get(3)?,
                        current_system_name: row.get(4)?,
                        current_system_provider: row.get(5)?,
                        current_system_hardware: row.get(6)?,
                        equipment_interfaces: Vec::new(),
                    })
                },
            )
            .optional()?;

        let mut data = match data {
            Some(d) => d,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            "SELECT model, provider FROM bc_lis_equipment_interfaces WHERE business_case_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![business_case_id], |row| {
            Ok(LisEquipmentInterface {
                model: row.get(0)?,
                provider: row.get(1)?,
            })
        })?;
        data.equipment_interfaces = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(Some(data))
    }
}
