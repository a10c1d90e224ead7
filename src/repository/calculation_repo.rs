// ==========================================
// 商业案例计算引擎 - 计算快照仓储
// ==========================================
// 表: bc_calculations（每个案例一行）
// 并发控制: calculation_version 比较并交换 (CAS)
// - 首次写入: INSERT，主键冲突视为并发写入
// - 后续写入: UPDATE ... WHERE calculation_version = expected
// ==========================================

use crate::domain::calculation::{
    CalculationSnapshot, CalculationTotals, CalculationWarning, Recommendation, RentabilityReport,
    UtilizationReport,
};
use crate::domain::types::CalculationMode;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::parse_enum_column;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

pub struct CalculationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CalculationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_case(&self, business_case_id: &str) -> RepositoryResult<Option<CalculationSnapshot>> {
        let conn = self.get_conn()?;
        Self::find_by_case_tx(&conn, business_case_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 当前快照版本（无快照返回 None）
    pub fn current_version_tx(conn: &Connection, business_case_id: &str) -> RepositoryResult<Option<i64>> {
        let version = conn
            .query_row(
                "SELECT calculation_version FROM bc_calculations WHERE business_case_id = ?1",
                params![business_case_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// 以 CAS 方式写入快照
    ///
    /// # 参数
    /// - `snapshot`: 待写入快照（calculation_version 必须为 expected + 1）
    /// - `expected`: 计算开始时读到的版本
    ///
    /// # 返回
    /// - Ok(version): 写入后的版本
    /// - Err(SnapshotVersionConflict): 期间有其它写入者
    pub fn write_snapshot_cas_tx(
        conn: &Connection,
        snapshot: &CalculationSnapshot,
        expected: Option<i64>,
    ) -> RepositoryResult<i64> {
        let bc_id = snapshot.business_case_id.as_str();
        let next = expected.unwrap_or(0) + 1;
        if snapshot.calculation_version != next {
            return Err(RepositoryError::SnapshotVersionConflict {
                business_case_id: bc_id.to_string(),
                expected,
                actual: Some(snapshot.calculation_version - 1),
            });
        }

        let t = &snapshot.totals;
        let utilization_json = serde_json::to_string(&snapshot.utilization)?;
        let rentability_json = serde_json::to_string(&snapshot.rentability)?;
        let warnings_json = serde_json::to_string(&snapshot.warnings)?;
        let recommendations_json = serde_json::to_string(&snapshot.recommendations)?;

        let rows = match expected {
            None => {
                let result = conn.execute(
                    r#"
                    INSERT INTO bc_calculations (
                        business_case_id, calculation_mode,
                        total_monthly_tests, total_annual_tests,
                        total_monthly_cost, total_annual_cost,
                        total_monthly_consumption, total_annual_consumption,
                        cost_per_test, utilization_percentage, capacity_exceeded,
                        roi_percentage, payback_months,
                        utilization_json, rentability_json, warnings_json, recommendations_json,
                        calculated_at, calculation_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                    "#,
                    params![
                        bc_id,
                        snapshot.calculation_mode.as_str(),
                        t.total_monthly_tests,
                        t.total_annual_tests,
                        t.total_monthly_cost,
                        t.total_annual_cost,
                        t.total_monthly_consumption,
                        t.total_annual_consumption,
                        t.cost_per_test,
                        snapshot.utilization.utilization_percentage,
                        snapshot.utilization.capacity_exceeded,
                        snapshot.rentability.roi_percentage,
                        snapshot.rentability.payback_months,
                        utilization_json,
                        rentability_json,
                        warnings_json,
                        recommendations_json,
                        snapshot.calculated_at,
                        next,
                    ],
                );
                match result {
                    Ok(n) => n,
                    Err(e) => match RepositoryError::from(e) {
                        RepositoryError::UniqueConstraintViolation(_) => 0,
                        other => return Err(other),
                    },
                }
            }
            Some(expected_version) => conn.execute(
                r#"
                UPDATE bc_calculations SET
                    calculation_mode = ?1,
                    total_monthly_tests = ?2,
                    total_annual_tests = ?3,
                    total_monthly_cost = ?4,
                    total_annual_cost = ?5,
                    total_monthly_consumption = ?6,
                    total_annual_consumption = ?7,
                    cost_per_test = ?8,
                    utilization_percentage = ?9,
                    capacity_exceeded = ?10,
                    roi_percentage = ?11,
                    payback_months = ?12,
                    utilization_json = ?13,
                    rentability_json = ?14,
                    warnings_json = ?15,
                    recommendations_json = ?16,
                    calculated_at = ?17,
                    calculation_version = ?18
                WHERE business_case_id = ?19 AND calculation_version = ?20
                "#,
                params![
                    snapshot.calculation_mode.as_str(),
                    t.total_monthly_tests,
                    t.total_annual_tests,
                    t.total_monthly_cost,
                    t.total_annual_cost,
                    t.total_monthly_consumption,
                    t.total_annual_consumption,
                    t.cost_per_test,
                    snapshot.utilization.utilization_percentage,
                    snapshot.utilization.capacity_exceeded,
                    snapshot.rentability.roi_percentage,
                    snapshot.rentability.payback_months,
                    utilization_json,
                    rentability_json,
                    warnings_json,
                    recommendations_json,
                    snapshot.calculated_at,
                    next,
                    bc_id,
                    expected_version,
                ],
            )?,
        };

        if rows == 0 {
            let actual = Self::current_version_tx(conn, bc_id)?;
            return Err(RepositoryError::SnapshotVersionConflict {
                business_case_id: bc_id.to_string(),
                expected,
                actual,
            });
        }
        Ok(next)
    }

    pub fn find_by_case_tx(
        conn: &Connection,
        business_case_id: &str,
    ) -> RepositoryResult<Option<CalculationSnapshot>> {
        let snapshot = conn
            .query_row(
                r#"
                SELECT business_case_id, calculation_mode,
                       total_monthly_tests, total_annual_tests,
                       total_monthly_cost, total_annual_cost,
                       total_monthly_consumption, total_annual_consumption,
                       cost_per_test,
                       utilization_json, rentability_json, warnings_json, recommendations_json,
                       calculated_at, calculation_version
                FROM bc_calculations WHERE business_case_id = ?1
                "#,
                params![business_case_id],
                |row| {
                    let mode: String = row.get(1)?;
                    Ok(CalculationSnapshot {
                        business_case_id: row.get(0)?,
                        calculation_mode: parse_enum_column(1, &mode, CalculationMode::parse)?,
                        totals: CalculationTotals {
                            total_monthly_tests: row.get(2)?,
                            total_annual_tests: row.get(3)?,
                            total_monthly_cost: row.get(4)?,
                            total_annual_cost: row.get(5)?,
                            total_monthly_consumption: row.get(6)?,
                            total_annual_consumption: row.get(7)?,
                            cost_per_test: row.get(8)?,
                        },
                        utilization: json_column::<UtilizationReport>(9, row.get(9)?)?,
                        rentability: json_column::<RentabilityReport>(10, row.get(10)?)?,
                        warnings: json_column::<Vec<CalculationWarning>>(11, row.get(11)?)?,
                        recommendations: json_column::<Vec<Recommendation>>(12, row.get(12)?)?,
                        calculated_at: row.get(13)?,
                        calculation_version: row.get(14)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}

fn json_column<T: DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::types::UtilizationStatus;
    use crate::repository::current_timestamp;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let now = current_timestamp();
        conn.execute(
            r#"INSERT INTO bc_master (id, client_name, purchase_type, duration_years,
                target_margin_percentage, stage, created_by, created_at, updated_at)
               VALUES ('bc-1', '客户', 'comodato_publico', 3, 25.0, 'draft', 'tester', ?1, ?1)"#,
            params![now],
        )
        .unwrap();
        conn
    }

    fn snapshot(version: i64) -> CalculationSnapshot {
        CalculationSnapshot {
            business_case_id: "bc-1".to_string(),
            calculation_mode: CalculationMode::Monthly,
            totals: CalculationTotals::default(),
            utilization: UtilizationReport {
                equipment_id: "eq-1".to_string(),
                max_daily_capacity: 800.0,
                max_monthly_capacity: 17_600.0,
                monthly_tests: 0.0,
                utilization_percentage: 0.0,
                capacity_exceeded: false,
                available_capacity: 17_600.0,
                status: UtilizationStatus::Underutilized,
                capacity_estimated: false,
            },
            rentability: RentabilityReport {
                equipment_cost: 0.0,
                one_time_investments: 0.0,
                total_investment: 0.0,
                annual_operating_cost: 0.0,
                monthly_cost: 0.0,
                monthly_revenue: 0.0,
                monthly_margin: 0.0,
                annual_revenue: 0.0,
                annual_margin: 0.0,
                roi_percentage: 0.0,
                payback_months: None,
                target_margin_percentage: 25.0,
            },
            warnings: Vec::new(),
            recommendations: Vec::new(),
            calculated_at: current_timestamp(),
            calculation_version: version,
        }
    }

    #[test]
    fn test_versions_strictly_increase() {
        let conn = setup();
        assert_eq!(CalculationRepository::current_version_tx(&conn, "bc-1").unwrap(), None);

        let v1 = CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(1), None).unwrap();
        assert_eq!(v1, 1);
        let v2 = CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(2), Some(1)).unwrap();
        assert_eq!(v2, 2);

        let stored = CalculationRepository::find_by_case_tx(&conn, "bc-1").unwrap().unwrap();
        assert_eq!(stored.calculation_version, 2);
        assert_eq!(stored.utilization.max_monthly_capacity, 17_600.0);
    }

    #[test]
    fn test_stale_writer_loses() {
        let conn = setup();
        CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(1), None).unwrap();

        // 另一写入者基于同一起点（None）写入
        let err = CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(1), None).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::SnapshotVersionConflict { actual: Some(1), .. }
        ));

        CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(2), Some(1)).unwrap();
        let err = CalculationRepository::write_snapshot_cas_tx(&conn, &snapshot(2), Some(1)).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::SnapshotVersionConflict { actual: Some(2), .. }
        ));
    }
}
