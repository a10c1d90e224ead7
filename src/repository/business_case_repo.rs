// ==========================================
// 商业案例计算引擎 - 案例主档仓储
// ==========================================
// 表: bc_master + bc_economic_data
// 红线: Repository 不做业务逻辑,只做数据映射
// ==========================================

use crate::domain::business_case::{BusinessCase, ComputedEconomics, EconomicData};
use crate::domain::types::{CalculationMode, PurchaseType, RiskLevel, Stage};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{current_timestamp, parse_enum_column, parse_json_column};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    id, client_id, client_name, purchase_type, duration_years,
    target_margin_percentage, process_code, contract_object, stage, created_by,
    calculated_roi_percentage, calculated_payback_months,
    monthly_margin, annual_margin, monthly_revenue, annual_revenue,
    monthly_cost, annual_cost, total_investment, equipment_investment,
    economic_data_complete, operational_data_complete, lis_data_complete,
    has_inconsistencies, inconsistency_details, risk_level,
    created_at, updated_at
"#;

/// 完整性标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFlag {
    EconomicData,
    OperationalData,
    LisData,
}

impl CompletionFlag {
    fn column(&self) -> &'static str {
        match self {
            CompletionFlag::EconomicData => "economic_data_complete",
            CompletionFlag::OperationalData => "operational_data_complete",
            CompletionFlag::LisData => "lis_data_complete",
        }
    }
}

// ==========================================
// BusinessCaseRepository
// ==========================================
pub struct BusinessCaseRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BusinessCaseRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按ID查询案例
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<BusinessCase>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    /// 查询经济数据
    pub fn find_economic_data(&self, id: &str) -> RepositoryResult<Option<EconomicData>> {
        let conn = self.get_conn()?;
        Self::find_economic_data_tx(&conn, id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, bc: &BusinessCase) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO bc_master (
                id, client_id, client_name, purchase_type, duration_years,
                target_margin_percentage, process_code, contract_object, stage, created_by,
                economic_data_complete, operational_data_complete, lis_data_complete,
                has_inconsistencies, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                bc.id,
                bc.client_id,
                bc.client_name,
                bc.purchase_type.as_str(),
                bc.duration_years,
                bc.target_margin_percentage,
                bc.process_code,
                bc.contract_object,
                bc.stage.as_str(),
                bc.created_by,
                bc.economic_data_complete,
                bc.operational_data_complete,
                bc.lis_data_complete,
                bc.has_inconsistencies,
                bc.created_at,
                bc.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, id: &str) -> RepositoryResult<Option<BusinessCase>> {
        let sql = format!("SELECT {} FROM bc_master WHERE id = ?1", SELECT_COLUMNS);
        let bc = conn.query_row(&sql, params![id], map_row).optional()?;
        Ok(bc)
    }

    /// 按ID查询，不存在返回 NotFound
    pub fn get_tx(conn: &Connection, id: &str) -> RepositoryResult<BusinessCase> {
        Self::find_by_id_tx(conn, id)?.ok_or_else(|| RepositoryError::not_found("BusinessCase", id))
    }

    pub fn update_stage_tx(conn: &Connection, id: &str, stage: Stage) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE bc_master SET stage = ?1, updated_at = ?2 WHERE id = ?3",
            params![stage.as_str(), current_timestamp(), id],
        )?;
        ensure_updated(rows, id)
    }

    /// 写回计算结果，并标记经济数据完整
    pub fn update_computed_economics_tx(
        conn: &Connection,
        id: &str,
        economics: &ComputedEconomics,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE bc_master SET
                calculated_roi_percentage = ?1,
                calculated_payback_months = ?2,
                monthly_margin = ?3,
                annual_margin = ?4,
                monthly_revenue = ?5,
                annual_revenue = ?6,
                monthly_cost = ?7,
                annual_cost = ?8,
                total_investment = ?9,
                equipment_investment = ?10,
                economic_data_complete = 1,
                updated_at = ?11
            WHERE id = ?12
            "#,
            params![
                economics.roi_percentage,
                economics.payback_months,
                economics.monthly_margin,
                economics.annual_margin,
                economics.monthly_revenue,
                economics.annual_revenue,
                economics.monthly_cost,
                economics.annual_cost,
                economics.total_investment,
                economics.equipment_investment,
                current_timestamp(),
                id,
            ],
        )?;
        ensure_updated(rows, id)
    }

    pub fn set_flag_tx(
        conn: &Connection,
        id: &str,
        flag: CompletionFlag,
        value: bool,
    ) -> RepositoryResult<()> {
        // 列名来自固定枚举
        let sql = format!(
            "UPDATE bc_master SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            flag.column()
        );
        let rows = conn.execute(&sql, params![value, current_timestamp(), id])?;
        ensure_updated(rows, id)
    }

    /// 写入一致性校验摘要
    pub fn update_validation_summary_tx(
        conn: &Connection,
        id: &str,
        has_inconsistencies: bool,
        details: &serde_json::Value,
        risk_level: RiskLevel,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE bc_master SET
                has_inconsistencies = ?1,
                inconsistency_details = ?2,
                risk_level = ?3,
                updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                has_inconsistencies,
                details.to_string(),
                risk_level.as_str(),
                current_timestamp(),
                id,
            ],
        )?;
        ensure_updated(rows, id)
    }

    // ==========================================
    // 经济数据
    // ==========================================

    pub fn insert_economic_data_tx(conn: &Connection, data: &EconomicData) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO bc_economic_data (
                business_case_id, equipment_id, equipment_name, equipment_cost,
                calculation_mode, show_roi, show_margin
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                data.business_case_id,
                data.equipment_id,
                data.equipment_name,
                data.equipment_cost,
                data.calculation_mode.map(|m| m.as_str()),
                data.show_roi,
                data.show_margin,
            ],
        )?;
        Ok(())
    }

    pub fn find_economic_data_tx(
        conn: &Connection,
        id: &str,
    ) -> RepositoryResult<Option<EconomicData>> {
        let data = conn
            .query_row(
                r#"
                SELECT business_case_id, equipment_id, equipment_name, equipment_cost,
                       calculation_mode, show_roi, show_margin
                FROM bc_economic_data WHERE business_case_id = ?1
                "#,
                params![id],
                |row| {
                    let mode: Option<String> = row.get(4)?;
                    let calculation_mode = match mode {
                        Some(raw) => Some(parse_enum_column(4, &raw, CalculationMode::parse)?),
                        None => None,
                    };
                    Ok(EconomicData {
                        business_case_id: row.get(0)?,
                        equipment_id: row.get(1)?,
                        equipment_name: row.get(2)?,
                        equipment_cost: row.get(3)?,
                        calculation_mode,
                        show_roi: row.get(5)?,
                        show_margin: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(data)
    }

    /// 更新经济数据中的设备（选型变更时同步）
    pub fn update_economic_equipment_tx(
        conn: &Connection,
        id: &str,
        equipment_id: &str,
        equipment_name: Option<&str>,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE bc_economic_data
            SET equipment_id = ?1, equipment_name = COALESCE(?2, equipment_name)
            WHERE business_case_id = ?3
            "#,
            params![equipment_id, equipment_name, id],
        )?;
        Ok(())
    }
}

fn ensure_updated(rows: usize, id: &str) -> RepositoryResult<()> {
    if rows == 0 {
        return Err(RepositoryError::not_found("BusinessCase", id));
    }
    Ok(())
}

fn map_row(row: &Row) -> rusqlite::Result<BusinessCase> {
    let purchase_type: String = row.get(3)?;
    let stage: String = row.get(8)?;
    let risk_level: Option<String> = row.get(25)?;

    Ok(BusinessCase {
        id: row.get(0)?,
        client_id: row.get(1)?,
        client_name: row.get(2)?,
        purchase_type: parse_enum_column(3, &purchase_type, PurchaseType::parse)?,
        duration_years: row.get(4)?,
        target_margin_percentage: row.get(5)?,
        process_code: row.get(6)?,
        contract_object: row.get(7)?,
        stage: parse_enum_column(8, &stage, Stage::parse)?,
        created_by: row.get(9)?,
        calculated_roi_percentage: row.get(10)?,
        calculated_payback_months: row.get(11)?,
        monthly_margin: row.get(12)?,
        annual_margin: row.get(13)?,
        monthly_revenue: row.get(14)?,
        annual_revenue: row.get(15)?,
        monthly_cost: row.get(16)?,
        annual_cost: row.get(17)?,
        total_investment: row.get(18)?,
        equipment_investment: row.get(19)?,
        economic_data_complete: row.get(20)?,
        operational_data_complete: row.get(21)?,
        lis_data_complete: row.get(22)?,
        has_inconsistencies: row.get(23)?,
        inconsistency_details: parse_json_column(24, row.get(24)?)?,
        risk_level: match risk_level {
            Some(raw) => Some(parse_enum_column(25, &raw, RiskLevel::parse)?),
            None => None,
        },
        created_at: row.get(26)?,
        updated_at: row.get(27)?,
    })
}
