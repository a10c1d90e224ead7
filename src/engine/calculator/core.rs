// ==========================================
// 商业案例计算引擎 - 案例计算器
// ==========================================
// 主例程（单事务）:
// 1. 读取案例/经济数据，确定计算模式
// 2. 校验前置条件: 恰好一个主设备 + 至少一个测定项
// 3. 逐测定项选择公式并解析变量（顺序，可能查表）
// 4. 扇出求值消耗与成本，写回逐行结果
// 5. 汇总 -> 利用率 -> 借用回报 -> 提示/建议
// 6. 以 calculation_version 做 CAS 写入快照
// ==========================================

use super::advisories::{build_recommendations, build_warnings};
use super::determination::{build_context, into_calculation, owner};
use super::fanout::{evaluate_lines, PreparedFormula, PreparedLine};
use super::rentability::compute_rentability;
use super::totals::{compute_totals, LineAmounts};
use super::utilization::compute_utilization;
use crate::config::{EngineConfig, EngineConfigReader};
use crate::domain::business_case::BusinessCase;
use crate::domain::calculation::{
    BusinessCaseCalculation, CalculationSnapshot, DeterminationCalculation,
    DeterminationLineResult, RentabilityReport, UtilizationReport,
};
use crate::domain::determination::{CatalogDetermination, Equipment, Quantities};
use crate::domain::investment::InvestmentTotals;
use crate::domain::types::{CalculationKind, CalculationMode};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::formula::{FormulaContext, FormulaEvaluator, LookupSource};
use crate::engine::formula_policy::FormulaPolicy;
use crate::repository::error::RepositoryError;
use crate::repository::{
    current_timestamp, BcDeterminationRepository, BusinessCaseRepository, CalculationRepository,
    EquipmentSelectionRepository, InvestmentRepository, ReferenceDataRepository,
    SqliteLookupSource,
};
use rusqlite::Connection;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ==========================================
// BusinessCaseCalculator - 案例计算器
// ==========================================
pub struct BusinessCaseCalculator {
    conn: Arc<Mutex<Connection>>,
    config: Arc<dyn EngineConfigReader>,
}

impl BusinessCaseCalculator {
    /// 创建计算器
    ///
    /// # 参数
    /// - `conn`: 共享数据库连接
    /// - `config`: 引擎配置读取器
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<dyn EngineConfigReader>) -> Self {
        Self { conn, config }
    }

    fn get_conn(&self) -> EngineResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()).into())
    }

    /// 配置快照必须在获取连接锁之前读取（配置管理器共用同一连接）
    fn load_config(&self) -> EngineResult<EngineConfig> {
        Ok(EngineConfig::load(self.config.as_ref())?)
    }

    // ==========================================
    // 单测定项
    // ==========================================

    /// 计算单测定项消耗
    pub fn calculate_determination_consumption(
        &self,
        determination_id: &str,
        equipment_id: Option<&str>,
        quantity: i64,
        extra_context: &FormulaContext,
    ) -> EngineResult<DeterminationCalculation> {
        let conn = self.get_conn()?;
        Self::calculate_determination_tx(
            &conn,
            CalculationKind::Consumption,
            determination_id,
            equipment_id,
            quantity,
            extra_context,
        )
    }

    /// 计算单测定项成本
    pub fn calculate_determination_cost(
        &self,
        determination_id: &str,
        equipment_id: Option<&str>,
        quantity: i64,
        extra_context: &FormulaContext,
    ) -> EngineResult<DeterminationCalculation> {
        let conn = self.get_conn()?;
        Self::calculate_determination_tx(
            &conn,
            CalculationKind::Cost,
            determination_id,
            equipment_id,
            quantity,
            extra_context,
        )
    }

    /// 计算单测定项指定类别（事务内）
    ///
    /// # 返回
    /// - Err(NotFound): 目录测定项不存在
    /// - Err(Formula): 公式解码/变量解析/求值失败
    pub fn calculate_determination_tx(
        conn: &Connection,
        kind: CalculationKind,
        determination_id: &str,
        equipment_id: Option<&str>,
        quantity: i64,
        extra_context: &FormulaContext,
    ) -> EngineResult<DeterminationCalculation> {
        let determination = ReferenceDataRepository::get_determination_tx(conn, determination_id)?;
        let equipment = match equipment_id {
            Some(id) => ReferenceDataRepository::find_equipment_tx(conn, id)?,
            None => None,
        };

        let applicable = FormulaPolicy::select(&determination, equipment.as_ref(), kind)?;
        let context = build_context(&determination, equipment_id, quantity, extra_context);
        let lookup = SqliteLookupSource::new(conn);
        let execution = FormulaEvaluator::new()
            .execute(&applicable.formula, &context, &lookup)
            .map_err(|e| EngineError::formula(owner(determination_id, kind), e))?;

        debug!(
            determination_id = determination_id,
            kind = %kind,
            origin = %applicable.origin,
            "测定项计算完成"
        );
        into_calculation(
            determination_id,
            kind,
            &applicable,
            execution.value,
            &execution.variables,
        )
    }

    // ==========================================
    // 利用率 / 回报
    // ==========================================

    /// 计算设备利用率
    ///
    /// # 参数
    /// - `equipment_id`: 设备
    /// - `monthly_tests`: 月度测试总量
    pub fn calculate_equipment_utilization(
        &self,
        equipment_id: &str,
        monthly_tests: f64,
    ) -> EngineResult<UtilizationReport> {
        let config = self.load_config()?;
        let conn = self.get_conn()?;
        Self::calculate_equipment_utilization_tx(&conn, &config, equipment_id, monthly_tests)
    }

    pub fn calculate_equipment_utilization_tx(
        conn: &Connection,
        config: &EngineConfig,
        equipment_id: &str,
        monthly_tests: f64,
    ) -> EngineResult<UtilizationReport> {
        let equipment = ReferenceDataRepository::get_equipment_tx(conn, equipment_id)?;
        compute_utilization(&equipment, monthly_tests, config)
    }

    /// 计算借用回报
    ///
    /// # 参数
    /// - `bc_id`: 案例
    /// - `annual_operating_cost_base`: 年度基础运营成本
    pub fn calculate_comodato_rentability(
        &self,
        bc_id: &str,
        annual_operating_cost_base: f64,
    ) -> EngineResult<RentabilityReport> {
        let conn = self.get_conn()?;
        Self::calculate_comodato_rentability_tx(&conn, bc_id, annual_operating_cost_base)
    }

    pub fn calculate_comodato_rentability_tx(
        conn: &Connection,
        bc_id: &str,
        annual_operating_cost_base: f64,
    ) -> EngineResult<RentabilityReport> {
        let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
        rentability_for(conn, &bc, annual_operating_cost_base)
    }

    // ==========================================
    // 整案计算
    // ==========================================

    /// 整案计算（独立事务）
    pub fn calculate_business_case(&self, bc_id: &str) -> EngineResult<BusinessCaseCalculation> {
        self.calculate_business_case_with_cancel(bc_id, &AtomicBool::new(false))
    }

    /// 整案计算，支持协作式取消
    pub fn calculate_business_case_with_cancel(
        &self,
        bc_id: &str,
        cancel: &AtomicBool,
    ) -> EngineResult<BusinessCaseCalculation> {
        let config = self.load_config()?;
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let calculation = Self::calculate_business_case_tx(&tx, &config, bc_id, cancel)?;
        tx.commit()?;
        Ok(calculation)
    }

    /// 整案计算主例程（事务内）
    ///
    /// # 返回
    /// - Err(MissingPrerequisite): 主设备不唯一或没有测定项
    /// - Err(ConcurrentRecalculation): 快照已被并发更新
    /// - Err(Cancelled): 求值过程中被取消
    pub fn calculate_business_case_tx(
        conn: &Connection,
        config: &EngineConfig,
        bc_id: &str,
        cancel: &AtomicBool,
    ) -> EngineResult<BusinessCaseCalculation> {
        let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
        let economic = BusinessCaseRepository::find_economic_data_tx(conn, bc_id)?;
        let mode = economic
            .as_ref()
            .map(|e| e.effective_mode(bc.purchase_type))
            .unwrap_or_else(|| bc.purchase_type.default_calculation_mode());

        let primaries = EquipmentSelectionRepository::list_primary_tx(conn, bc_id)?;
        if primaries.len() != 1 {
            return Err(EngineError::missing_prerequisite(
                bc_id,
                format!("需要且仅需要一个主设备: 当前 {} 个", primaries.len()),
            ));
        }
        let equipment = ReferenceDataRepository::get_equipment_tx(conn, &primaries[0].equipment_id)?;

        let rows = BcDeterminationRepository::list_by_case_tx(conn, bc_id)?;
        if rows.is_empty() {
            return Err(EngineError::missing_prerequisite(bc_id, "案例没有任何测定项"));
        }

        let expected_version = CalculationRepository::current_version_tx(conn, bc_id)?;

        // ----- 阶段一: 公式选择与变量解析（顺序） -----
        let lookup = SqliteLookupSource::new(conn);
        let mut prepared = Vec::with_capacity(rows.len());
        for row in &rows {
            let determination =
                ReferenceDataRepository::get_determination_tx(conn, &row.determination_id)?;
            let quantity = match mode {
                CalculationMode::Monthly => row.monthly_quantity,
                CalculationMode::Annual => row.annual_quantity,
            };
            let mut extra = FormulaContext::new();
            extra.insert("monthly_quantity".into(), json!(row.monthly_quantity));
            extra.insert("annual_quantity".into(), json!(row.annual_quantity));
            let context = build_context(&determination, Some(&equipment.id), quantity, &extra);

            prepared.push(PreparedLine {
                determination_id: row.determination_id.clone(),
                quantities: Quantities {
                    monthly: row.monthly_quantity,
                    annual: row.annual_quantity,
                },
                consumption: prepare(
                    &determination,
                    &equipment,
                    CalculationKind::Consumption,
                    &context,
                    &lookup,
                )?,
                cost: prepare(&determination, &equipment, CalculationKind::Cost, &context, &lookup)?,
            });
        }

        // ----- 阶段二: 扇出求值（纯计算） -----
        let evaluated = evaluate_lines(bc_id, &prepared, cancel)?;

        // ----- 逐行写回 -----
        let mut lines = Vec::with_capacity(prepared.len());
        let mut amounts = Vec::with_capacity(prepared.len());
        for (line, values) in prepared.iter().zip(evaluated.iter()) {
            let consumption = into_calculation(
                &line.determination_id,
                CalculationKind::Consumption,
                &line.consumption.applicable,
                values.consumption,
                &line.consumption.scope,
            )?;
            let cost = into_calculation(
                &line.determination_id,
                CalculationKind::Cost,
                &line.cost.applicable,
                values.cost,
                &line.cost.scope,
            )?;

            let details = json!({ "consumption": &consumption, "cost": &cost });
            BcDeterminationRepository::update_calculation_tx(
                conn,
                bc_id,
                &line.determination_id,
                consumption.value,
                cost.value,
                &details,
            )?;

            amounts.push(LineAmounts {
                quantities: line.quantities,
                consumption: values.consumption,
                cost: values.cost,
            });
            lines.push(DeterminationLineResult {
                determination_id: line.determination_id.clone(),
                monthly_quantity: line.quantities.monthly,
                annual_quantity: line.quantities.annual,
                consumption,
                cost,
            });
        }

        // ----- 汇总与分析 -----
        let totals = compute_totals(bc_id, mode, &amounts)?;
        let utilization = compute_utilization(&equipment, totals.total_monthly_tests, config)?;
        let rentability = rentability_for(conn, &bc, totals.total_annual_cost)?;
        let warnings = build_warnings(&utilization, totals.cost_per_test, config);
        let recommendations = build_recommendations(&totals, config);

        let snapshot = CalculationSnapshot {
            business_case_id: bc_id.to_string(),
            calculation_mode: mode,
            totals,
            utilization,
            rentability,
            warnings,
            recommendations,
            calculated_at: current_timestamp(),
            calculation_version: expected_version.unwrap_or(0) + 1,
        };
        let version = CalculationRepository::write_snapshot_cas_tx(conn, &snapshot, expected_version)?;

        info!(
            bc_id = bc_id,
            mode = %mode,
            lines = lines.len(),
            calculation_version = version,
            utilization_pct = snapshot.utilization.utilization_percentage,
            roi_pct = snapshot.rentability.roi_percentage,
            "案例计算完成"
        );

        Ok(BusinessCaseCalculation { snapshot, lines })
    }
}

// ==========================================
// 内部辅助
// ==========================================

fn prepare(
    determination: &CatalogDetermination,
    equipment: &Equipment,
    kind: CalculationKind,
    context: &FormulaContext,
    lookup: &dyn LookupSource,
) -> EngineResult<PreparedFormula> {
    let applicable = FormulaPolicy::select(determination, Some(equipment), kind)?;
    let scope = FormulaEvaluator::new()
        .resolve_scope(&applicable.formula, context, lookup)
        .map_err(|e| EngineError::formula(owner(&determination.id, kind), e))?;
    Ok(PreparedFormula { applicable, scope })
}

fn rentability_for(
    conn: &Connection,
    bc: &BusinessCase,
    annual_operating_cost_base: f64,
) -> EngineResult<RentabilityReport> {
    let equipment_cost = BusinessCaseRepository::find_economic_data_tx(conn, &bc.id)?
        .map(|e| e.equipment_cost)
        .unwrap_or(0.0);
    let investments = InvestmentRepository::list_by_case_tx(conn, &bc.id)?;
    compute_rentability(
        &bc.id,
        bc.duration_years,
        bc.target_margin_percentage,
        equipment_cost,
        &InvestmentTotals::from_investments(&investments),
        annual_operating_cost_base,
    )
}
