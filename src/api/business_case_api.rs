// ==========================================
// 商业案例计算引擎 - 商业案例 API
// ==========================================
// 职责: 入参校验 + 错误映射，转发到编排器
// 次级编辑: 设备选型 / 测定项 / 附加投资
//   编辑本身单事务提交，提交后触发尽力重算（失败只记日志）
// ==========================================

use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::business_case::{BusinessCase, EconomicData, NewBusinessCase};
use crate::domain::calculation::{
    BusinessCaseCalculation, CalculationSnapshot, CalculationTemplate,
};
use crate::domain::determination::{
    normalize_quantities, BcDetermination, Quantities, MAX_QUANTITY,
};
use crate::domain::investment::{Investment, InvestmentPatch, InvestmentTotals, NewInvestment};
use crate::domain::operational::{LisData, OperationalData};
use crate::domain::types::{CalculationKind, CalculationMode, Stage};
use crate::domain::validation::ValidationFinding;
use crate::domain::workflow::WorkflowHistoryEntry;
use crate::engine::calculator::BusinessCaseCalculator;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::formula::{FormulaContext, FormulaEvaluator, FormulaValidation};
use crate::engine::orchestrator::{ApprovalDecision, BusinessCaseOrchestrator, RecalculationOutcome};
use crate::repository::{
    BcDeterminationRepository, BusinessCaseRepository, CalculationRepository,
    CalculationTemplateRepository, EquipmentSelectionRepository, InvestmentRepository,
    ReferenceDataRepository, SqliteLookupSource, ValidationRepository,
};

// ==========================================
// 请求/响应 DTO
// ==========================================

/// 测定项写入入参（月量/年量至少给一个，缺失一方自动推导）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeterminationInput {
    pub determination_id: String,
    pub monthly_quantity: Option<i64>,
    pub annual_quantity: Option<i64>,
    pub notes: Option<String>,
}

/// 设备选型结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentSelectionResult {
    pub business_case_id: String,
    pub equipment_id: String,
    /// 主设备变更时清除的测定项数量
    pub cleared_determinations: usize,
}

// ==========================================
// BusinessCaseApi - 商业案例 API
// ==========================================

/// 商业案例API
///
/// 职责：
/// 1. 主流程（创建、ROI、经济审批、运营重算、阶段推进）
/// 2. 次级编辑（设备、测定项、投资）及尽力重算
/// 3. 查询（快照、校验结果、历史、模板）与公式试算
pub struct BusinessCaseApi {
    orchestrator: Arc<BusinessCaseOrchestrator>,
    business_case_repo: Arc<BusinessCaseRepository>,
    determination_repo: Arc<BcDeterminationRepository>,
    investment_repo: Arc<InvestmentRepository>,
    calculation_repo: Arc<CalculationRepository>,
    validation_repo: Arc<ValidationRepository>,
    template_repo: Arc<CalculationTemplateRepository>,
}

impl BusinessCaseApi {
    /// 创建新的BusinessCaseApi实例
    pub fn new(
        orchestrator: Arc<BusinessCaseOrchestrator>,
        business_case_repo: Arc<BusinessCaseRepository>,
        determination_repo: Arc<BcDeterminationRepository>,
        investment_repo: Arc<InvestmentRepository>,
        calculation_repo: Arc<CalculationRepository>,
        validation_repo: Arc<ValidationRepository>,
        template_repo: Arc<CalculationTemplateRepository>,
    ) -> Self {
        Self {
            orchestrator,
            business_case_repo,
            determination_repo,
            investment_repo,
            calculation_repo,
            validation_repo,
            template_repo,
        }
    }

    // ==========================================
    // 主流程
    // ==========================================

    /// 创建经济案例
    ///
    /// # 返回
    /// - Ok(BusinessCase): 新案例（draft）
    /// - Err(ApiError::InvalidInput): 入参不合法
    /// - Err(ApiError::NotFound): 指定设备不存在
    pub fn create_business_case(&self, input: &NewBusinessCase) -> ApiResult<BusinessCase> {
        Ok(self.orchestrator.create_economic_bc(input)?)
    }

    /// 查询案例主档
    pub fn get_business_case(&self, bc_id: &str) -> ApiResult<BusinessCase> {
        require_id("bc_id", bc_id)?;
        self.business_case_repo
            .find_by_id(bc_id)?
            .ok_or_else(|| ApiError::NotFound(format!("BusinessCase(id={})不存在", bc_id)))
    }

    /// 查询案例经济数据
    pub fn get_economic_data(&self, bc_id: &str) -> ApiResult<Option<EconomicData>> {
        require_id("bc_id", bc_id)?;
        Ok(self.business_case_repo.find_economic_data(bc_id)?)
    }

    /// 计算初始 ROI（写回主档）
    pub fn calculate_roi(&self, bc_id: &str) -> ApiResult<BusinessCaseCalculation> {
        require_id("bc_id", bc_id)?;
        Ok(self.orchestrator.calculate_initial_roi(bc_id)?)
    }

    /// 经济审批
    pub fn evaluate_approval(&self, bc_id: &str, user: &str) -> ApiResult<ApprovalDecision> {
        require_id("bc_id", bc_id)?;
        require_id("user", user)?;
        Ok(self.orchestrator.evaluate_economic_approval(bc_id, user)?)
    }

    /// 写入运营数据
    pub fn attach_operational_data(&self, bc_id: &str, data: &OperationalData) -> ApiResult<()> {
        require_id("bc_id", bc_id)?;
        Ok(self.orchestrator.attach_operational_data(bc_id, data)?)
    }

    /// 写入 LIS 数据
    pub fn attach_lis_data(&self, bc_id: &str, data: &LisData) -> ApiResult<()> {
        require_id("bc_id", bc_id)?;
        Ok(self.orchestrator.attach_lis_data(bc_id, data)?)
    }

    /// 运营数据重算（产能调整 + 计算 + 校验 + 阶段迁移）
    pub fn recalculate(&self, bc_id: &str, user: &str) -> ApiResult<RecalculationOutcome> {
        require_id("bc_id", bc_id)?;
        require_id("user", user)?;
        Ok(self.orchestrator.recalculate_with_operational_data(bc_id, user)?)
    }

    /// 手动推进阶段
    ///
    /// # 参数
    /// - stage: 目标阶段（snake_case 文本，如 "pending_technical_review"）
    pub fn promote_stage(
        &self,
        bc_id: &str,
        stage: &str,
        user: &str,
        notes: Option<&str>,
    ) -> ApiResult<BusinessCase> {
        require_id("bc_id", bc_id)?;
        require_id("user", user)?;
        let target = Stage::parse(stage.trim())
            .ok_or_else(|| ApiError::InvalidInput(format!("未知阶段: {}", stage)))?;
        Ok(self.orchestrator.promote_stage(bc_id, target, user, notes)?)
    }

    // ==========================================
    // 设备选型
    // ==========================================

    /// 选择主设备
    ///
    /// 主设备变更时清空案例测定项（按旧设备计算的结果失效）
    #[instrument(skip(self))]
    pub fn select_equipment(
        &self,
        bc_id: &str,
        equipment_id: &str,
    ) -> ApiResult<EquipmentSelectionResult> {
        require_id("bc_id", bc_id)?;
        require_id("equipment_id", equipment_id)?;

        let cleared = self.orchestrator.in_transaction(|conn, _| {
            BusinessCaseRepository::get_tx(conn, bc_id)?;
            let equipment = ReferenceDataRepository::get_equipment_tx(conn, equipment_id)?;

            let previous = EquipmentSelectionRepository::list_primary_tx(conn, bc_id)?;
            let changed = previous.iter().any(|s| s.equipment_id != equipment.id);
            let cleared = if changed {
                BcDeterminationRepository::delete_all_for_case_tx(conn, bc_id)?
            } else {
                0
            };

            EquipmentSelectionRepository::set_primary_tx(conn, bc_id, &equipment.id)?;
            BusinessCaseRepository::update_economic_equipment_tx(
                conn,
                bc_id,
                &equipment.id,
                Some(&equipment.name),
            )?;
            Ok(cleared)
        })?;

        info!(
            bc_id = bc_id,
            equipment_id = equipment_id,
            cleared_determinations = cleared,
            "主设备已选择"
        );
        self.orchestrator
            .trigger_recalculation(bc_id, "equipment_selected");

        Ok(EquipmentSelectionResult {
            business_case_id: bc_id.to_string(),
            equipment_id: equipment_id.to_string(),
            cleared_determinations: cleared,
        })
    }

    // ==========================================
    // 测定项
    // ==========================================

    /// 列出案例测定项
    pub fn list_determinations(&self, bc_id: &str) -> ApiResult<Vec<BcDetermination>> {
        require_id("bc_id", bc_id)?;
        Ok(self.determination_repo.list_by_case(bc_id)?)
    }

    /// 新增测定项（已存在时覆盖数量）
    ///
    /// # 返回
    /// - Err(ApiError::PreconditionFailed): 尚未选择主设备
    #[instrument(skip(self, input), fields(determination_id = %input.determination_id))]
    pub fn add_determination(
        &self,
        bc_id: &str,
        input: &DeterminationInput,
    ) -> ApiResult<BcDetermination> {
        require_id("bc_id", bc_id)?;
        let quantities = check_determination_input(input)?;

        let line = self
            .orchestrator
            .in_transaction(|conn, _| write_determination_tx(conn, bc_id, input, quantities))?;

        self.orchestrator
            .trigger_recalculation(bc_id, "determination_added");
        Ok(line)
    }

    /// 修改测定项数量
    ///
    /// # 返回
    /// - Err(ApiError::NotFound): 案例中没有该测定项
    #[instrument(skip(self, input), fields(determination_id = %input.determination_id))]
    pub fn update_determination(
        &self,
        bc_id: &str,
        input: &DeterminationInput,
    ) -> ApiResult<BcDetermination> {
        require_id("bc_id", bc_id)?;
        let quantities = check_determination_input(input)?;

        let line = self.orchestrator.in_transaction(|conn, _| {
            if BcDeterminationRepository::find_tx(conn, bc_id, &input.determination_id)?.is_none() {
                return Err(EngineError::not_found(
                    "BcDetermination",
                    input.determination_id.clone(),
                ));
            }
            write_determination_tx(conn, bc_id, input, quantities)
        })?;

        self.orchestrator
            .trigger_recalculation(bc_id, "determination_updated");
        Ok(line)
    }

    /// 删除测定项
    pub fn remove_determination(&self, bc_id: &str, determination_id: &str) -> ApiResult<()> {
        require_id("bc_id", bc_id)?;
        require_id("determination_id", determination_id)?;

        self.orchestrator.in_transaction(|conn, _| {
            let rows = BcDeterminationRepository::delete_tx(conn, bc_id, determination_id)?;
            if rows == 0 {
                return Err(EngineError::not_found("BcDetermination", determination_id));
            }
            Ok(())
        })?;

        info!(bc_id = bc_id, determination_id = determination_id, "测定项已删除");
        self.orchestrator
            .trigger_recalculation(bc_id, "determination_removed");
        Ok(())
    }

    // ==========================================
    // 附加投资
    // ==========================================

    /// 列出案例投资
    pub fn list_investments(&self, bc_id: &str) -> ApiResult<Vec<Investment>> {
        require_id("bc_id", bc_id)?;
        Ok(self.investment_repo.list_by_case(bc_id)?)
    }

    /// 按投资类型汇总
    pub fn investment_totals(&self, bc_id: &str) -> ApiResult<InvestmentTotals> {
        let items = self.list_investments(bc_id)?;
        Ok(InvestmentTotals::from_investments(&items))
    }

    /// 新增投资
    pub fn add_investment(&self, bc_id: &str, input: &NewInvestment) -> ApiResult<Investment> {
        require_id("bc_id", bc_id)?;
        check_concept(&input.concept)?;
        check_amount(input.amount)?;

        let investment = self.orchestrator.in_transaction(|conn, _| {
            BusinessCaseRepository::get_tx(conn, bc_id)?;
            Ok(InvestmentRepository::insert_tx(conn, bc_id, input)?)
        })?;

        info!(
            bc_id = bc_id,
            investment_id = %investment.id,
            investment_type = %investment.investment_type,
            amount = investment.amount,
            "附加投资已新增"
        );
        self.orchestrator
            .trigger_recalculation(bc_id, "investment_added");
        Ok(investment)
    }

    /// 修改投资（None 字段保持原值）
    pub fn update_investment(
        &self,
        investment_id: &str,
        patch: &InvestmentPatch,
    ) -> ApiResult<Investment> {
        require_id("investment_id", investment_id)?;
        if let Some(concept) = &patch.concept {
            check_concept(concept)?;
        }
        if let Some(amount) = patch.amount {
            check_amount(amount)?;
        }

        let investment = self.orchestrator.in_transaction(|conn, _| {
            Ok(InvestmentRepository::update_tx(conn, investment_id, patch)?)
        })?;

        self.orchestrator
            .trigger_recalculation(&investment.business_case_id, "investment_updated");
        Ok(investment)
    }

    /// 删除投资
    pub fn delete_investment(&self, investment_id: &str) -> ApiResult<Investment> {
        require_id("investment_id", investment_id)?;

        let investment = self.orchestrator.in_transaction(|conn, _| {
            Ok(InvestmentRepository::delete_tx(conn, investment_id)?)
        })?;

        self.orchestrator
            .trigger_recalculation(&investment.business_case_id, "investment_deleted");
        Ok(investment)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 最新计算快照
    pub fn get_calculation(&self, bc_id: &str) -> ApiResult<Option<CalculationSnapshot>> {
        require_id("bc_id", bc_id)?;
        Ok(self.calculation_repo.find_by_case(bc_id)?)
    }

    /// 最近一次一致性校验的结果
    pub fn list_findings(&self, bc_id: &str) -> ApiResult<Vec<ValidationFinding>> {
        require_id("bc_id", bc_id)?;
        Ok(self.validation_repo.list_by_case(bc_id)?)
    }

    /// 工作流历史
    pub fn history(&self, bc_id: &str) -> ApiResult<Vec<WorkflowHistoryEntry>> {
        require_id("bc_id", bc_id)?;
        Ok(self.orchestrator.history(bc_id)?)
    }

    /// 启用的计算模板
    pub fn list_templates(&self, category: Option<&str>) -> ApiResult<Vec<CalculationTemplate>> {
        Ok(self.template_repo.list_active(category)?)
    }

    /// 公式试算（与生产一致的解析/求值路径，查表走真实数据库）
    ///
    /// 公式本身的错误体现在返回值中，不作为 Err
    pub fn validate_formula(
        &self,
        formula: &serde_json::Value,
        example_context: &FormulaContext,
    ) -> ApiResult<FormulaValidation> {
        let validation = self.orchestrator.in_transaction(|conn, _| {
            let lookup = SqliteLookupSource::new(conn);
            Ok(FormulaEvaluator::new().validate_formula(formula, example_context, &lookup))
        })?;
        Ok(validation)
    }
}

// ==========================================
// 内部辅助
// ==========================================

fn require_id(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}

fn check_concept(concept: &str) -> ApiResult<()> {
    if concept.trim().is_empty() {
        return Err(ApiError::InvalidInput("投资项目名称不能为空".to_string()));
    }
    Ok(())
}

fn check_amount(amount: f64) -> ApiResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ApiError::InvalidInput(format!("投资金额必须为非负数: {}", amount)));
    }
    Ok(())
}

fn check_determination_input(input: &DeterminationInput) -> ApiResult<Quantities> {
    require_id("determination_id", &input.determination_id)?;
    if input.monthly_quantity.is_none() && input.annual_quantity.is_none() {
        return Err(ApiError::InvalidInput(
            "月测试量与年测试量至少需要提供一个".to_string(),
        ));
    }
    for (field, value) in [
        ("monthly_quantity", input.monthly_quantity),
        ("annual_quantity", input.annual_quantity),
    ] {
        if let Some(v) = value {
            if v < 0 {
                return Err(ApiError::InvalidInput(format!("{}不能为负: {}", field, v)));
            }
            if v > MAX_QUANTITY {
                return Err(ApiError::InvalidInput(format!(
                    "{}超过上限{}: {}",
                    field, MAX_QUANTITY, v
                )));
            }
        }
    }
    normalize_quantities(input.monthly_quantity, input.annual_quantity)
        .ok_or_else(|| ApiError::InvalidInput("测试量换算溢出".to_string()))
}

/// 写入测定项并计算单行消耗/成本
///
/// 数量按案例计算模式取月量或年量，与主例程一致
fn write_determination_tx(
    conn: &Connection,
    bc_id: &str,
    input: &DeterminationInput,
    quantities: Quantities,
) -> EngineResult<BcDetermination> {
    let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
    let primary = EquipmentSelectionRepository::list_primary_tx(conn, bc_id)?
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::missing_prerequisite(bc_id, "请先选择主设备"))?;

    let mode = BusinessCaseRepository::find_economic_data_tx(conn, bc_id)?
        .map(|e| e.effective_mode(bc.purchase_type))
        .unwrap_or_else(|| bc.purchase_type.default_calculation_mode());
    let quantity = match mode {
        CalculationMode::Monthly => quantities.monthly,
        CalculationMode::Annual => quantities.annual,
    };

    let mut extra = FormulaContext::new();
    extra.insert("monthly_quantity".into(), serde_json::json!(quantities.monthly));
    extra.insert("annual_quantity".into(), serde_json::json!(quantities.annual));

    let consumption = BusinessCaseCalculator::calculate_determination_tx(
        conn,
        CalculationKind::Consumption,
        &input.determination_id,
        Some(&primary.equipment_id),
        quantity,
        &extra,
    )?;
    let cost = BusinessCaseCalculator::calculate_determination_tx(
        conn,
        CalculationKind::Cost,
        &input.determination_id,
        Some(&primary.equipment_id),
        quantity,
        &extra,
    )?;

    let details = serde_json::json!({ "consumption": &consumption, "cost": &cost });
    BcDeterminationRepository::upsert_tx(
        conn,
        bc_id,
        &input.determination_id,
        quantities,
        Some((consumption.value, cost.value, &details)),
        input.notes.as_deref(),
    )?;

    info!(
        bc_id = bc_id,
        determination_id = %input.determination_id,
        monthly = quantities.monthly,
        annual = quantities.annual,
        consumption = consumption.value,
        cost = cost.value,
        "测定项已写入"
    );

    BcDeterminationRepository::find_tx(conn, bc_id, &input.determination_id)?
        .ok_or_else(|| EngineError::not_found("BcDetermination", input.determination_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determination_input_requires_a_quantity() {
        let input = DeterminationInput {
            determination_id: "det-a".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_determination_input(&input),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_determination_input_normalizes_quantities() {
        let input = DeterminationInput {
            determination_id: "det-a".to_string(),
            annual_quantity: Some(1201),
            ..Default::default()
        };
        let q = check_determination_input(&input).unwrap();
        assert_eq!(q, Quantities { monthly: 101, annual: 1201 });

        let input = DeterminationInput {
            determination_id: "det-a".to_string(),
            monthly_quantity: Some(-1),
            ..Default::default()
        };
        assert!(check_determination_input(&input).is_err());
    }

    #[test]
    fn test_determination_input_rejects_oversized_quantities() {
        for (monthly, annual) in [(Some(i64::MAX / 10), None), (None, Some(i64::MAX))] {
            let input = DeterminationInput {
                determination_id: "det-a".to_string(),
                monthly_quantity: monthly,
                annual_quantity: annual,
                ..Default::default()
            };
            assert!(matches!(
                check_determination_input(&input),
                Err(ApiError::InvalidInput(_))
            ));
        }

        let input = DeterminationInput {
            determination_id: "det-a".to_string(),
            monthly_quantity: Some(MAX_QUANTITY),
            ..Default::default()
        };
        let q = check_determination_input(&input).unwrap();
        assert_eq!(q.annual, MAX_QUANTITY * 12);
    }

    #[test]
    fn test_investment_amount_validation() {
        assert!(check_amount(0.0).is_ok());
        assert!(check_amount(1500.5).is_ok());
        assert!(check_amount(-1.0).is_err());
        assert!(check_amount(f64::NAN).is_err());
        assert!(check_concept("  ").is_err());
    }
}
