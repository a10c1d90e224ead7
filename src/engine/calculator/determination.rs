// ==========================================
// 案例计算器 - 单测定项计算
// ==========================================
// 上下文: 测定项参数（空值记 0）+ quantity / monthly_quantity + ids
//         额外上下文最后覆盖
// ==========================================

use super::decimal::to_f64;
use crate::domain::calculation::{CalculationDetails, DeterminationCalculation};
use crate::domain::determination::CatalogDetermination;
use crate::domain::types::CalculationKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::formula::{decimal_to_f64, FormulaContext, ResolvedVariables};
use crate::engine::formula_policy::ApplicableFormula;
use crate::repository::current_timestamp;
use rust_decimal::Decimal;
use serde_json::{json, Value};

/// 构建测定项求值上下文
///
/// # 参数
/// - `determination`: 目录测定项
/// - `equipment_id`: 设备（可选）
/// - `quantity`: 当前模式下的测试量
/// - `extra`: 额外上下文（覆盖同名键）
pub(crate) fn build_context(
    determination: &CatalogDetermination,
    equipment_id: Option<&str>,
    quantity: i64,
    extra: &FormulaContext,
) -> FormulaContext {
    let mut context = FormulaContext::new();
    let zero_if_null = |v: Option<f64>| json!(v.unwrap_or(0.0));

    context.insert("volume_per_test".into(), zero_if_null(determination.volume_per_test));
    context.insert(
        "reagent_consumption".into(),
        zero_if_null(determination.reagent_consumption),
    );
    context.insert("processing_time".into(), zero_if_null(determination.processing_time));
    context.insert("wash_cycles".into(), zero_if_null(determination.wash_cycles));
    context.insert(
        "blank_required".into(),
        json!(if determination.blank_required { 1 } else { 0 }),
    );
    context.insert(
        "calibration_frequency".into(),
        zero_if_null(determination.calibration_frequency),
    );
    context.insert("cost_per_test".into(), zero_if_null(determination.cost_per_test));

    context.insert("determination_id".into(), json!(determination.id));
    context.insert(
        "equipment_id".into(),
        equipment_id.map(|id| json!(id)).unwrap_or(Value::Null),
    );
    context.insert("quantity".into(), json!(quantity));
    context.insert("monthly_quantity".into(), json!(quantity));

    context.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    context
}

/// 错误归属标识
pub(crate) fn owner(determination_id: &str, kind: CalculationKind) -> String {
    format!("determination:{}/{}", determination_id, kind)
}

fn default_unit(kind: CalculationKind) -> &'static str {
    match kind {
        CalculationKind::Consumption => "mL",
        CalculationKind::Cost => "USD",
    }
}

/// 组装单类别计算结果
pub(crate) fn into_calculation(
    determination_id: &str,
    kind: CalculationKind,
    applicable: &ApplicableFormula,
    value: Decimal,
    variables: &ResolvedVariables,
) -> EngineResult<DeterminationCalculation> {
    let formula = &applicable.formula;
    let value =
        decimal_to_f64(value).map_err(|e| EngineError::formula(owner(determination_id, kind), e))?;

    Ok(DeterminationCalculation {
        kind,
        value,
        unit: formula
            .unit
            .clone()
            .unwrap_or_else(|| default_unit(kind).to_string()),
        formula_type: formula.type_name().to_string(),
        formula_description: formula.description.clone(),
        origin: applicable.origin,
        calculated_at: current_timestamp(),
        details: CalculationDetails {
            formula_expression: formula.body_for_details(),
            variables_used: variables
                .iter()
                .map(|(name, v)| (name.clone(), to_f64(*v)))
                .collect(),
        },
    })
}
