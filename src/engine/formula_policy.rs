// ==========================================
// 商业案例计算引擎 - 公式选择策略
// ==========================================
// 优先级:
// 1. 测定项 calculation_formula[kind]
// 2. 设备 default_calculation_formula[kind]（提供设备时）
// 3. 内置默认公式
// 类别仅支持 consumption / cost
// ==========================================

use crate::domain::calculation::FormulaOrigin;
use crate::domain::determination::{CatalogDetermination, Equipment};
use crate::domain::types::CalculationKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::formula::{Formula, FormulaError, VariableSpec};
use crate::repository::ReferenceDataRepository;
use rusqlite::Connection;
use serde_json::json;
use tracing::debug;

/// 选中的公式及其来源
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicableFormula {
    pub formula: Formula,
    pub origin: FormulaOrigin,
}

pub struct FormulaPolicy;

impl FormulaPolicy {
    /// 按优先级选择适用公式（读取参考数据）
    ///
    /// # 参数
    /// - `determination_id`: 目录测定项
    /// - `equipment_id`: 设备（可选）
    /// - `kind`: 计算类别字符串
    pub fn resolve_applicable_tx(
        conn: &Connection,
        determination_id: &str,
        equipment_id: Option<&str>,
        kind: &str,
    ) -> EngineResult<ApplicableFormula> {
        let kind = parse_kind(determination_id, kind)?;
        let determination = ReferenceDataRepository::find_determination_tx(conn, determination_id)?
            .ok_or_else(|| EngineError::not_found("CatalogDetermination", determination_id))?;
        let equipment = match equipment_id {
            Some(id) => ReferenceDataRepository::find_equipment_tx(conn, id)?,
            None => None,
        };
        Self::select(&determination, equipment.as_ref(), kind)
    }

    /// 在已加载的参考数据上选择公式
    pub fn select(
        determination: &CatalogDetermination,
        equipment: Option<&Equipment>,
        kind: CalculationKind,
    ) -> EngineResult<ApplicableFormula> {
        if let Some(value) = stored_formula(determination.calculation_formula.as_ref(), kind) {
            let formula = Formula::from_value(value).map_err(|e| {
                EngineError::formula(format!("determination:{}", determination.id), e)
            })?;
            debug!(determination_id = %determination.id, kind = %kind, "使用测定项专属公式");
            return Ok(ApplicableFormula {
                formula,
                origin: FormulaOrigin::Determination,
            });
        }

        if let Some(eq) = equipment {
            if let Some(value) = stored_formula(eq.default_calculation_formula.as_ref(), kind) {
                let formula = Formula::from_value(value)
                    .map_err(|e| EngineError::formula(format!("equipment:{}", eq.id), e))?;
                debug!(equipment_id = %eq.id, kind = %kind, "使用设备默认公式");
                return Ok(ApplicableFormula {
                    formula,
                    origin: FormulaOrigin::Equipment,
                });
            }
        }

        debug!(determination_id = %determination.id, kind = %kind, "使用内置默认公式");
        Ok(ApplicableFormula {
            formula: Self::built_in(kind),
            origin: FormulaOrigin::BuiltIn,
        })
    }

    /// 内置默认公式
    pub fn built_in(kind: CalculationKind) -> Formula {
        match kind {
            CalculationKind::Consumption => Formula::expression(
                "(volume_per_test + reagent_consumption + wash_cycles * 0.5) * quantity",
            )
            .with_variable(
                "volume_per_test",
                VariableSpec::path("catalog_determinations.volume_per_test").with_default(json!(0)),
            )
            .with_variable(
                "reagent_consumption",
                VariableSpec::path("catalog_determinations.reagent_consumption")
                    .with_default(json!(0)),
            )
            .with_variable(
                "wash_cycles",
                VariableSpec::path("catalog_determinations.wash_cycles").with_default(json!(0)),
            )
            .with_variable(
                "quantity",
                VariableSpec::path("bc_determinations.quantity").mark_required(),
            )
            .with_unit("mL")
            .with_description("标准消耗（含清洗）"),
            CalculationKind::Cost => Formula::expression("cost_per_test * quantity")
                .with_variable(
                    "cost_per_test",
                    VariableSpec::path("catalog_determinations.cost_per_test").mark_required(),
                )
                .with_variable(
                    "quantity",
                    VariableSpec::path("bc_determinations.quantity").mark_required(),
                )
                .with_unit("USD")
                .with_description("标准单价成本"),
        }
    }
}

pub(crate) fn parse_kind(owner: &str, kind: &str) -> EngineResult<CalculationKind> {
    CalculationKind::parse(kind).ok_or_else(|| {
        EngineError::formula(owner, FormulaError::UnknownCalculationKind(kind.to_string()))
    })
}

/// 取出按类别存储的公式文档（空值视为未配置）
fn stored_formula(map: Option<&serde_json::Value>, kind: CalculationKind) -> Option<&serde_json::Value> {
    map.and_then(|m| m.get(kind.as_str())).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::formula::{FormulaEvaluator, NoLookup};
    use crate::engine::formula::FormulaContext;
    use rust_decimal::Decimal;

    fn determination(formula: Option<serde_json::Value>) -> CatalogDetermination {
        CatalogDetermination {
            id: "det-1".to_string(),
            name: "葡萄糖".to_string(),
            volume_per_test: Some(2.0),
            reagent_consumption: Some(1.0),
            processing_time: None,
            wash_cycles: Some(2.0),
            blank_required: false,
            calibration_frequency: None,
            cost_per_test: Some(1.5),
            calculation_formula: formula,
        }
    }

    fn equipment(formula: Option<serde_json::Value>) -> Equipment {
        Equipment {
            id: "eq-1".to_string(),
            name: "分析仪".to_string(),
            capacity_per_hour: Some(100.0),
            max_daily_capacity: None,
            base_price: Some(50_000.0),
            default_calculation_formula: formula,
        }
    }

    #[test]
    fn test_determination_formula_wins() {
        let det = determination(Some(json!({
            "cost": {"type": "expression", "expression": "quantity * 2"}
        })));
        let eq = equipment(Some(json!({
            "cost": {"type": "expression", "expression": "quantity * 3"}
        })));
        let selected = FormulaPolicy::select(&det, Some(&eq), CalculationKind::Cost).unwrap();
        assert_eq!(selected.origin, FormulaOrigin::Determination);
    }

    #[test]
    fn test_falls_through_to_equipment_then_built_in() {
        // 测定项只定义了 consumption
        let det = determination(Some(json!({
            "consumption": {"type": "expression", "expression": "quantity"}
        })));
        let eq = equipment(Some(json!({
            "cost": {"type": "expression", "expression": "quantity * 3"}
        })));
        let selected = FormulaPolicy::select(&det, Some(&eq), CalculationKind::Cost).unwrap();
        assert_eq!(selected.origin, FormulaOrigin::Equipment);

        let selected = FormulaPolicy::select(&det, None, CalculationKind::Cost).unwrap();
        assert_eq!(selected.origin, FormulaOrigin::BuiltIn);
        assert_eq!(selected.formula.unit.as_deref(), Some("USD"));
    }

    #[test]
    fn test_undecodable_stored_formula_names_owner() {
        let det = determination(Some(json!({
            "cost": {"type": "spreadsheet", "expression": "1"}
        })));
        let err = FormulaPolicy::select(&det, None, CalculationKind::Cost).unwrap_err();
        match err {
            EngineError::Formula { owner, source } => {
                assert_eq!(owner, "determination:det-1");
                assert_eq!(source, FormulaError::UnknownFormulaType("spreadsheet".to_string()));
            }
            other => panic!("Expected Formula error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = parse_kind("det-1", "energy").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Formula {
                source: FormulaError::UnknownCalculationKind(_),
                ..
            }
        ));
    }

    #[test]
    fn test_built_in_consumption_evaluates() {
        let formula = FormulaPolicy::built_in(CalculationKind::Consumption);
        let mut ctx = FormulaContext::new();
        ctx.insert("volume_per_test".into(), json!(2.0));
        ctx.insert("reagent_consumption".into(), json!(1.0));
        ctx.insert("wash_cycles".into(), json!(2));
        ctx.insert("quantity".into(), json!(100));
        let result = FormulaEvaluator::new().execute(&formula, &ctx, &NoLookup).unwrap();
        // (2 + 1 + 2*0.5) * 100
        assert_eq!(result.value, Decimal::from(400));
    }

    #[test]
    fn test_built_in_cost_requires_quantity() {
        let formula = FormulaPolicy::built_in(CalculationKind::Cost);
        let mut ctx = FormulaContext::new();
        ctx.insert("cost_per_test".into(), json!(1.5));
        let err = FormulaEvaluator::new().execute(&formula, &ctx, &NoLookup).unwrap_err();
        assert_eq!(err, FormulaError::MissingRequiredVariable("quantity".to_string()));
    }
}
