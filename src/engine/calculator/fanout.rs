// ==========================================
// 案例计算器 - 公式求值扇出
// ==========================================
// 输入: 已完成变量解析的测定项（不再触碰存储）
// 执行: rayon par_iter，结果保持输入顺序
// 取消: 外部取消标志，协作式提前返回
// ==========================================

use super::determination::owner;
use crate::domain::determination::Quantities;
use crate::domain::types::CalculationKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::formula::{FormulaEvaluator, ResolvedVariables};
use crate::engine::formula_policy::ApplicableFormula;
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// 已解析作用域的单类别公式
#[derive(Debug, Clone)]
pub(crate) struct PreparedFormula {
    pub applicable: ApplicableFormula,
    pub scope: ResolvedVariables,
}

/// 待求值的测定项
#[derive(Debug, Clone)]
pub(crate) struct PreparedLine {
    pub determination_id: String,
    pub quantities: Quantities,
    pub consumption: PreparedFormula,
    pub cost: PreparedFormula,
}

/// 求值结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EvaluatedLine {
    pub consumption: Decimal,
    pub cost: Decimal,
}

/// 并行求值所有测定项
///
/// # 参数
/// - `bc_id`: 案例（用于取消错误）
/// - `lines`: 已准备的测定项
/// - `cancel`: 外部取消标志
///
/// # 返回
/// 与 `lines` 同序的求值结果
pub(crate) fn evaluate_lines(
    bc_id: &str,
    lines: &[PreparedLine],
    cancel: &AtomicBool,
) -> EngineResult<Vec<EvaluatedLine>> {
    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled(bc_id.to_string()));
    }

    let evaluator = FormulaEvaluator::new();
    debug!(bc_id = bc_id, lines = lines.len(), "公式求值扇出");

    lines
        .par_iter()
        .map(|line| {
            if cancel.load(Ordering::Relaxed) {
                return Err(EngineError::Cancelled(bc_id.to_string()));
            }
            evaluate_line(&evaluator, line)
        })
        .collect()
}

fn evaluate_line(evaluator: &FormulaEvaluator, line: &PreparedLine) -> EngineResult<EvaluatedLine> {
    let consumption = evaluator
        .evaluate(&line.consumption.applicable.formula, &line.consumption.scope)
        .map_err(|e| {
            EngineError::formula(owner(&line.determination_id, CalculationKind::Consumption), e)
        })?;
    let cost = evaluator
        .evaluate(&line.cost.applicable.formula, &line.cost.scope)
        .map_err(|e| EngineError::formula(owner(&line.determination_id, CalculationKind::Cost), e))?;
    Ok(EvaluatedLine { consumption, cost })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calculation::FormulaOrigin;
    use crate::engine::formula::Formula;
    use serde_json::json;

    fn prepared(expression: &str) -> PreparedFormula {
        PreparedFormula {
            applicable: ApplicableFormula {
                formula: Formula::from_value(&json!({"type": "expression", "expression": expression}))
                    .unwrap(),
                origin: FormulaOrigin::BuiltIn,
            },
            scope: ResolvedVariables::new(),
        }
    }

    fn line(id: &str, consumption: &str, cost: &str) -> PreparedLine {
        PreparedLine {
            determination_id: id.to_string(),
            quantities: Quantities { monthly: 1, annual: 12 },
            consumption: prepared(consumption),
            cost: prepared(cost),
        }
    }

    #[test]
    fn test_results_keep_input_order() {
        let lines: Vec<_> = (0..64)
            .map(|i| line(&format!("det-{}", i), &i.to_string(), &(i * 2).to_string()))
            .collect();
        let evaluated = evaluate_lines("bc-1", &lines, &AtomicBool::new(false)).unwrap();

        assert_eq!(evaluated.len(), 64);
        for (i, v) in evaluated.iter().enumerate() {
            assert_eq!(v.consumption, Decimal::from(i as i64));
            assert_eq!(v.cost, Decimal::from(i as i64 * 2));
        }
    }

    #[test]
    fn test_formula_error_names_failing_line() {
        let lines = vec![line("det-ok", "1", "2"), line("det-bad", "1", "1 / 0")];
        let err = evaluate_lines("bc-1", &lines, &AtomicBool::new(false)).unwrap_err();
        assert!(err.to_string().contains("det-bad"));
    }

    #[test]
    fn test_cancel_flag_stops_evaluation() {
        let lines = vec![line("det-1", "1", "2")];
        let err = evaluate_lines("bc-1", &lines, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(id) if id == "bc-1"));
    }
}
