// ==========================================
// 案例计算器 - 汇总
// ==========================================
// 月度模式: 测试量 = Σ月量，成本/消耗 = Σ，年度 = ×12
// 年度模式: 测试量 = Σ年量，成本/消耗 = Σ（年度），月度 = /12（测试量取整）
// 单测成本 = 模式周期内成本 / 测试量（无测试时为 0）
// ==========================================

use super::decimal::{round_money, to_f64, CheckedMath};
use crate::domain::calculation::CalculationTotals;
use crate::domain::determination::Quantities;
use crate::domain::types::CalculationMode;
use crate::engine::error::EngineResult;
use rust_decimal::Decimal;

/// 单测定项的数量与计算值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    pub quantities: Quantities,
    pub consumption: Decimal,
    pub cost: Decimal,
}

/// 按计算模式汇总
///
/// # 返回
/// - Err(Overflow): 汇总或换算溢出
pub fn compute_totals(
    bc_id: &str,
    mode: CalculationMode,
    lines: &[LineAmounts],
) -> EngineResult<CalculationTotals> {
    let math = CheckedMath::new(bc_id);
    let months = Decimal::from(12);
    let consumption = math.sum("total_consumption", lines.iter().map(|l| l.consumption))?;
    let cost = math.sum("total_cost", lines.iter().map(|l| l.cost))?;

    let (monthly_tests, annual_tests, monthly_cost, annual_cost, monthly_consumption, annual_consumption, period_tests) =
        match mode {
            CalculationMode::Monthly => {
                let tests =
                    math.sum_tests("total_monthly_tests", lines.iter().map(|l| l.quantities.monthly))?;
                (
                    tests,
                    math.mul("total_annual_tests", tests, months)?,
                    cost,
                    math.mul("total_annual_cost", cost, months)?,
                    consumption,
                    math.mul("total_annual_consumption", consumption, months)?,
                    tests,
                )
            }
            CalculationMode::Annual => {
                let tests =
                    math.sum_tests("total_annual_tests", lines.iter().map(|l| l.quantities.annual))?;
                (
                    math.div("total_monthly_tests", tests, months)?.round(),
                    tests,
                    math.div("total_monthly_cost", cost, months)?,
                    cost,
                    math.div("total_monthly_consumption", consumption, months)?,
                    consumption,
                    tests,
                )
            }
        };

    let cost_per_test = if period_tests.is_zero() {
        Decimal::ZERO
    } else {
        math.div("cost_per_test", cost, period_tests)?
    };

    Ok(CalculationTotals {
        total_monthly_tests: to_f64(monthly_tests),
        total_annual_tests: to_f64(annual_tests),
        total_monthly_cost: round_money(monthly_cost),
        total_annual_cost: round_money(annual_cost),
        total_monthly_consumption: round_money(monthly_consumption),
        total_annual_consumption: round_money(annual_consumption),
        cost_per_test: round_money(cost_per_test),
    })
}
