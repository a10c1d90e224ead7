// ==========================================
// 案例计算器 - 借用回报分析
// ==========================================
// 总投资 = 设备成本 + 一次性投资
// 年运营成本 = 基础成本 + 月度周期投资×12 + 年度周期投资
// 月收入 = 月成本 / (1 - 目标毛利率)，毛利率不在 (0,1) 时按成本×1.25
// ROI% = (年毛利 × 年限 - 总投资) / 总投资 × 100，总投资为 0 时记 0
// 回收期 = ceil(总投资 / 月毛利)，月毛利 <= 0 时为空
// ==========================================

use super::decimal::{round_money, to_decimal, CheckedMath};
use crate::domain::calculation::RentabilityReport;
use crate::domain::investment::InvestmentTotals;
use crate::engine::error::EngineResult;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const MONTHS_PER_YEAR: i64 = 12;
const PAYBACK_DP: u32 = 6;

/// 计算借用回报
///
/// # 参数
/// - `bc_id`: 案例（用于溢出错误）
/// - `duration_years`: 合同年限
/// - `target_margin_percentage`: 目标毛利率（百分比）
/// - `equipment_cost`: 设备成本
/// - `investments`: 附加投资汇总
/// - `annual_operating_cost_base`: 年度基础运营成本（通常为年度总成本）
pub fn compute_rentability(
    bc_id: &str,
    duration_years: i32,
    target_margin_percentage: f64,
    equipment_cost: f64,
    investments: &InvestmentTotals,
    annual_operating_cost_base: f64,
) -> EngineResult<RentabilityReport> {
    let months = Decimal::from(MONTHS_PER_YEAR);
    let equipment = to_decimal("equipment_cost", equipment_cost)?;
    let one_time = to_decimal("one_time_investments", investments.one_time)?;
    let recurring_monthly = to_decimal("recurring_monthly", investments.recurring_monthly)?;
    let recurring_annual = to_decimal("recurring_annual", investments.recurring_annual)?;
    let base = to_decimal("annual_operating_cost", annual_operating_cost_base)?;
    let math = CheckedMath::new(bc_id);
    let margin_ratio = math.div(
        "target_margin_ratio",
        to_decimal("target_margin_percentage", target_margin_percentage)?,
        Decimal::ONE_HUNDRED,
    )?;

    let total_investment = math.add("total_investment", equipment, one_time)?;
    let recurring = math.mul("annual_operating_cost", recurring_monthly, months)?;
    let annual_operating_cost =
        math.sum("annual_operating_cost", [base, recurring, recurring_annual])?;
    let monthly_cost = math.div("monthly_cost", annual_operating_cost, months)?;

    let monthly_revenue = if margin_ratio > Decimal::ZERO && margin_ratio < Decimal::ONE {
        math.div("monthly_revenue", monthly_cost, Decimal::ONE - margin_ratio)?
    } else {
        math.mul("monthly_revenue", monthly_cost, Decimal::new(125, 2))?
    };
    let monthly_margin = math.sub("monthly_margin", monthly_revenue, monthly_cost)?;
    let annual_revenue = math.mul("annual_revenue", monthly_revenue, months)?;
    let annual_margin = math.mul("annual_margin", monthly_margin, months)?;

    let roi = if total_investment.is_zero() {
        Decimal::ZERO
    } else {
        let contract_margin = math.mul("roi", annual_margin, Decimal::from(duration_years))?;
        let net = math.sub("roi", contract_margin, total_investment)?;
        math.mul("roi", math.div("roi", net, total_investment)?, Decimal::ONE_HUNDRED)?
    };

    // 先取 6 位小数再向上取整，消除十进制除法尾差（如 15.000...001）
    let payback_months = if monthly_margin > Decimal::ZERO {
        math.div("payback_months", total_investment, monthly_margin)?
            .round_dp(PAYBACK_DP)
            .ceil()
            .to_i64()
    } else {
        None
    };

    Ok(RentabilityReport {
        equipment_cost: round_money(equipment),
        one_time_investments: round_money(one_time),
        total_investment: round_money(total_investment),
        annual_operating_cost: round_money(annual_operating_cost),
        monthly_cost: round_money(monthly_cost),
        monthly_revenue: round_money(monthly_revenue),
        monthly_margin: round_money(monthly_margin),
        annual_revenue: round_money(annual_revenue),
        annual_margin: round_money(annual_margin),
        roi_percentage: round_money(roi),
        payback_months,
        target_margin_percentage,
    })
}
