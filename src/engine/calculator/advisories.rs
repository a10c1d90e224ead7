// ==========================================
// 案例计算器 - 提示与建议
// ==========================================
// 提示: capacity_exceeded(critical) / near_capacity_limit(warning)
//       underutilized(info) / high_cost_per_test(warning)
// 建议: volume_discount（月量大）/ annual_contract（年成本高）
// ==========================================

use crate::config::EngineConfig;
use crate::domain::calculation::{
    recommendation_types, warning_types, CalculationTotals, CalculationWarning, Recommendation,
    UtilizationReport,
};
use crate::domain::types::{AdvisorySeverity, UtilizationStatus};

const VOLUME_DISCOUNT_RATE: f64 = 0.05;
const ANNUAL_CONTRACT_RATE: f64 = 0.08;

/// 根据利用率与单测成本生成提示
pub fn build_warnings(
    utilization: &UtilizationReport,
    cost_per_test: f64,
    config: &EngineConfig,
) -> Vec<CalculationWarning> {
    let mut warnings = Vec::new();

    if utilization.capacity_exceeded {
        warnings.push(CalculationWarning {
            warning_type: warning_types::CAPACITY_EXCEEDED.to_string(),
            severity: AdvisorySeverity::Critical,
            message: format!(
                "设备产能超限: 利用率 {:.2}%",
                utilization.utilization_percentage
            ),
            recommendation: "考虑增加设备或更换更高通量的型号".to_string(),
        });
    } else if utilization.status == UtilizationStatus::Overload {
        // 分档已按未取整利用率判定: 过载阈值 < u <= 100
        warnings.push(CalculationWarning {
            warning_type: warning_types::NEAR_CAPACITY_LIMIT.to_string(),
            severity: AdvisorySeverity::Warning,
            message: format!(
                "设备接近产能上限: 利用率 {:.2}%",
                utilization.utilization_percentage
            ),
            recommendation: "关注增长趋势，提前规划扩容".to_string(),
        });
    } else if utilization.status == UtilizationStatus::Underutilized {
        warnings.push(CalculationWarning {
            warning_type: warning_types::UNDERUTILIZED.to_string(),
            severity: AdvisorySeverity::Info,
            message: format!(
                "设备利用率偏低: {:.2}%",
                utilization.utilization_percentage
            ),
            recommendation: "考虑更小型号或增加测定项".to_string(),
        });
    }

    if cost_per_test > config.high_cost_per_test {
        warnings.push(CalculationWarning {
            warning_type: warning_types::HIGH_COST_PER_TEST.to_string(),
            severity: AdvisorySeverity::Warning,
            message: format!("单测成本偏高: ${:.2}", cost_per_test),
            recommendation: "复核试剂价格或调整测定项组合".to_string(),
        });
    }

    warnings
}

/// 根据汇总量生成采购建议
pub fn build_recommendations(
    totals: &CalculationTotals,
    config: &EngineConfig,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if totals.total_monthly_tests > config.volume_discount_min_monthly_tests {
        recommendations.push(Recommendation {
            recommendation_type: recommendation_types::VOLUME_DISCOUNT.to_string(),
            message: "月测试量较大，可与供应商协商批量折扣".to_string(),
            potential_savings: round2(totals.total_monthly_cost * VOLUME_DISCOUNT_RATE),
        });
    }

    if totals.total_annual_cost > config.annual_contract_min_annual_cost {
        recommendations.push(Recommendation {
            recommendation_type: recommendation_types::ANNUAL_CONTRACT.to_string(),
            message: "年度成本较高，建议签订年度框架合同".to_string(),
            potential_savings: round2(totals.total_annual_cost * ANNUAL_CONTRACT_RATE),
        });
    }

    recommendations
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
