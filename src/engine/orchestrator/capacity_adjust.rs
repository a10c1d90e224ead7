// ==========================================
// 工作流编排器 - 产能约束调整
// ==========================================
// 年产能 = 天 × 班 × 时 × 52 × 每小时测试量
// 年量超出年产能的测定项: 年量截断为产能，月量 = ceil(年量/12)
// ==========================================

use crate::domain::determination::{ceil_div, BcDetermination, DeterminationAdjustment};
use crate::domain::operational::OperationalData;

/// 计算需要调整的测定项（纯函数）
///
/// # 参数
/// - `determinations`: 案例测定项
/// - `operational`: 运营数据
/// - `tests_per_hour`: 假定每小时测试量
pub fn plan_capacity_adjustments(
    determinations: &[BcDetermination],
    operational: &OperationalData,
    tests_per_hour: f64,
) -> Vec<DeterminationAdjustment> {
    let annual_capacity = operational.annual_capacity(tests_per_hour).floor() as i64;

    determinations
        .iter()
        .filter(|d| d.annual_quantity > annual_capacity)
        .map(|d| DeterminationAdjustment {
            determination_id: d.determination_id.clone(),
            previous_annual_quantity: d.annual_quantity,
            adjusted_annual_quantity: annual_capacity,
            adjusted_monthly_quantity: ceil_div(annual_capacity, 12),
            note: format!(
                "自动调整: 超出运营产能 ({} → {})",
                d.annual_quantity, annual_capacity
            ),
        })
        .collect()
}
