// ==========================================
// 案例计算器 - 设备利用率
// ==========================================
// 日产能: max_daily_capacity，否则 每小时产能 × 每日估算小时
// 月产能: 日产能 × 每月工作日
// 分档使用未取整的利用率；报告中保留两位小数
// ==========================================

use crate::config::EngineConfig;
use crate::domain::calculation::UtilizationReport;
use crate::domain::determination::Equipment;
use crate::domain::types::UtilizationStatus;
use crate::engine::error::{EngineError, EngineResult};
use tracing::warn;

/// 计算设备利用率
///
/// # 参数
/// - `equipment`: 主设备
/// - `monthly_tests`: 月度测试总量（月度口径）
/// - `config`: 引擎配置快照
///
/// # 返回
/// - Err(ZeroCapacity): 设备无可用产能
pub fn compute_utilization(
    equipment: &Equipment,
    monthly_tests: f64,
    config: &EngineConfig,
) -> EngineResult<UtilizationReport> {
    let (max_daily, estimated) = match equipment.max_daily_capacity.filter(|v| *v > 0.0) {
        Some(daily) => (daily, false),
        None => {
            let per_hour = match equipment.capacity_per_hour.filter(|v| *v > 0.0) {
                Some(v) => v,
                None => {
                    warn!(
                        equipment_id = %equipment.id,
                        fallback = config.fallback_capacity_per_hour,
                        "设备未登记每小时产能，使用兜底值"
                    );
                    config.fallback_capacity_per_hour
                }
            };
            let daily = per_hour * config.estimated_hours_per_day;
            warn!(
                equipment_id = %equipment.id,
                capacity_per_hour = per_hour,
                estimated_daily = daily,
                "设备未登记日产能，按每小时产能估算"
            );
            (daily, true)
        }
    };

    let max_monthly = max_daily * config.working_days_per_month;
    if !(max_monthly > 0.0) {
        return Err(EngineError::ZeroCapacity(equipment.id.clone()));
    }

    let utilization = monthly_tests / max_monthly * 100.0;
    let status = UtilizationStatus::classify(
        utilization,
        config.overload_threshold_pct,
        config.underutilized_threshold_pct,
    );

    Ok(UtilizationReport {
        equipment_id: equipment.id.clone(),
        max_daily_capacity: max_daily,
        max_monthly_capacity: max_monthly,
        monthly_tests,
        utilization_percentage: (utilization * 100.0).round() / 100.0,
        capacity_exceeded: utilization > 100.0,
        available_capacity: max_monthly - monthly_tests,
        status,
        capacity_estimated: estimated,
    })
}
