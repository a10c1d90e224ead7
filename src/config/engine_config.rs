// ==========================================
// 商业案例计算引擎 - 引擎配置快照
// ==========================================
// 职责: 一次性读取全部引擎阈值，供单次计算/事务使用
// 说明: 在获取连接锁之前加载，事务内只读快照
// ==========================================

use crate::config::engine_config_trait::EngineConfigReader;
use crate::repository::error::RepositoryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub assumed_tests_per_hour: f64,
    pub working_days_per_month: f64,
    pub estimated_hours_per_day: f64,
    pub fallback_capacity_per_hour: f64,
    pub overload_threshold_pct: f64,
    pub underutilized_threshold_pct: f64,
    pub high_cost_per_test: f64,
    pub volume_discount_min_monthly_tests: f64,
    pub annual_contract_min_annual_cost: f64,
    pub qc_overhead_max_pct: f64,
    pub min_weekly_operating_hours: f64,
    pub high_volume_annual_tests: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assumed_tests_per_hour: 60.0,
            working_days_per_month: 22.0,
            estimated_hours_per_day: 8.0,
            fallback_capacity_per_hour: 100.0,
            overload_threshold_pct: 90.0,
            underutilized_threshold_pct: 30.0,
            high_cost_per_test: 5.0,
            volume_discount_min_monthly_tests: 1000.0,
            annual_contract_min_annual_cost: 50_000.0,
            qc_overhead_max_pct: 15.0,
            min_weekly_operating_hours: 40.0,
            high_volume_annual_tests: 50_000.0,
        }
    }
}

impl EngineConfig {
    /// 从配置读取器加载快照
    pub fn load(reader: &dyn EngineConfigReader) -> RepositoryResult<Self> {
        Ok(Self {
            assumed_tests_per_hour: reader.get_assumed_tests_per_hour()?,
            working_days_per_month: reader.get_working_days_per_month()?,
            estimated_hours_per_day: reader.get_estimated_hours_per_day()?,
            fallback_capacity_per_hour: reader.get_fallback_capacity_per_hour()?,
            overload_threshold_pct: reader.get_overload_threshold_pct()?,
            underutilized_threshold_pct: reader.get_underutilized_threshold_pct()?,
            high_cost_per_test: reader.get_high_cost_per_test()?,
            volume_discount_min_monthly_tests: reader.get_volume_discount_min_monthly_tests()?,
            annual_contract_min_annual_cost: reader.get_annual_contract_min_annual_cost()?,
            qc_overhead_max_pct: reader.get_qc_overhead_max_pct()?,
            min_weekly_operating_hours: reader.get_min_weekly_operating_hours()?,
            high_volume_annual_tests: reader.get_high_volume_annual_tests()?,
        })
    }
}
