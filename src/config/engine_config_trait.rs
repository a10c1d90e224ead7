// ==========================================
// 商业案例计算引擎 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义计算/校验/编排所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::RepositoryResult;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait EngineConfigReader: Send + Sync {
    // ===== 产能配置 =====

    /// 假定每小时检测通量（运营数据修正产能时使用）
    ///
    /// # 默认值
    /// - 60
    fn get_assumed_tests_per_hour(&self) -> RepositoryResult<f64>;

    /// 每月工作日
    ///
    /// # 默认值
    /// - 22
    fn get_working_days_per_month(&self) -> RepositoryResult<f64>;

    /// 估算日产能时使用的每日工作小时数
    ///
    /// # 默认值
    /// - 8
    fn get_estimated_hours_per_day(&self) -> RepositoryResult<f64>;

    /// 设备未登记每小时产能时的回退值
    ///
    /// # 默认值
    /// - 100
    fn get_fallback_capacity_per_hour(&self) -> RepositoryResult<f64>;

    // ===== 利用率阈值 =====

    /// 过载阈值（%，严格大于）
    ///
    /// # 默认值
    /// - 90
    fn get_overload_threshold_pct(&self) -> RepositoryResult<f64>;

    /// 低利用率阈值（%，严格小于）
    ///
    /// # 默认值
    /// - 30
    fn get_underutilized_threshold_pct(&self) -> RepositoryResult<f64>;

    // ===== 提示与建议阈值 =====

    /// 单次检测成本告警阈值
    fn get_high_cost_per_test(&self) -> RepositoryResult<f64>;

    /// 批量折扣建议的月检测量下限
    fn get_volume_discount_min_monthly_tests(&self) -> RepositoryResult<f64>;

    /// 年度合同建议的年成本下限
    fn get_annual_contract_min_annual_cost(&self) -> RepositoryResult<f64>;

    // ===== 一致性校验阈值 =====

    /// 质控检测占年检测量的最大比例（%）
    fn get_qc_overhead_max_pct(&self) -> RepositoryResult<f64>;

    /// 高检测量案例的最低周运行小时
    fn get_min_weekly_operating_hours(&self) -> RepositoryResult<f64>;

    /// 高检测量判定线（年检测量）
    fn get_high_volume_annual_tests(&self) -> RepositoryResult<f64>;
}
