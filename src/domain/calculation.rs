// ==========================================
// 商业案例计算引擎 - 计算结果实体
// ==========================================
// 职责: 单行计算结果 / 设备利用率 / 回报分析 / 计算快照
// 快照: 每个案例一行，calculation_version 严格递增
// ==========================================

use crate::domain::business_case::ComputedEconomics;
use crate::domain::types::{AdvisorySeverity, CalculationKind, CalculationMode, UtilizationStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// 公式来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaOrigin {
    /// 测定项专属公式
    Determination,
    /// 设备默认公式
    Equipment,
    /// 内置默认公式
    BuiltIn,
}

impl fmt::Display for FormulaOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaOrigin::Determination => write!(f, "determination"),
            FormulaOrigin::Equipment => write!(f, "equipment"),
            FormulaOrigin::BuiltIn => write!(f, "built_in"),
        }
    }
}

// ==========================================
// DeterminationCalculation - 单测定项单类别计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminationCalculation {
    pub kind: CalculationKind,
    pub value: f64,
    pub unit: String,
    pub formula_type: String,
    pub formula_description: Option<String>,
    pub origin: FormulaOrigin,
    pub calculated_at: NaiveDateTime,
    pub details: CalculationDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDetails {
    /// 公式主体（表达式文本或完整 JSON）
    pub formula_expression: serde_json::Value,
    pub variables_used: BTreeMap<String, f64>,
}

// ==========================================
// UtilizationReport - 设备利用率
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    pub equipment_id: String,
    pub max_daily_capacity: f64,
    pub max_monthly_capacity: f64,
    pub monthly_tests: f64,
    pub utilization_percentage: f64,
    pub capacity_exceeded: bool,
    pub available_capacity: f64,
    pub status: UtilizationStatus,
    /// 日产能是否由每小时产能估算
    pub capacity_estimated: bool,
}

// ==========================================
// RentabilityReport - 借用回报分析
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentabilityReport {
    pub equipment_cost: f64,
    pub one_time_investments: f64,
    pub total_investment: f64,
    pub annual_operating_cost: f64,
    pub monthly_cost: f64,
    pub monthly_revenue: f64,
    pub monthly_margin: f64,
    pub annual_revenue: f64,
    pub annual_margin: f64,
    pub roi_percentage: f64,
    pub payback_months: Option<i64>,
    pub target_margin_percentage: f64,
}

impl RentabilityReport {
    /// 写回主档的经济指标
    pub fn to_economics(&self) -> ComputedEconomics {
        ComputedEconomics {
            roi_percentage: self.roi_percentage,
            payback_months: self.payback_months,
            monthly_margin: self.monthly_margin,
            annual_margin: self.annual_margin,
            monthly_revenue: self.monthly_revenue,
            annual_revenue: self.annual_revenue,
            monthly_cost: self.monthly_cost,
            annual_cost: self.annual_operating_cost,
            total_investment: self.total_investment,
            equipment_investment: self.equipment_cost,
        }
    }
}

// ==========================================
// 提示与建议
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationWarning {
    #[serde(rename = "type")]
    pub warning_type: String,
    pub severity: AdvisorySeverity,
    pub message: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub message: String,
    pub potential_savings: f64,
}

pub mod warning_types {
    pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";
    pub const NEAR_CAPACITY_LIMIT: &str = "near_capacity_limit";
    pub const UNDERUTILIZED: &str = "underutilized";
    pub const HIGH_COST_PER_TEST: &str = "high_cost_per_test";
}

pub mod recommendation_types {
    pub const VOLUME_DISCOUNT: &str = "volume_discount";
    pub const ANNUAL_CONTRACT: &str = "annual_contract";
}

// ==========================================
// CalculationTotals - 汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationTotals {
    pub total_monthly_tests: f64,
    pub total_annual_tests: f64,
    pub total_monthly_cost: f64,
    pub total_annual_cost: f64,
    pub total_monthly_consumption: f64,
    pub total_annual_consumption: f64,
    pub cost_per_test: f64,
}

// ==========================================
// CalculationSnapshot - 计算快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSnapshot {
    pub business_case_id: String,
    pub calculation_mode: CalculationMode,
    pub totals: CalculationTotals,
    pub utilization: UtilizationReport,
    pub rentability: RentabilityReport,
    pub warnings: Vec<CalculationWarning>,
    pub recommendations: Vec<Recommendation>,
    pub calculated_at: NaiveDateTime,
    pub calculation_version: i64,
}

/// 单测定项的消耗与成本结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminationLineResult {
    pub determination_id: String,
    pub monthly_quantity: i64,
    pub annual_quantity: i64,
    pub consumption: DeterminationCalculation,
    pub cost: DeterminationCalculation,
}

/// 主计算例程的完整产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessCaseCalculation {
    pub snapshot: CalculationSnapshot,
    pub lines: Vec<DeterminationLineResult>,
}

// ==========================================
// CalculationTemplate - 计算模板（目录工具使用）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationTemplate {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub formula: serde_json::Value,
    pub version: i32,
    pub is_active: bool,
}
