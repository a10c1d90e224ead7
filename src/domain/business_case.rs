// ==========================================
// 商业案例计算引擎 - 商业案例实体
// ==========================================
// 职责: 案例主档 (bc_master) + 经济数据 (bc_economic_data) + 设备选型
// 生命周期: 以 draft 创建；仅经编排器/计算器变更；不做物理删除
// ==========================================

use crate::domain::types::{CalculationMode, PurchaseType, RiskLevel, Stage};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// BusinessCase - 案例主档
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessCase {
    pub id: String,
    pub client_id: Option<String>,
    pub client_name: String,
    pub purchase_type: PurchaseType,
    pub duration_years: i32,
    pub target_margin_percentage: f64,
    pub process_code: Option<String>,
    pub contract_object: Option<String>,
    pub stage: Stage,
    pub created_by: String,

    // ===== 计算产出 =====
    pub calculated_roi_percentage: Option<f64>,
    pub calculated_payback_months: Option<i64>,
    pub monthly_margin: Option<f64>,
    pub annual_margin: Option<f64>,
    pub monthly_revenue: Option<f64>,
    pub annual_revenue: Option<f64>,
    pub monthly_cost: Option<f64>,
    pub annual_cost: Option<f64>,
    pub total_investment: Option<f64>,
    pub equipment_investment: Option<f64>,

    // ===== 完整性与校验标记 =====
    pub economic_data_complete: bool,
    pub operational_data_complete: bool,
    pub lis_data_complete: bool,
    pub has_inconsistencies: bool,
    pub inconsistency_details: Option<serde_json::Value>,
    pub risk_level: Option<RiskLevel>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// EconomicData - 经济数据 (1:1)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicData {
    pub business_case_id: String,
    pub equipment_id: Option<String>,
    pub equipment_name: Option<String>,
    pub equipment_cost: f64,
    /// 为空时按采购类型推导
    pub calculation_mode: Option<CalculationMode>,
    pub show_roi: bool,
    pub show_margin: bool,
}

impl EconomicData {
    /// 生效的计算模式
    pub fn effective_mode(&self, purchase_type: PurchaseType) -> CalculationMode {
        self.calculation_mode
            .unwrap_or_else(|| purchase_type.default_calculation_mode())
    }
}

// ==========================================
// NewBusinessCase - 创建入参
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBusinessCase {
    pub client_id: Option<String>,
    pub client_name: String,
    pub purchase_type: Option<PurchaseType>,
    pub duration_years: Option<i32>,
    pub target_margin_percentage: Option<f64>,
    pub process_code: Option<String>,
    pub contract_object: Option<String>,
    pub created_by: Option<String>,

    pub equipment_id: Option<String>,
    pub equipment_name: Option<String>,
    pub equipment_cost: Option<f64>,
    pub calculation_mode: Option<CalculationMode>,
    pub show_roi: Option<bool>,
    pub show_margin: Option<bool>,
}

impl NewBusinessCase {
    pub const DEFAULT_DURATION_YEARS: i32 = 3;
    pub const DEFAULT_TARGET_MARGIN: f64 = 25.0;
    pub const DEFAULT_CREATED_BY: &'static str = "system";
}

// ==========================================
// EquipmentSelection - 设备选型
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentSelection {
    pub business_case_id: String,
    pub equipment_id: String,
    pub is_primary: bool,
    pub selected_at: NaiveDateTime,
}

// ==========================================
// ComputedEconomics - 写回主档的计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedEconomics {
    pub roi_percentage: f64,
    pub payback_months: Option<i64>,
    pub monthly_margin: f64,
    pub annual_margin: f64,
    pub monthly_revenue: f64,
    pub annual_revenue: f64,
    pub monthly_cost: f64,
    pub annual_cost: f64,
    pub total_investment: f64,
    pub equipment_investment: f64,
}
